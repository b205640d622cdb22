use crate::model::SparkPoint;

/// Downsample a series to at most `threshold` points using
/// largest-triangle-three-buckets: keep the endpoints, then from each bucket
/// pick the point forming the largest triangle with the previously kept
/// point and the next bucket's average.
pub fn largest_triangle_three_buckets(points: &[SparkPoint], threshold: usize) -> Vec<SparkPoint> {
    if threshold < 3 || points.len() <= threshold {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(threshold);
    out.push(points[0]);

    // Endpoints excluded from bucketing.
    let bucket_size = (points.len() - 2) as f64 / (threshold - 2) as f64;
    let mut a = 0usize;

    for i in 0..threshold - 2 {
        let range_start = (i as f64 * bucket_size) as usize + 1;
        let range_end = (((i + 1) as f64) * bucket_size) as usize + 1;
        let range_end = range_end.min(points.len() - 1);

        let next_start = range_end;
        let next_end = ((((i + 2) as f64) * bucket_size) as usize + 1).min(points.len());
        let next: &[SparkPoint] = if next_start < next_end {
            &points[next_start..next_end]
        } else {
            &points[points.len() - 1..]
        };
        let n = next.len() as f64;
        let avg_x = next.iter().map(|p| p.x).sum::<f64>() / n;
        let avg_y = next.iter().map(|p| p.y).sum::<f64>() / n;

        let pa = points[a];
        let mut best_area = -1.0f64;
        let mut best_idx = range_start;
        for (idx, p) in points[range_start..range_end].iter().enumerate() {
            let area = ((pa.x - avg_x) * (p.y - pa.y) - (pa.x - p.x) * (avg_y - pa.y)).abs() / 2.0;
            if area > best_area {
                best_area = area;
                best_idx = range_start + idx;
            }
        }

        out.push(points[best_idx]);
        a = best_idx;
    }

    out.push(points[points.len() - 1]);
    out
}
