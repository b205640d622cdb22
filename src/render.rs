use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::{
    ast::{Ast, InvocationCtx, Value},
    decimate::largest_triangle_three_buckets,
    error::{FramescriptError, FramescriptResult},
    functions::FunctionLibrary,
    model::{Document, FieldMeta, RenderedData, RenderedFrame, SparkPoint},
    prompt::compose_prompt,
};

/// Built-in bookend value for a field with no declared value anywhere in the
/// document.
fn builtin_default(field: &str) -> f64 {
    match field {
        "zoom" => 1.0,
        "strength" => 0.575,
        "noise" => 0.04,
        _ => 0.0,
    }
}

/// Batch renderer: one `render` call walks every frame for every managed
/// field and produces the complete dataset. Pure with respect to the input
/// document; the only internal state is a render-scoped formula parse cache.
pub struct Renderer {
    library: FunctionLibrary,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            library: FunctionLibrary::standard(),
        }
    }

    pub fn with_library(library: FunctionLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    #[tracing::instrument(skip(self, doc))]
    pub fn render(&self, doc: &Document) -> FramescriptResult<RenderedData> {
        validate(doc)?;

        let first = doc.keyframes[0].frame;
        let last = doc.keyframes[doc.keyframes.len() - 1].frame;
        let frame_count = (last - first + 1) as usize;

        // Formula -> AST cache, scoped to this render call.
        let mut cache: HashMap<String, Rc<Ast>> = HashMap::new();

        let mut values_by_field: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for field in &doc.managed_fields {
            let values = self.render_field(doc, field, first, last, &mut cache)?;
            tracing::debug!(field, frames = values.len(), "rendered field");
            values_by_field.insert(field.clone(), values);
        }

        let mut meta: BTreeMap<String, FieldMeta> = BTreeMap::new();
        let mut deltas_by_field: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut pcs_by_field: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (field, values) in &values_by_field {
            let max = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            let min = values.iter().fold(f64::INFINITY, |acc, v| acc.min(*v));
            let is_flat = min == max;

            let pcs: Vec<f64> = values
                .iter()
                .map(|v| if max != 0.0 { v / max * 100.0 } else { *v })
                .collect();

            // Zoom is a multiplier per frame, so its delta is a ratio.
            let multiplicative = field == "zoom";
            let deltas: Vec<f64> = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    if i == 0 {
                        *v
                    } else if multiplicative {
                        v / values[i - 1]
                    } else {
                        v - values[i - 1]
                    }
                })
                .collect();

            let spark = |series: &[f64]| {
                let pts: Vec<SparkPoint> = series
                    .iter()
                    .enumerate()
                    .map(|(i, y)| SparkPoint {
                        x: (first + i as i64) as f64,
                        y: *y,
                    })
                    .collect();
                largest_triangle_three_buckets(&pts, 100)
            };

            meta.insert(
                field.clone(),
                FieldMeta {
                    min,
                    max,
                    is_flat,
                    sparkline: spark(values),
                    delta_sparkline: spark(&deltas),
                },
            );
            pcs_by_field.insert(field.clone(), pcs);
            deltas_by_field.insert(field.clone(), deltas);
        }

        let keyframe_frames: Vec<i64> = doc.keyframes.iter().map(|k| k.frame).collect();
        let keyframe_zeros = vec![0.0f64; keyframe_frames.len()];

        let mut rendered_frames = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            let frame = first + i as i64;

            let mut values = BTreeMap::new();
            for (field, series) in &values_by_field {
                values.insert(field.clone(), series[i]);
                values.insert(format!("{field}_delta"), deltas_by_field[field][i]);
                values.insert(format!("{field}_pc"), pcs_by_field[field][i]);
            }

            // Prompt placeholders see every rendered field as a variable.
            let mut vars: BTreeMap<String, Value> = BTreeMap::new();
            for (field, series) in &values_by_field {
                vars.insert(field.clone(), Value::Number(series[i]));
            }
            let active = keyframe_frames
                .iter()
                .copied()
                .take_while(|&f| f <= frame)
                .last()
                .unwrap_or(first);
            let ctx = InvocationCtx {
                frame,
                fps: doc.options.output_fps,
                bpm: doc.options.bpm,
                active_keyframe: active,
                defined_frames: &keyframe_frames,
                defined_values: &keyframe_zeros,
                variables: &vars,
                library: &self.library,
            };
            // Composition failures arrive already tagged with the offending
            // placeholder or weight expression.
            let deforum_prompt = compose_prompt(&doc.prompts, frame, &ctx)?;

            let (subseed, subseed_strength) = match values_by_field.get("seed") {
                Some(series) => {
                    let seed = series[i];
                    (Some(seed.ceil()), Some(seed.fract()))
                }
                None => (None, None),
            };

            rendered_frames.push(RenderedFrame {
                frame,
                values,
                deforum_prompt,
                subseed,
                subseed_strength,
            });
        }

        Ok(RenderedData {
            document: doc.clone(),
            rendered_frames,
            rendered_frames_meta: meta,
        })
    }

    fn render_field(
        &self,
        doc: &Document,
        field: &str,
        first: i64,
        last: i64,
        cache: &mut HashMap<String, Rc<Ast>>,
    ) -> FramescriptResult<Vec<f64>> {
        // Defined set: every keyframe with a concrete value, in frame order,
        // with synthesized bookends at the span edges. The user's keyframes
        // are never touched.
        let mut defined: Vec<(i64, f64)> = doc
            .keyframes
            .iter()
            .filter_map(|k| k.value(field).map(|v| (k.frame, v)))
            .collect();
        if defined.first().map(|p| p.0) != Some(first) {
            let v = defined
                .first()
                .map(|p| p.1)
                .unwrap_or_else(|| builtin_default(field));
            defined.insert(0, (first, v));
        }
        if defined.last().map(|p| p.0) != Some(last) {
            let v = defined
                .last()
                .map(|p| p.1)
                .unwrap_or_else(|| builtin_default(field));
            defined.push((last, v));
        }
        let defined_frames: Vec<i64> = defined.iter().map(|p| p.0).collect();
        let defined_values: Vec<f64> = defined.iter().map(|p| p.1).collect();

        let keyframe_at: BTreeMap<i64, &crate::model::Keyframe> =
            doc.keyframes.iter().map(|k| (k.frame, k)).collect();

        // The formula in force is sticky: it governs every frame from its
        // declaring keyframe until another keyframe redeclares one.
        let mut current: Option<(Rc<Ast>, String)> = None;
        let mut prev_computed = defined_values[0];
        let mut out = Vec::with_capacity((last - first + 1) as usize);

        for frame in first..=last {
            if let Some(kf) = keyframe_at.get(&frame)
                && let Some(formula) = kf.formula(field)
            {
                let ast = match cache.get(formula) {
                    Some(ast) => Rc::clone(ast),
                    None => {
                        let ast = Rc::new(
                            crate::parser::parse(formula, &self.library)
                                .map_err(|e| e.for_field(field, frame, formula))?,
                        );
                        cache.insert(formula.to_string(), Rc::clone(&ast));
                        ast
                    }
                };
                current = Some((ast, formula.to_string()));
            }

            let active = defined_frames
                .iter()
                .copied()
                .take_while(|&f| f <= frame)
                .last()
                .unwrap_or(first);

            let mut vars: BTreeMap<String, Value> = BTreeMap::new();
            vars.insert(
                "prev_computed_value".to_string(),
                Value::Number(prev_computed),
            );
            let ctx = InvocationCtx {
                frame,
                fps: doc.options.output_fps,
                bpm: doc.options.bpm,
                active_keyframe: active,
                defined_frames: &defined_frames,
                defined_values: &defined_values,
                variables: &vars,
                library: &self.library,
            };

            let value = match &current {
                Some((ast, formula)) => ast
                    .invoke(&ctx)
                    .map_err(|e| e.for_field(field, frame, formula.clone()))?
                    .as_number(),
                // No formula ever declared: hold the active keyframe's value.
                None => ctx.active_keyframe_value(),
            };

            out.push(value);
            prev_computed = value;
        }

        Ok(out)
    }
}

fn validate(doc: &Document) -> FramescriptResult<()> {
    if doc.keyframes.len() < 2 {
        return Err(FramescriptError::render(format!(
            "a document needs at least 2 keyframes to render, got {}",
            doc.keyframes.len()
        )));
    }
    if !doc.keyframes.windows(2).all(|w| w[0].frame < w[1].frame) {
        return Err(FramescriptError::render(
            "keyframes must be sorted by frame with no duplicates",
        ));
    }
    if !(doc.options.output_fps > 0.0) || !doc.options.output_fps.is_finite() {
        return Err(FramescriptError::render("options.output_fps must be > 0"));
    }
    if !(doc.options.bpm > 0.0) || !doc.options.bpm.is_finite() {
        return Err(FramescriptError::render("options.bpm must be > 0"));
    }
    if doc.managed_fields.iter().any(|f| f.trim().is_empty()) {
        return Err(FramescriptError::render(
            "managed field names must be non-empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Keyframe, PromptSpec, RenderOptions};
    use serde_json::json;

    fn kf(frame: i64, fields: serde_json::Value) -> Keyframe {
        let fields = fields
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Keyframe {
            frame,
            info: None,
            fields,
        }
    }

    fn doc(keyframes: Vec<Keyframe>, managed: &[&str]) -> Document {
        Document {
            keyframes,
            managed_fields: managed.iter().map(|s| s.to_string()).collect(),
            options: RenderOptions {
                bpm: 120.0,
                output_fps: 20.0,
                extra: BTreeMap::new(),
            },
            prompts: vec![],
            extra: BTreeMap::new(),
        }
    }

    fn field_series(rendered: &RenderedData, field: &str) -> Vec<f64> {
        rendered
            .rendered_frames
            .iter()
            .map(|f| f.values[field])
            .collect()
    }

    #[test]
    fn constant_formula_is_sticky_across_the_whole_span() {
        // Frame 0 declares the literal formula "0"; frames 1 and 2 carry it.
        let d = doc(
            vec![
                kf(0, json!({"seed": 0, "seed_i": "0"})),
                kf(2, json!({"seed": 10})),
            ],
            &["seed"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(r.rendered_frames.len(), 3);
        assert_eq!(field_series(&r, "seed"), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn default_interpolator_holds_the_active_keyframe_value() {
        let d = doc(
            vec![
                kf(0, json!({"seed": 1})),
                kf(2, json!({"seed": 5})),
                kf(4, json!({"seed": 9})),
            ],
            &["seed"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(field_series(&r, "seed"), vec![1.0, 1.0, 5.0, 5.0, 9.0]);
    }

    #[test]
    fn redeclared_formula_replaces_the_sticky_one() {
        let d = doc(
            vec![
                kf(0, json!({"x": 0, "x_i": "f"})),
                kf(2, json!({"x_i": "100 + f"})),
                kf(4, json!({"x": 0})),
            ],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(
            field_series(&r, "x"),
            vec![0.0, 1.0, 102.0, 103.0, 104.0]
        );
    }

    #[test]
    fn single_keyframe_fails_before_evaluation() {
        let d = doc(vec![kf(0, json!({"seed": 1, "seed_i": "@@@"}))], &["seed"]);
        let err = Renderer::new().render(&d).unwrap_err();
        // The structural check fires first, so the broken formula is never
        // even lexed.
        assert!(err.to_string().contains("at least 2 keyframes"));
    }

    #[test]
    fn unsorted_keyframes_are_rejected() {
        let d = doc(
            vec![kf(5, json!({"seed": 1})), kf(0, json!({"seed": 2}))],
            &["seed"],
        );
        assert!(Renderer::new().render(&d).is_err());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let mut d = doc(
            vec![kf(0, json!({"seed": 1})), kf(2, json!({"seed": 2}))],
            &["seed"],
        );
        d.options.output_fps = 0.0;
        assert!(Renderer::new().render(&d).is_err());
        d.options.output_fps = 20.0;
        d.options.bpm = -1.0;
        assert!(Renderer::new().render(&d).is_err());
    }

    #[test]
    fn bookend_is_synthesized_without_mutating_input() {
        // First keyframe omits x; a later keyframe declares x=5, which must
        // back-fill the timeline start for interpolation purposes.
        let d = doc(
            vec![
                kf(0, json!({"seed": 1})),
                kf(2, json!({"seed": 1, "x": 5})),
                kf(4, json!({"seed": 1})),
            ],
            &["seed", "x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(field_series(&r, "x"), vec![5.0, 5.0, 5.0, 5.0, 5.0]);
        // Input keyframes still have no "x" on the first row.
        assert!(d.keyframes[0].value("x").is_none());
        assert!(r.document.keyframes[0].value("x").is_none());
    }

    #[test]
    fn field_with_no_values_uses_builtin_default() {
        let d = doc(
            vec![kf(0, json!({"seed": 1})), kf(2, json!({"seed": 1}))],
            &["seed", "zoom"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(field_series(&r, "zoom"), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn zoom_delta_is_multiplicative() {
        let d = doc(
            vec![
                kf(0, json!({"zoom": 1})),
                kf(1, json!({"zoom": 2})),
                kf(2, json!({"zoom": 4})),
            ],
            &["zoom"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(field_series(&r, "zoom"), vec![1.0, 2.0, 4.0]);
        let deltas: Vec<f64> = r
            .rendered_frames
            .iter()
            .map(|f| f.values["zoom_delta"])
            .collect();
        assert_eq!(deltas, vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn additive_delta_for_everything_else() {
        let d = doc(
            vec![
                kf(0, json!({"x": 1})),
                kf(1, json!({"x": 3})),
                kf(2, json!({"x": 2})),
            ],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        let deltas: Vec<f64> = r
            .rendered_frames
            .iter()
            .map(|f| f.values["x_delta"])
            .collect();
        assert_eq!(deltas, vec![1.0, 2.0, -1.0]);
    }

    #[test]
    fn percentage_law() {
        let d = doc(
            vec![
                kf(0, json!({"x": 2})),
                kf(1, json!({"x": -4})),
                kf(2, json!({"x": 1})),
            ],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        let meta = &r.rendered_frames_meta["x"];
        assert_eq!(meta.max, 4.0); // max of |value|
        assert_eq!(meta.min, -4.0);
        assert!(!meta.is_flat);
        for f in &r.rendered_frames {
            let (v, pc) = (f.values["x"], f.values["x_pc"]);
            assert_eq!(pc, v / meta.max * 100.0);
        }
    }

    #[test]
    fn pc_falls_back_to_value_when_max_is_zero() {
        let d = doc(
            vec![kf(0, json!({"x": 0})), kf(2, json!({"x": 0}))],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert!(r.rendered_frames_meta["x"].is_flat);
        for f in &r.rendered_frames {
            assert_eq!(f.values["x_pc"], f.values["x"]);
        }
    }

    #[test]
    fn error_names_field_frame_and_formula() {
        let d = doc(
            vec![
                kf(0, json!({"strength": 0.5})),
                kf(40, json!({"strength_i": "sin("})),
                kf(50, json!({"strength": 0.5})),
            ],
            &["strength"],
        );
        let err = Renderer::new().render(&d).unwrap_err();
        let s = err.to_string();
        assert!(s.contains("strength"));
        assert!(s.contains("40"));
        assert!(s.contains("sin("));
    }

    #[test]
    fn evaluation_error_is_attributed_to_the_failing_frame() {
        // The formula parses fine but trips at invoke time on an unknown
        // variable; the error must still carry field and frame.
        let d = doc(
            vec![
                kf(0, json!({"x": 0, "x_i": "mystery_var"})),
                kf(3, json!({"x": 0})),
            ],
            &["x"],
        );
        let err = Renderer::new().render(&d).unwrap_err();
        let s = err.to_string();
        assert!(s.contains("'x'"));
        assert!(s.contains("frame 0"));
        assert!(s.contains("mystery_var"));
    }

    #[test]
    fn prev_computed_value_threads_frame_to_frame() {
        let d = doc(
            vec![
                kf(0, json!({"x": 10, "x_i": "prev_computed_value + 1"})),
                kf(3, json!({"x": 0})),
            ],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        // Seeded with the start bookend value (10), then +1 each frame.
        assert_eq!(field_series(&r, "x"), vec![11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn subseed_tracks_the_seed_field() {
        let d = doc(
            vec![
                kf(0, json!({"seed": 1.25, "seed_i": "active_keyframe_value"})),
                kf(1, json!({"seed": 2.5})),
            ],
            &["seed"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(r.rendered_frames[0].subseed, Some(2.0));
        assert_eq!(r.rendered_frames[0].subseed_strength, Some(0.25));
        assert_eq!(r.rendered_frames[1].subseed, Some(3.0));
        assert_eq!(r.rendered_frames[1].subseed_strength, Some(0.5));
    }

    #[test]
    fn no_subseed_when_seed_is_not_managed() {
        let d = doc(
            vec![kf(0, json!({"x": 1})), kf(1, json!({"x": 2}))],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(r.rendered_frames[0].subseed, None);
        assert_eq!(r.rendered_frames[0].subseed_strength, None);
    }

    #[test]
    fn prompts_see_rendered_fields() {
        let mut d = doc(
            vec![kf(0, json!({"zoom": 1.5})), kf(2, json!({"zoom": 1.5}))],
            &["zoom"],
        );
        d.prompts = vec![PromptSpec {
            name: "p".into(),
            positive: "a cat at ${zoom}".into(),
            negative: String::new(),
            all_frames: true,
            from: 0,
            to: 0,
            weight: "1".into(),
        }];
        let r = Renderer::new().render(&d).unwrap();
        assert_eq!(r.rendered_frames[0].deforum_prompt, "a cat at 1.50000");
    }

    #[test]
    fn rendered_output_echoes_unknown_document_keys() {
        let mut d = doc(
            vec![kf(0, json!({"seed": 1})), kf(2, json!({"seed": 2}))],
            &["seed"],
        );
        d.options
            .extra
            .insert("strength_schedule".to_string(), json!("0.6"));
        d.extra.insert("custom_top_level".to_string(), json!(7));
        let r = Renderer::new().render(&d).unwrap();
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["options"]["strength_schedule"], "0.6");
        assert_eq!(v["custom_top_level"], 7);
    }

    #[test]
    fn prompt_errors_carry_the_failing_placeholder_text() {
        let mut d = doc(
            vec![kf(0, json!({"seed": 1})), kf(2, json!({"seed": 2}))],
            &["seed"],
        );
        d.prompts = vec![PromptSpec {
            name: "p".into(),
            positive: "a cat at ${bogus_var}".into(),
            negative: String::new(),
            all_frames: true,
            from: 0,
            to: 0,
            weight: "1".into(),
        }];
        let err = Renderer::new().render(&d).unwrap_err();
        let s = err.to_string();
        assert!(s.contains("deforum_prompt"));
        assert!(s.contains("'bogus_var'"));
        assert!(s.contains("frame 0"));
    }

    #[test]
    fn sparklines_cap_at_one_hundred_points() {
        let d = doc(
            vec![
                kf(0, json!({"x": 0, "x_i": "sin(p=25)"})),
                kf(999, json!({"x": 0})),
            ],
            &["x"],
        );
        let r = Renderer::new().render(&d).unwrap();
        let meta = &r.rendered_frames_meta["x"];
        assert_eq!(r.rendered_frames.len(), 1000);
        assert_eq!(meta.sparkline.len(), 100);
        assert_eq!(meta.delta_sparkline.len(), 100);
    }

    #[test]
    fn renders_are_reproducible() {
        let d = doc(
            vec![
                kf(0, json!({"x": 0, "x_i": "rand(0, 10) + sin(p=1s)"})),
                kf(50, json!({"x": 1})),
            ],
            &["x"],
        );
        let renderer = Renderer::new();
        let a = field_series(&renderer.render(&d).unwrap(), "x");
        let b = field_series(&renderer.render(&d).unwrap(), "x");
        assert_eq!(a, b);
    }
}
