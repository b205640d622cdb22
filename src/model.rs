use std::collections::BTreeMap;

/// One row of the user's timeline: a frame number plus any mix of concrete
/// field values (`"zoom": 1.2`) and interpolation formulas (`"zoom_i":
/// "sin(p=2s)"`). Dynamic fields are kept in a flattened map so the wire
/// shape stays the caller's.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Keyframe {
    pub frame: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Keyframe {
    /// Concrete declared value for a field, if any.
    pub fn value(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(serde_json::Value::as_f64)
    }

    /// Declared interpolation formula for a field (the `<field>_i` entry),
    /// if any. Empty strings count as undeclared.
    pub fn formula(&self, field: &str) -> Option<&str> {
        self.fields
            .get(&format!("{field}_i"))
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Timing options. Callers may carry extra option keys (e.g. downstream
/// generation settings); they ride along in `extra` and are echoed back
/// untouched.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderOptions {
    pub bpm: f64,
    pub output_fps: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A prompt segment active over a frame window (or all frames). `weight` is
/// itself an expression, evaluated when segments overlap.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PromptSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub positive: String,
    #[serde(default)]
    pub negative: String,
    #[serde(rename = "allFrames", default)]
    pub all_frames: bool,
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub weight: String,
}

impl PromptSpec {
    pub fn covers(&self, frame: i64) -> bool {
        self.all_frames || (self.from <= frame && frame <= self.to)
    }
}

/// Renderer input: sorted keyframes, the fields the renderer is responsible
/// for, timing options, and prompt segments. Unknown top-level keys are kept
/// in `extra` so the rendered output echoes the document losslessly.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub keyframes: Vec<Keyframe>,
    #[serde(rename = "managedFields")]
    pub managed_fields: Vec<String>,
    pub options: RenderOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompts: Vec<PromptSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One fully computed frame. `values` holds, per managed field, the value
/// plus its `<field>_delta` and `<field>_pc` derivatives, flattened into the
/// output object.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderedFrame {
    pub frame: i64,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
    pub deforum_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subseed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subseed_strength: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparkPoint {
    pub x: f64,
    pub y: f64,
}

/// Per-field statistics over the rendered range, plus decimated preview
/// series for sparkline display.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FieldMeta {
    pub min: f64,
    pub max: f64,
    #[serde(rename = "isFlat")]
    pub is_flat: bool,
    pub sparkline: Vec<SparkPoint>,
    pub delta_sparkline: Vec<SparkPoint>,
}

/// Renderer output: the input document echoed back plus the full per-frame
/// dataset and per-field metadata.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderedData {
    #[serde(flatten)]
    pub document: Document,
    pub rendered_frames: Vec<RenderedFrame>,
    pub rendered_frames_meta: BTreeMap<String, FieldMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframe_roundtrip_preserves_dynamic_fields() {
        let s = r#"{"frame": 5, "info": "note", "seed": 10, "seed_i": "sin(p=40)"}"#;
        let kf: Keyframe = serde_json::from_str(s).unwrap();
        assert_eq!(kf.frame, 5);
        assert_eq!(kf.value("seed"), Some(10.0));
        assert_eq!(kf.formula("seed"), Some("sin(p=40)"));
        assert_eq!(kf.value("zoom"), None);
        assert_eq!(kf.formula("zoom"), None);

        let back = serde_json::to_value(&kf).unwrap();
        assert_eq!(back["seed"], 10.0);
        assert_eq!(back["seed_i"], "sin(p=40)");
        assert_eq!(back["info"], "note");
    }

    #[test]
    fn empty_formula_counts_as_undeclared() {
        let s = r#"{"frame": 0, "seed_i": "  "}"#;
        let kf: Keyframe = serde_json::from_str(s).unwrap();
        assert_eq!(kf.formula("seed"), None);
    }

    #[test]
    fn prompt_coverage() {
        let p = PromptSpec {
            name: "p".into(),
            positive: "cat".into(),
            negative: String::new(),
            all_frames: false,
            from: 10,
            to: 20,
            weight: "1".into(),
        };
        assert!(!p.covers(9));
        assert!(p.covers(10));
        assert!(p.covers(20));
        assert!(!p.covers(21));
        let all = PromptSpec {
            all_frames: true,
            ..p
        };
        assert!(all.covers(9999));
    }

    #[test]
    fn unknown_document_and_option_keys_round_trip() {
        let s = r#"{
            "keyframes": [{"frame": 0, "seed": 0}, {"frame": 2, "seed": 10}],
            "managedFields": ["seed"],
            "options": {"bpm": 120, "output_fps": 20, "strength_schedule": "0.6"},
            "custom_top_level": {"nested": true}
        }"#;
        let doc: Document = serde_json::from_str(s).unwrap();
        assert_eq!(doc.options.bpm, 120.0);

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["options"]["strength_schedule"], "0.6");
        assert_eq!(back["custom_top_level"]["nested"], true);
    }

    #[test]
    fn document_parses_minimal_wire_shape() {
        let s = r#"{
            "keyframes": [{"frame": 0, "seed": 0}, {"frame": 2, "seed": 10}],
            "managedFields": ["seed"],
            "options": {"bpm": 120, "output_fps": 20}
        }"#;
        let doc: Document = serde_json::from_str(s).unwrap();
        assert_eq!(doc.keyframes.len(), 2);
        assert_eq!(doc.managed_fields, vec!["seed"]);
        assert_eq!(doc.options.output_fps, 20.0);
        assert!(doc.prompts.is_empty());
    }
}
