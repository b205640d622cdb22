use framescript::{Document, Renderer};

#[test]
fn json_fixture_renders() {
    let s = include_str!("data/simple_doc.json");
    let doc: Document = serde_json::from_str(s).unwrap();
    let rendered = Renderer::new().render(&doc).unwrap();

    // Three frames: the contiguous span [0..2].
    assert_eq!(rendered.rendered_frames.len(), 3);
    let frames: Vec<i64> = rendered.rendered_frames.iter().map(|f| f.frame).collect();
    assert_eq!(frames, vec![0, 1, 2]);

    // Frame 0's literal constant formula "0" is sticky: frames 1 and 2 hold
    // seed=0 even though keyframe 2 declares seed=10.
    for f in &rendered.rendered_frames {
        assert_eq!(f.values["seed"], 0.0);
    }

    // Zoom has no formula, so the default hold interpolator applies.
    assert_eq!(rendered.rendered_frames[0].values["zoom"], 1.0);
    assert_eq!(rendered.rendered_frames[1].values["zoom"], 1.0);
    assert_eq!(rendered.rendered_frames[2].values["zoom"], 1.5);

    // Prompt placeholders see rendered fields; negatives ride behind --neg.
    assert_eq!(
        rendered.rendered_frames[0].deforum_prompt,
        "a cat at zoom 1.00000 --neg blurry"
    );

    // Seed is managed, so subseed fields are present.
    assert_eq!(rendered.rendered_frames[0].subseed, Some(0.0));
    assert_eq!(rendered.rendered_frames[0].subseed_strength, Some(0.0));
}

#[test]
fn output_wire_shape_is_flat() {
    let s = include_str!("data/simple_doc.json");
    let doc: Document = serde_json::from_str(s).unwrap();
    let rendered = Renderer::new().render(&doc).unwrap();

    let json = serde_json::to_value(&rendered).unwrap();

    // The input document is echoed at the top level.
    assert!(json["keyframes"].is_array());
    assert_eq!(json["managedFields"][0], "seed");
    assert_eq!(json["options"]["bpm"], 120.0);

    // Per-frame objects flatten field values and their derivatives.
    let f0 = &json["rendered_frames"][0];
    assert_eq!(f0["frame"], 0);
    assert_eq!(f0["seed"], 0.0);
    assert!(f0["seed_delta"].is_number());
    assert!(f0["seed_pc"].is_number());
    assert!(f0["zoom_delta"].is_number());
    assert!(f0["deforum_prompt"].is_string());

    // Metadata per managed field.
    let meta = &json["rendered_frames_meta"];
    assert!(meta["seed"]["isFlat"].as_bool().unwrap());
    assert_eq!(meta["zoom"]["min"], 1.0);
    assert_eq!(meta["zoom"]["max"], 1.5);
    assert!(meta["zoom"]["sparkline"].is_array());
    assert!(meta["zoom"]["delta_sparkline"].is_array());
}

#[test]
fn long_timeline_with_oscillators_and_prompts() {
    let s = r#"{
        "keyframes": [
            { "frame": 0, "zoom": 1.0, "zoom_i": "active_keyframe_value + 0.1 * sin(p=1s)",
              "prompt_weight_1": 1, "prompt_weight_1_i": "slide(to=0)" },
            { "frame": 120, "zoom": 2.0, "prompt_weight_1": 0 }
        ],
        "managedFields": ["zoom", "prompt_weight_1"],
        "options": { "bpm": 140, "output_fps": 30 },
        "prompts": [
            { "name": "a", "positive": "a forest", "allFrames": true,
              "from": 0, "to": 0, "weight": "prompt_weight_1" },
            { "name": "b", "positive": "a city", "allFrames": true,
              "from": 0, "to": 0, "weight": "1 - prompt_weight_1" }
        ]
    }"#;
    let doc: Document = serde_json::from_str(s).unwrap();
    let rendered = Renderer::new().render(&doc).unwrap();

    assert_eq!(rendered.rendered_frames.len(), 121);

    // prompt_weight_1 slides linearly from 1 at frame 0 to 0 at frame 120.
    let w = |i: usize| rendered.rendered_frames[i].values["prompt_weight_1"];
    assert_eq!(w(0), 1.0);
    assert!((w(60) - 0.5).abs() < 1e-9);
    assert_eq!(w(120), 0.0);

    // Overlapping prompts compose with evaluated weights.
    assert_eq!(
        rendered.rendered_frames[0].deforum_prompt,
        "a forest : 1 AND a city : 0"
    );
    let mid = &rendered.rendered_frames[60].deforum_prompt;
    assert!(mid.contains("a forest : 0.5"), "got {mid}");

    // Sparkline decimation kicks in above 100 frames.
    assert_eq!(rendered.rendered_frames_meta["zoom"].sparkline.len(), 100);
}

#[test]
fn render_is_a_pure_function_of_the_document() {
    let s = include_str!("data/simple_doc.json");
    let doc: Document = serde_json::from_str(s).unwrap();
    let renderer = Renderer::new();
    let a = serde_json::to_string(&renderer.render(&doc).unwrap()).unwrap();
    let b = serde_json::to_string(&renderer.render(&doc).unwrap()).unwrap();
    assert_eq!(a, b);
}
