//! Tests for structured output validation and repair prompts.

use serde::Deserialize;
use vordr::validation::{extract_json, generate_repair_prompt, validate_text};
use vordr::{
    FieldKind, FieldRule, OutputSchema, StructuredOutput, ValidationRule, validate_and_deserialize,
};

#[derive(Debug, Deserialize, PartialEq)]
struct ShotList {
    scene: String,
    shots: Vec<Shot>,
    pacing: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Shot {
    angle: String,
    seconds: f64,
}

impl StructuredOutput for ShotList {
    fn schema() -> OutputSchema {
        let shot = OutputSchema::new("Shot")
            .field(FieldRule::required("angle", FieldKind::String).min_length(1))
            .field(FieldRule::required("seconds", FieldKind::Number).range(0.5, 60.0));
        OutputSchema::new("ShotList")
            .field(FieldRule::required("scene", FieldKind::String))
            .field(
                FieldRule::required("shots", FieldKind::array_of(FieldKind::object(shot)))
                    .length(1, 10),
            )
            .field(FieldRule::required("pacing", FieldKind::String).one_of(["slow", "fast"]))
    }
}

#[test]
fn valid_document_deserializes() {
    let text = r#"{"scene": "1", "shots": [{"angle": "wide", "seconds": 4.5}], "pacing": "slow"}"#;
    let (result, value) = validate_and_deserialize::<ShotList>(text);
    assert!(result.is_valid);
    assert!(result.errors.is_empty());
    assert_eq!(
        value,
        Some(ShotList {
            scene: "1".into(),
            shots: vec![Shot {
                angle: "wide".into(),
                seconds: 4.5
            }],
            pacing: "slow".into(),
        })
    );
}

#[test]
fn fenced_output_with_prose_is_unwrapped() {
    let text = "Here is the shot list:\n```json\n{\"scene\": \"1\", \"shots\": [{\"angle\": \"close\", \"seconds\": 2}], \"pacing\": \"fast\"}\n```\nLet me know!";
    let (result, value) = validate_and_deserialize::<ShotList>(text);
    assert!(result.is_valid, "{:?}", result.errors);
    assert_eq!(value.unwrap().shots[0].angle, "close");
}

#[test]
fn one_error_per_violation_with_paths() {
    let text = r#"{"shots": [{"angle": "", "seconds": 90}], "pacing": "medium"}"#;
    let (result, value) = validate_and_deserialize::<ShotList>(text);
    assert!(!result.is_valid);
    assert!(value.is_none());

    let found: Vec<(&str, ValidationRule)> = result
        .errors
        .iter()
        .map(|e| (e.path.as_str(), e.rule))
        .collect();
    assert_eq!(
        found,
        vec![
            ("$.scene", ValidationRule::Required),
            ("$.shots[0].angle", ValidationRule::MinLength),
            ("$.shots[0].seconds", ValidationRule::Maximum),
            ("$.pacing", ValidationRule::Enum),
        ]
    );
}

#[test]
fn wrong_types_are_reported() {
    let text = r#"{"scene": 1, "shots": "none", "pacing": "slow"}"#;
    let (result, _) = validate_and_deserialize::<ShotList>(text);
    let rules: Vec<_> = result.errors.iter().map(|e| e.rule).collect();
    assert_eq!(rules, vec![ValidationRule::Type, ValidationRule::Type]);
}

#[test]
fn empty_array_violates_min_length() {
    let text = r#"{"scene": "1", "shots": [], "pacing": "slow"}"#;
    let (result, _) = validate_and_deserialize::<ShotList>(text);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].rule, ValidationRule::MinLength);
}

#[test]
fn unparseable_text_is_a_parse_error() {
    let (result, value) = validate_and_deserialize::<ShotList>("I cannot help with that.");
    assert!(!result.is_valid);
    assert!(value.is_none());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].rule, ValidationRule::Parse);
    assert_eq!(result.errors[0].path, "$");
}

#[test]
fn non_object_root_is_a_type_error() {
    let schema = ShotList::schema();
    let (result, _) = validate_text(&schema, "[1, 2, 3]");
    assert_eq!(result.errors[0].rule, ValidationRule::Type);
}

#[test]
fn extract_json_respects_strings() {
    let text = r#"note: {"a": "closing } inside", "b": [1]} trailing"#;
    assert_eq!(extract_json(text), r#"{"a": "closing } inside", "b": [1]}"#);
    assert_eq!(extract_json("  no json here "), "no json here");
}

#[test]
fn schema_definition_is_json() {
    let definition = ShotList::schema().definition();
    let parsed: serde_json::Value = serde_json::from_str(&definition).unwrap();
    assert_eq!(parsed["name"], "ShotList");
    assert!(definition.contains("\"pacing\""));
    assert!(definition.contains("\"slow\""));
}

#[test]
fn repair_prompt_contains_every_part() {
    let text = r#"{"scene": "1", "shots": [], "pacing": "medium"}"#;
    let (result, _) = validate_and_deserialize::<ShotList>(text);
    let definition = ShotList::schema().definition();

    let prompt = generate_repair_prompt("list shots for scene 1", text, &result.errors, &definition);

    assert!(prompt.contains("list shots for scene 1"));
    assert!(prompt.contains(text));
    assert!(prompt.contains("1. $.shots:"));
    assert!(prompt.contains("2. $.pacing:"));
    assert!(prompt.contains(definition.trim()));
}
