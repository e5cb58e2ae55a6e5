use std::collections::HashMap;
use voxcore::{ConfigSchema, FieldKind, FieldSpec, PathSegment, Value};

fn sample_schema() -> ConfigSchema {
    ConfigSchema::new()
        .field(FieldSpec::string("text").required())
        .field(
            FieldSpec::string("operator")
                .one_of(["eq", "ne"])
                .default_value("eq"),
        )
        .field(FieldSpec::number("max_tokens").default_value(256.0))
        .field(FieldSpec::array_of("columns", FieldKind::String))
}

#[test]
fn missing_required_field_reports_path() {
    let schema = sample_schema();
    let errors = schema.validate(&HashMap::new()).unwrap_err();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, vec![PathSegment::Key("text".to_string())]);
    assert!(errors[0].message.contains("required"));
}

#[test]
fn wrong_kind_is_rejected() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("text".to_string(), Value::Number(5.0));

    let errors = schema.validate(&config).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path_string(), "text");
    assert!(errors[0].message.contains("string"));
}

#[test]
fn one_of_violation_names_choices() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("text".to_string(), Value::String("hi".to_string()));
    config.insert("operator".to_string(), Value::String("xor".to_string()));

    let errors = schema.validate(&config).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("eq, ne"));
}

#[test]
fn array_items_are_checked_with_index_paths() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("text".to_string(), Value::String("hi".to_string()));
    config.insert(
        "columns".to_string(),
        Value::Array(vec![
            Value::String("name".to_string()),
            Value::Number(3.0),
            Value::Bool(true),
        ]),
    );

    let errors = schema.validate(&config).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors[0].path,
        vec![
            PathSegment::Key("columns".to_string()),
            PathSegment::Index(1)
        ]
    );
    assert_eq!(errors[0].path_string(), "columns[1]");
    assert_eq!(
        errors[1].path,
        vec![
            PathSegment::Key("columns".to_string()),
            PathSegment::Index(2)
        ]
    );
}

#[test]
fn defaults_are_normalized_in() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("text".to_string(), Value::String("hello".to_string()));

    let normalized = schema.validate(&config).unwrap();
    assert_eq!(
        normalized.get("operator"),
        Some(&Value::String("eq".to_string()))
    );
    assert_eq!(normalized.get("max_tokens"), Some(&Value::Number(256.0)));
    // No default declared, none invented.
    assert!(!normalized.contains_key("columns"));
}

#[test]
fn unknown_keys_are_rejected_in_sorted_order() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("text".to_string(), Value::String("hi".to_string()));
    config.insert("zeta".to_string(), Value::Bool(true));
    config.insert("alpha".to_string(), Value::Bool(true));

    let errors = schema.validate(&config).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].path_string(), "alpha");
    assert_eq!(errors[1].path_string(), "zeta");
    assert!(errors[0].message.contains("unknown"));
}

#[test]
fn validation_is_deterministic() {
    let schema = sample_schema();
    let mut config = HashMap::new();
    config.insert("operator".to_string(), Value::String("xor".to_string()));
    config.insert("stray".to_string(), Value::Null);

    let first = schema.validate(&config).unwrap_err();
    let second = schema.validate(&config).unwrap_err();
    assert_eq!(first, second);
}

#[test]
fn value_path_lookup_traverses_objects_and_json() {
    let mut inner = HashMap::new();
    inner.insert("intent".to_string(), Value::String("booking".to_string()));
    let mut outer = HashMap::new();
    outer.insert("call".to_string(), Value::Object(inner));
    outer.insert(
        "raw".to_string(),
        Value::Json(serde_json::json!({"digits": "1234"})),
    );
    let value = Value::Object(outer);

    assert_eq!(
        value.get_path("call.intent"),
        Some(Value::String("booking".to_string()))
    );
    assert_eq!(
        value.get_path("raw.digits"),
        Some(Value::Json(serde_json::json!("1234")))
    );
    assert_eq!(value.get_path("call.missing"), None);
}
