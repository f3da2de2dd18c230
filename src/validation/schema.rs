//! Declarative output schemas.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{ValidationError, ValidationRule};

/// Expected JSON type of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Box<FieldKind>>,
    },
    Object {
        #[serde(skip_serializing_if = "Option::is_none")]
        schema: Option<Box<OutputSchema>>,
    },
    Any,
}

impl FieldKind {
    /// Array whose elements must all be `items`.
    pub fn array_of(items: FieldKind) -> Self {
        Self::Array {
            items: Some(Box::new(items)),
        }
    }

    /// Nested object validated against `schema`.
    pub fn object(schema: OutputSchema) -> Self {
        Self::Object {
            schema: Some(Box::new(schema)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Any => "any",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array { .. } => value.is_array(),
            Self::Object { .. } => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Constraints on one named field.
///
/// ```rust
/// # use vordr::validation::{FieldKind, FieldRule};
/// let mood = FieldRule::required("mood", FieldKind::String).one_of(["calm", "tense"]);
/// let score = FieldRule::optional("score", FieldKind::Number).range(0.0, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldRule {
    fn new(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            allowed_values: None,
            description: None,
        }
    }

    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::new(name, kind, true)
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::new(name, kind, false)
    }

    /// Inclusive numeric bounds.
    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Inclusive length bounds (characters for strings, elements for arrays).
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Restrict the value to a fixed set.
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
        if !self.kind.matches(value) {
            errors.push(ValidationError::new(
                path,
                ValidationRule::Type,
                format!("expected {}, found {}", self.kind.name(), json_type(value)),
            ));
            return;
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum
                && n < min
            {
                errors.push(ValidationError::new(
                    path,
                    ValidationRule::Minimum,
                    format!("value {n} is below the minimum of {min}"),
                ));
            }
            if let Some(max) = self.maximum
                && n > max
            {
                errors.push(ValidationError::new(
                    path,
                    ValidationRule::Maximum,
                    format!("value {n} is above the maximum of {max}"),
                ));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min) = self.min_length
                && len < min
            {
                errors.push(ValidationError::new(
                    path,
                    ValidationRule::MinLength,
                    format!("length {len} is shorter than the minimum of {min}"),
                ));
            }
            if let Some(max) = self.max_length
                && len > max
            {
                errors.push(ValidationError::new(
                    path,
                    ValidationRule::MaxLength,
                    format!("length {len} is longer than the maximum of {max}"),
                ));
            }
        }

        if let Some(allowed) = &self.allowed_values
            && !allowed.contains(value)
        {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            errors.push(ValidationError::new(
                path,
                ValidationRule::Enum,
                format!("value {value} is not one of [{}]", options.join(", ")),
            ));
        }

        check_nested(&self.kind, value, path, errors);
    }
}

fn check_nested(kind: &FieldKind, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    match (kind, value) {
        (FieldKind::Object { schema: Some(schema) }, Value::Object(map)) => {
            schema.check_object(map, path, errors);
        }
        (FieldKind::Array { items: Some(items) }, Value::Array(elements)) => {
            for (i, element) in elements.iter().enumerate() {
                let element_path = format!("{path}[{i}]");
                if !items.matches(element) {
                    errors.push(ValidationError::new(
                        &element_path,
                        ValidationRule::Type,
                        format!("expected {}, found {}", items.name(), json_type(element)),
                    ));
                    continue;
                }
                check_nested(items, element, &element_path, errors);
            }
        }
        _ => {}
    }
}

/// The declared shape of a structured output.
///
/// ```rust
/// # use vordr::validation::{FieldKind, FieldRule, OutputSchema};
/// let schema = OutputSchema::new("SceneAnalysis")
///     .field(FieldRule::required("summary", FieldKind::String).min_length(1))
///     .field(FieldRule::required("shots", FieldKind::array_of(FieldKind::String)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSchema {
    pub name: String,
    pub fields: Vec<FieldRule>,
    /// Whether keys without a rule are accepted. Default: true.
    pub allow_additional_fields: bool,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            allow_additional_fields: true,
        }
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    /// Reject keys that have no rule.
    pub fn deny_additional_fields(mut self) -> Self {
        self.allow_additional_fields = false;
        self
    }

    /// Human- and model-readable rendering, used in repair prompts.
    pub fn definition(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.name.clone())
    }

    /// Every rule violation in `value`. Empty means valid.
    pub fn validate(&self, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        match value {
            Value::Object(map) => self.check_object(map, "$", &mut errors),
            other => errors.push(ValidationError::new(
                "$",
                ValidationRule::Type,
                format!("expected object, found {}", json_type(other)),
            )),
        }
        errors
    }

    fn check_object(&self, map: &Map<String, Value>, path: &str, errors: &mut Vec<ValidationError>) {
        for rule in &self.fields {
            let field_path = format!("{path}.{}", rule.name);
            match map.get(&rule.name) {
                None | Some(Value::Null) if rule.required => {
                    errors.push(ValidationError::new(
                        &field_path,
                        ValidationRule::Required,
                        "required field is missing",
                    ));
                }
                None | Some(Value::Null) => {}
                Some(value) => rule.check(value, &field_path, errors),
            }
        }
        if !self.allow_additional_fields {
            for key in map.keys() {
                if !self.fields.iter().any(|rule| &rule.name == key) {
                    errors.push(ValidationError::new(
                        &format!("{path}.{key}"),
                        ValidationRule::UnknownField,
                        "field is not part of the schema",
                    ));
                }
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
