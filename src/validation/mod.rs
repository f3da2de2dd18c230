//! Structured output validation and repair prompts.
//!
//! Model output is first unwrapped ([`extract_json`]), then parsed, then
//! checked against an [`OutputSchema`]. Every violated rule produces its own
//! [`ValidationError`] so a repair prompt can enumerate exactly what to fix.

mod repair;
pub mod schema;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use repair::generate_repair_prompt;
pub use schema::{FieldKind, FieldRule, OutputSchema};

/// Which rule a [`ValidationError`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// The text is not valid JSON.
    Parse,
    Required,
    Type,
    Minimum,
    Maximum,
    MinLength,
    MaxLength,
    Enum,
    UnknownField,
    /// The document matched the schema but not the target type.
    Deserialize,
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSONPath-style location, e.g. `$.shots[2].lens`.
    pub path: String,
    pub rule: ValidationRule,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: &str, rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating one output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// A type the orchestrator can request as structured output.
///
/// ```rust
/// use serde::Deserialize;
/// use vordr::validation::{FieldKind, FieldRule, OutputSchema, StructuredOutput};
///
/// #[derive(Deserialize)]
/// struct Mood {
///     label: String,
/// }
///
/// impl StructuredOutput for Mood {
///     fn schema() -> OutputSchema {
///         OutputSchema::new("Mood")
///             .field(FieldRule::required("label", FieldKind::String).one_of(["calm", "tense"]))
///     }
/// }
/// ```
pub trait StructuredOutput: DeserializeOwned {
    fn schema() -> OutputSchema;
}

/// Validate text against `T`'s schema and deserialize it.
///
/// The value is `Some` only when the result is valid.
pub fn validate_and_deserialize<T: StructuredOutput>(
    json_text: &str,
) -> (ValidationResult, Option<T>) {
    validate_as(&T::schema(), json_text)
}

/// Validate text against `schema`, then deserialize the document into `T`.
///
/// A document that satisfies the schema but not the type is invalid, with
/// a single [`ValidationRule::Deserialize`] error.
pub fn validate_as<T: DeserializeOwned>(
    schema: &OutputSchema,
    json_text: &str,
) -> (ValidationResult, Option<T>) {
    let (result, value) = validate_text(schema, json_text);
    let Some(value) = value else {
        return (result, None);
    };
    match serde_json::from_value::<T>(value) {
        Ok(parsed) => (result, Some(parsed)),
        Err(e) => (
            ValidationResult::from_errors(vec![ValidationError::new(
                "$",
                ValidationRule::Deserialize,
                e.to_string(),
            )]),
            None,
        ),
    }
}

/// Validate text against a schema, returning the parsed document when
/// valid.
pub fn validate_text(schema: &OutputSchema, text: &str) -> (ValidationResult, Option<Value>) {
    let value = match serde_json::from_str::<Value>(extract_json(text)) {
        Ok(value) => value,
        Err(e) => {
            return (
                ValidationResult::from_errors(vec![ValidationError::new(
                    "$",
                    ValidationRule::Parse,
                    format!("invalid JSON: {e}"),
                )]),
                None,
            );
        }
    };
    let errors = schema.validate(&value);
    if errors.is_empty() {
        (ValidationResult::valid(), Some(value))
    } else {
        (ValidationResult::from_errors(errors), None)
    }
}

/// Locate the JSON document inside model output.
///
/// Handles Markdown code fences and surrounding prose by returning the
/// first balanced object or array. Text without an opening brace or bracket
/// is returned trimmed, and an unbalanced document runs to the end of the
/// text, leaving the parser to report the problem.
pub fn extract_json(text: &str) -> &str {
    let Some(start) = text.find(['{', '[']) else {
        return text.trim();
    };
    let body = &text[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &body[..=i];
                }
            }
            _ => {}
        }
    }
    body.trim_end()
}
