use super::ValidationError;

/// Build a follow-up prompt asking the model to fix an invalid output.
///
/// The prompt restates the original request, quotes the rejected output,
/// numbers every problem, and includes the schema definition.
pub fn generate_repair_prompt(
    original_prompt: &str,
    failed_output: &str,
    errors: &[ValidationError],
    schema_definition: &str,
) -> String {
    let mut prompt = String::with_capacity(
        original_prompt.len() + failed_output.len() + schema_definition.len() + 512,
    );
    prompt.push_str("Your previous response did not match the required output format.\n\n");

    prompt.push_str("## Original request\n\n");
    prompt.push_str(original_prompt.trim());
    prompt.push_str("\n\n## Your previous response\n\n");
    prompt.push_str(failed_output.trim());

    prompt.push_str("\n\n## Problems to fix\n\n");
    if errors.is_empty() {
        prompt.push_str("1. The response could not be used as structured output.\n");
    }
    for (i, error) in errors.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", i + 1, error.path, error.message));
    }

    prompt.push_str("\n## Required schema\n\n");
    prompt.push_str(schema_definition.trim());
    prompt.push_str(
        "\n\nRespond with only the corrected JSON document. \
         Do not add commentary or code fences.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationRule;

    #[test]
    fn enumerates_every_error() {
        let errors = vec![
            ValidationError::new("$.title", ValidationRule::Required, "required field is missing"),
            ValidationError::new("$.score", ValidationRule::Maximum, "value 2 is above the maximum of 1"),
        ];
        let prompt = generate_repair_prompt("analyse scene 1", "{\"score\": 2}", &errors, "{}");
        assert!(prompt.contains("analyse scene 1"));
        assert!(prompt.contains("{\"score\": 2}"));
        assert!(prompt.contains("1. $.title: required field is missing"));
        assert!(prompt.contains("2. $.score: value 2 is above the maximum of 1"));
        assert!(prompt.contains("## Required schema"));
    }
}
