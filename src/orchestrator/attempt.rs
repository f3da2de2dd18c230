use crate::validation::{ValidationError, generate_repair_prompt};

/// One pass through the invoke-and-validate loop.
///
/// Each repair produces a new value; nothing is mutated across passes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attempt {
    /// 1-based invocation number.
    pub number: u32,
    pub prompt: String,
    /// Violations reported by every earlier attempt, oldest first.
    pub errors: Vec<ValidationError>,
}

impl Attempt {
    pub fn first(prompt: &str) -> Self {
        Self {
            number: 1,
            prompt: prompt.to_string(),
            errors: Vec::new(),
        }
    }

    /// Whether another repair is allowed after this attempt fails.
    pub fn can_repair(&self, max_retries: u32) -> bool {
        self.number <= max_retries
    }

    /// Next attempt, asking the model to fix `failed_output`.
    pub fn repair(
        &self,
        original_prompt: &str,
        failed_output: &str,
        errors: Vec<ValidationError>,
        schema_definition: &str,
    ) -> Self {
        let prompt =
            generate_repair_prompt(original_prompt, failed_output, &errors, schema_definition);
        let mut accumulated = self.errors.clone();
        accumulated.extend(errors);
        Self {
            number: self.number + 1,
            prompt,
            errors: accumulated,
        }
    }

    pub fn retries(&self) -> u32 {
        self.number - 1
    }
}
