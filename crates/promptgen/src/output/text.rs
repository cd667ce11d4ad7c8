use promptgen_types::Error;

use super::{with_instructions, OutputKind, OutputStrategy};

const TEXT_INSTRUCTIONS: &str = "Provide your response as plain text without any formatting or markers.\n\
Keep it concise and to the point.";

/// Plain text output. Surrounding whitespace is trimmed and an empty reply is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStrategy;

impl OutputStrategy<String> for TextStrategy {
    fn kind(&self) -> OutputKind {
        OutputKind::Text
    }

    fn wrap_prompt(&self, prompt: &str) -> String {
        with_instructions(prompt, TEXT_INSTRUCTIONS)
    }

    fn parse(&self, raw: &str) -> Result<String, Error> {
        Ok(raw.trim().to_string())
    }

    fn validate(&self, value: &String) -> Result<(), Error> {
        if value.is_empty() {
            return Err(Error::validation("response is empty"));
        }
        Ok(())
    }
}
