// Structured JSON output: schema-described prompt, fenced-block extraction, schema check.

use std::marker::PhantomData;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use promptgen_types::Error;

use super::schema::SchemaValidator;
use super::{with_instructions, Json, OutputKind, OutputStrategy};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?([\s\S]*?)```").expect("fenced block pattern"));

/// The JSON payload of a reply: the first fenced block if there is one, else the whole
/// trimmed reply. Returns `None` for an empty payload.
pub fn extract_json(raw: &str) -> Option<&str> {
    let body = match FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => raw,
    };
    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

/// Output strategy for [`Json<T>`].
pub struct StructuredStrategy<T> {
    validator: SchemaValidator,
    instructions: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema> StructuredStrategy<T> {
    pub fn new() -> Result<Self, Error> {
        let validator = SchemaValidator::for_type::<T>()?;
        let instructions = format!(
            "Format your response according to this JSON schema, pay close attention to the validation rules in the schema:\n\
{}\n\n\
Provide the result enclosed in triple backticks with 'json' on the first line.\n\
Don't put control characters in the wrong place or the JSON will be invalid.",
            validator.schema_string()?
        );
        Ok(Self {
            validator,
            instructions,
            _marker: PhantomData,
        })
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }
}

impl<T> OutputStrategy<Json<T>> for StructuredStrategy<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    fn kind(&self) -> OutputKind {
        OutputKind::Structured
    }

    fn wrap_prompt(&self, prompt: &str) -> String {
        with_instructions(prompt, &self.instructions)
    }

    fn parse(&self, raw: &str) -> Result<Json<T>, Error> {
        let body = extract_json(raw).ok_or_else(|| {
            Error::invalid_response("no JSON found in response")
                .with_code("invalid_format")
                .with_detail("response", raw)
        })?;
        serde_json::from_str::<T>(body).map(Json).map_err(|e| {
            Error::invalid_response(format!("failed to parse JSON: {e}"))
                .with_code("invalid_json")
                .with_detail("response", raw)
                .with_source(e)
        })
    }

    fn validate(&self, value: &Json<T>) -> Result<(), Error> {
        let instance = serde_json::to_value(&value.0).map_err(|e| {
            Error::validation(format!("failed to serialize value: {e}")).with_source(e)
        })?;
        self.validator.validate_value(&instance)
    }

    fn schema_string(&self) -> Option<String> {
        self.validator.schema_string().ok()
    }

    fn validate_json(&self, bytes: &[u8]) -> Result<(), Error> {
        self.validator.validate_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgen_types::ErrorKind;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct Summary {
        #[schemars(length(max = 100))]
        title: String,
        #[schemars(range(min = 1, max = 5))]
        rating: u8,
    }

    fn strategy() -> StructuredStrategy<Summary> {
        StructuredStrategy::new().unwrap()
    }

    #[test]
    fn test_extract_fenced_json() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_untagged_fence() {
        assert_eq!(extract_json("```\n[1,2]\n```"), Some("[1,2]"));
    }

    #[test]
    fn test_extract_first_block_wins() {
        let raw = "```json\n{\"n\":1}\n```\n```json\n{\"n\":2}\n```";
        assert_eq!(extract_json(raw), Some("{\"n\":1}"));
    }

    #[test]
    fn test_extract_falls_back_to_raw() {
        assert_eq!(extract_json("  {\"a\": 1}  "), Some("{\"a\": 1}"));
        assert_eq!(extract_json("   "), None);
        assert_eq!(extract_json("``````"), None);
    }

    #[test]
    fn test_wrap_embeds_schema_and_fence_rules() {
        let wrapped = strategy().wrap_prompt("Summarize this");
        assert!(wrapped.starts_with("Summarize this\n\nFormat your response according to this JSON schema"));
        assert!(wrapped.contains("\"maxLength\": 100"));
        assert!(wrapped.contains("triple backticks with 'json'"));
        assert!(wrapped.ends_with("or the JSON will be invalid."));
    }

    #[test]
    fn test_parse_fenced_and_raw() {
        let s = strategy();
        let fenced = s
            .parse("```json\n{\"title\": \"Rust\", \"rating\": 5}\n```")
            .unwrap();
        assert_eq!(fenced.title, "Rust");
        let raw = s.parse("{\"title\": \"Go\", \"rating\": 3}").unwrap();
        assert_eq!(raw.rating, 3);
    }

    #[test]
    fn test_parse_without_json_is_invalid_response() {
        let err = strategy().parse("I cannot answer that.").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.code, "invalid_json");

        let err = strategy().parse("").unwrap_err();
        assert_eq!(err.code, "invalid_format");
    }

    #[test]
    fn test_validate_reports_length_violation() {
        let s = strategy();
        let value = Json(Summary {
            title: "x".repeat(150),
            rating: 3,
        });
        let err = s.validate(&value).unwrap_err();
        assert!(err.is_validation());
        assert!(err.message.starts_with("title: "));
        assert!(err.message.contains("longer than 100"), "{}", err.message);
    }

    #[test]
    fn test_validate_aggregates_violations() {
        let err = strategy()
            .validate(&Json(Summary {
                title: "y".repeat(101),
                rating: 9,
            }))
            .unwrap_err();
        assert_eq!(err.message.split("; ").count(), 2, "{}", err.message);
    }

    #[test]
    fn test_validate_json_checks_extra_fields() {
        let err = strategy()
            .validate_json(br#"{"title": "t", "rating": 2, "extra": true}"#)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.message.starts_with("(root): "));
    }
}
