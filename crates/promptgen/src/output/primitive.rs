// Integer, float and boolean outputs: a single token in the reply, parsed locale-free.

use promptgen_types::Error;

use super::{with_instructions, OutputKind, OutputStrategy};

const INTEGER_INSTRUCTIONS: &str = "Provide your response as a single integer number.\n\
Do not include any units, symbols, or additional text.\n\
Examples: 42, -17, 0";

const FLOAT_INSTRUCTIONS: &str = "Provide your response as a single decimal number.\n\
Use a period (.) as the decimal separator.\n\
Do not include any units, symbols, or additional text.\n\
Examples: 3.14, -2.5, 0.0, 42.0";

const BOOL_INSTRUCTIONS: &str = "Provide your response as a single word: true or false.\n\
Do not include any additional text or explanation.\n\
Examples: true, false";

fn invalid(what: &str, raw: &str) -> Error {
    Error::invalid_response(format!("invalid {what} value: {raw:?}"))
        .with_code("invalid_format")
        .with_detail("response", raw)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerStrategy;

impl OutputStrategy<i64> for IntegerStrategy {
    fn kind(&self) -> OutputKind {
        OutputKind::Integer
    }

    fn wrap_prompt(&self, prompt: &str) -> String {
        with_instructions(prompt, INTEGER_INSTRUCTIONS)
    }

    fn parse(&self, raw: &str) -> Result<i64, Error> {
        let text = raw.trim();
        text.parse::<i64>().map_err(|_| invalid("integer", text))
    }

    fn validate(&self, _value: &i64) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatStrategy;

impl OutputStrategy<f64> for FloatStrategy {
    fn kind(&self) -> OutputKind {
        OutputKind::Float
    }

    fn wrap_prompt(&self, prompt: &str) -> String {
        with_instructions(prompt, FLOAT_INSTRUCTIONS)
    }

    fn parse(&self, raw: &str) -> Result<f64, Error> {
        let text = raw.trim();
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid("float", text)),
        }
    }

    fn validate(&self, value: &f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::validation(format!("{value} is not a finite number")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolStrategy;

impl OutputStrategy<bool> for BoolStrategy {
    fn kind(&self) -> OutputKind {
        OutputKind::Boolean
    }

    fn wrap_prompt(&self, prompt: &str) -> String {
        with_instructions(prompt, BOOL_INSTRUCTIONS)
    }

    fn parse(&self, raw: &str) -> Result<bool, Error> {
        let text = raw.trim();
        parse_bool(text).ok_or_else(|| invalid("boolean", text))
    }

    fn validate(&self, _value: &bool) -> Result<(), Error> {
        Ok(())
    }
}

/// Accepts true/false, yes/no and 1/0 in any case, then the short literals t/f.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "t" => Some(true),
        "false" | "no" | "0" | "f" => Some(false),
        _ => None,
    }
}
