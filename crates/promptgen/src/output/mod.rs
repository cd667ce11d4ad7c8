// Output strategies: how a prompt asks for a shape, and how the reply is decoded and checked.
//
// The strategy for an output type is chosen once, from `Output::KIND`, when a generator is
// built. Nothing in the call path switches on the output type again.

pub mod primitive;
pub mod schema;
pub mod structured;
pub mod text;

use std::ops::{Deref, DerefMut};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use promptgen_types::Error;

pub use primitive::{BoolStrategy, FloatStrategy, IntegerStrategy};
pub use schema::SchemaValidator;
pub use structured::{extract_json, StructuredStrategy};
pub use text::TextStrategy;

/// Static descriptor of an output type's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Text,
    Integer,
    Float,
    Boolean,
    Structured,
}

/// Wraps prompts with format instructions and turns raw replies into `O`.
pub trait OutputStrategy<O>: Send + Sync {
    fn kind(&self) -> OutputKind;

    /// Append this shape's formatting instructions to a rendered prompt.
    fn wrap_prompt(&self, prompt: &str) -> String;

    /// Decode the raw reply. Failures are `InvalidResponse` errors.
    fn parse(&self, raw: &str) -> Result<O, Error>;

    /// Check a decoded value. Failures are `Validation` errors.
    fn validate(&self, value: &O) -> Result<(), Error>;

    /// The JSON schema text, for strategies that have one.
    fn schema_string(&self) -> Option<String> {
        None
    }

    /// Check raw JSON bytes against the schema, for strategies that have one.
    fn validate_json(&self, _bytes: &[u8]) -> Result<(), Error> {
        Err(Error::configuration(format!(
            "{:?} output has no JSON schema",
            self.kind()
        )))
    }
}

/// A type a generator can produce.
pub trait Output: Sized + Send + 'static {
    const KIND: OutputKind;

    /// Build the strategy for this type.
    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error>;
}

impl Output for String {
    const KIND: OutputKind = OutputKind::Text;

    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error> {
        Ok(Box::new(TextStrategy))
    }
}

impl Output for i64 {
    const KIND: OutputKind = OutputKind::Integer;

    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error> {
        Ok(Box::new(IntegerStrategy))
    }
}

impl Output for f64 {
    const KIND: OutputKind = OutputKind::Float;

    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error> {
        Ok(Box::new(FloatStrategy))
    }
}

impl Output for bool {
    const KIND: OutputKind = OutputKind::Boolean;

    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error> {
        Ok(Box::new(BoolStrategy))
    }
}

/// Structured output: a JSON object decoded into `T` and checked against `T`'s schema.
///
/// Field constraints come from `schemars` attributes on `T`, for example
/// `#[schemars(length(max = 100))]` or `#[schemars(range(min = 0, max = 150))]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Output for Json<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    const KIND: OutputKind = OutputKind::Structured;

    fn strategy() -> Result<Box<dyn OutputStrategy<Self>>, Error> {
        Ok(Box::new(StructuredStrategy::<T>::new()?))
    }
}

/// Join a rendered prompt and a format instruction block.
pub(crate) fn with_instructions(prompt: &str, instructions: &str) -> String {
    format!("{prompt}\n\n{instructions}")
}
