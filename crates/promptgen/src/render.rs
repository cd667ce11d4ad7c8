// Renderer: binds a typed input value into the prompt template.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use promptgen_types::Error;

const TEMPLATE_NAME: &str = "prompt";

/// A compiled prompt template.
///
/// Templates use Jinja syntax (`{{ Name }}`, `{% if %}`, `{% for %}`). Referencing a field
/// the input does not have is a render error, not an empty string.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Compile `source`. Syntax errors surface as `Template` errors.
    pub fn new(source: impl Into<String>) -> Result<Self, Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .map_err(|e| template_error("failed to parse template", e))?;
        Ok(Self { env })
    }

    /// Render the template against `input`.
    pub fn render<I: Serialize>(&self, input: &I) -> Result<String, Error> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| template_error("template missing", e))?;
        template
            .render(input)
            .map_err(|e| template_error("failed to render template", e))
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

fn template_error(context: &str, err: minijinja::Error) -> Error {
    Error::template(format!("{context}: {err}"))
        .with_code("invalid_template")
        .with_source(err)
}
