// generator.rs -- Generator: the typed request/response pipeline (Layer 4).
//
// run():    render -> wrap -> before hooks -> complete -> classify -> after hooks -> parse -> validate
// stream(): render -> wrap -> before hooks -> stream, then a multiplexer task per call
//
// Every stage either succeeds or returns one classified error. Nothing is retried.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;

use promptgen_types::{
    classify_backend_error, Backend, BackendStream, CallContext, Error, Hook, ModelSettings,
};

use crate::default_backend::{backend_with_settings, get_default_backend};
use crate::hooks::HookChain;
use crate::output::{Output, OutputKind, OutputStrategy};
use crate::render::Renderer;
use crate::stream::{spawn_multiplexer, GenerationStream};

/// Renders a typed input into a prompt, calls a backend, and decodes a typed output.
///
/// The template is compiled and test-rendered against `I::default()` at construction, so a
/// template that references a field `I` does not have fails here rather than on first use.
/// Configure with the `with_*` methods before sharing; `run` and `stream` take `&self` and
/// may be called concurrently.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Default)]
/// struct Question { topic: String }
///
/// let generator = Generator::<Question, bool>::new("Is {{ topic }} a programming language?")?
///     .with_timeout(Duration::from_secs(30));
/// let answer = generator.run(&CallContext::new(), &Question { topic: "Rust".into() }).await?;
/// ```
pub struct Generator<I, O> {
    renderer: Renderer,
    strategy: Box<dyn OutputStrategy<O>>,
    backend: Option<Arc<dyn Backend>>,
    settings: Option<ModelSettings>,
    settings_backend: OnceLock<Arc<dyn Backend>>,
    hooks: HookChain,
    timeout: Option<Duration>,
    _input: PhantomData<fn(&I)>,
}

impl<I, O> Generator<I, O>
where
    I: Serialize + Default,
    O: Output,
{
    /// Compile `template`, test-render it, and pick the output strategy for `O`.
    pub fn new(template: impl Into<String>) -> Result<Self, Error> {
        let renderer = Renderer::new(template)?;
        renderer.render(&I::default())?;
        let strategy = O::strategy()?;
        Ok(Self {
            renderer,
            strategy,
            backend: None,
            settings: None,
            settings_backend: OnceLock::new(),
            hooks: HookChain::new(),
            timeout: None,
            _input: PhantomData,
        })
    }

    /// Use `backend` instead of the process default.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Model parameters for this generator's own backend.
    ///
    /// Without an explicit backend, the generator builds one from the environment with
    /// these settings on first use instead of sharing the process default. Ignored when
    /// [`with_backend`](Self::with_backend) is also set.
    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = Some(settings);
        self.settings_backend = OnceLock::new();
        self
    }

    /// Append a hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Bound every call to `timeout`. Zero means no bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn output_kind(&self) -> OutputKind {
        O::KIND
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn settings(&self) -> Option<&ModelSettings> {
        self.settings.as_ref()
    }

    /// The JSON schema embedded in prompts, for structured outputs.
    pub fn schema_string(&self) -> Option<String> {
        self.strategy.schema_string()
    }

    /// Check raw JSON bytes against the output schema.
    pub fn validate_response(&self, bytes: &[u8]) -> Result<(), Error> {
        self.strategy.validate_json(bytes)
    }

    /// The rendered template, without format instructions.
    pub fn render(&self, input: &I) -> Result<String, Error> {
        self.renderer.render(input)
    }

    /// The prompt as the hooks will first see it: rendered and wrapped.
    pub fn prompt(&self, input: &I) -> Result<String, Error> {
        let rendered = self.render(input)?;
        Ok(self.strategy.wrap_prompt(&rendered))
    }

    /// Generate one value.
    pub async fn run(&self, ctx: &CallContext, input: &I) -> Result<O, Error> {
        let backend = self.resolve_backend()?;
        let ctx = self.call_context(ctx);
        tokio::select! {
            biased;
            err = ctx.done() => {
                tracing::debug!(error = %err, "generation interrupted");
                Err(err)
            }
            result = self.pipeline(&ctx, backend.as_ref(), input) => result,
        }
    }

    /// Start a live generation. Tokens pass through the after-response hooks one by one;
    /// no parsing or validation is applied to streamed text.
    pub async fn stream(&self, ctx: &CallContext, input: &I) -> Result<GenerationStream, Error> {
        let backend = self.resolve_backend()?;
        let ctx = self.call_context(ctx);
        let backend_ctx = ctx.child();
        let started = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            result = self.start_stream(&ctx, &backend_ctx, backend.as_ref(), input) => result,
        };
        match started {
            Ok(source) => Ok(spawn_multiplexer(ctx, backend_ctx, source, self.hooks.clone())),
            Err(err) => {
                backend_ctx.cancel();
                Err(err)
            }
        }
    }

    async fn pipeline(&self, ctx: &CallContext, backend: &dyn Backend, input: &I) -> Result<O, Error> {
        let prompt = self.prepare(ctx, input).await?;

        tracing::debug!(stage = "complete", backend = backend.name(), "calling backend");
        let raw = backend
            .complete(ctx, &prompt)
            .await
            .map_err(classify_backend_error)?;

        tracing::debug!(stage = "after_hooks", response_len = raw.len());
        let raw = self.hooks.after_response(ctx, raw, None).await?;

        tracing::debug!(stage = "parse", kind = ?O::KIND);
        let value = self.strategy.parse(&raw)?;
        self.strategy.validate(&value)?;
        Ok(value)
    }

    async fn start_stream(
        &self,
        ctx: &CallContext,
        backend_ctx: &CallContext,
        backend: &dyn Backend,
        input: &I,
    ) -> Result<BackendStream, Error> {
        let prompt = self.prepare(ctx, input).await?;
        tracing::debug!(stage = "stream", backend = backend.name(), "starting backend stream");
        backend
            .stream(backend_ctx, &prompt)
            .await
            .map_err(classify_backend_error)
    }

    /// Render, wrap, and run the before-request hooks.
    async fn prepare(&self, ctx: &CallContext, input: &I) -> Result<String, Error> {
        tracing::debug!(stage = "render");
        let rendered = self.render(input)?;
        tracing::debug!(stage = "wrap", kind = ?O::KIND);
        let prompt = self.strategy.wrap_prompt(&rendered);
        tracing::debug!(stage = "before_hooks", hooks = self.hooks.len(), prompt_len = prompt.len());
        self.hooks.before_request(ctx, prompt).await
    }

    fn resolve_backend(&self) -> Result<Arc<dyn Backend>, Error> {
        match (&self.backend, &self.settings) {
            (Some(backend), _) => Ok(Arc::clone(backend)),
            (None, Some(settings)) => {
                if let Some(backend) = self.settings_backend.get() {
                    return Ok(Arc::clone(backend));
                }
                let built = backend_with_settings(settings)?;
                tracing::debug!(
                    backend = built.name(),
                    model = %settings.model,
                    "built backend for generator settings"
                );
                Ok(Arc::clone(self.settings_backend.get_or_init(|| built)))
            }
            (None, None) => get_default_backend(),
        }
    }

    fn call_context(&self, ctx: &CallContext) -> CallContext {
        match self.timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        }
    }
}

impl<I, O> std::fmt::Debug for Generator<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("output", &self.strategy.kind())
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("settings", &self.settings)
            .field("hooks", &self.hooks.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
