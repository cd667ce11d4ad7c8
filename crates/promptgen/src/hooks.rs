// hooks.rs -- Hook chain execution and built-in hooks (Layer 3).
//
// Both phases run hooks in registration order. The first failing hook stops the chain and
// its error is wrapped as a `Hook` error.

use std::sync::Arc;

use promptgen_types::{BoxFuture, CallContext, Error, Hook};

/// An ordered list of hooks, shared cheaply between a generator and its stream tasks.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Thread the prompt through every hook's `before_request`.
    pub async fn before_request(&self, ctx: &CallContext, prompt: String) -> Result<String, Error> {
        let mut prompt = prompt;
        for hook in &self.hooks {
            prompt = hook
                .before_request(ctx, prompt)
                .await
                .map_err(Error::hook)?;
        }
        Ok(prompt)
    }

    /// Thread a response (or a single streamed token) through every hook's `after_response`.
    pub async fn after_response(
        &self,
        ctx: &CallContext,
        response: String,
        error: Option<&Error>,
    ) -> Result<String, Error> {
        let mut response = response;
        for hook in &self.hooks {
            response = hook
                .after_response(ctx, response, error)
                .await
                .map_err(Error::hook)?;
        }
        Ok(response)
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Logs prompts and responses with `tracing` at `info` level.
///
/// Only lengths are logged by default; enable `with_content` to include the text itself.
#[derive(Debug, Clone, Default)]
pub struct LoggingHook {
    include_content: bool,
}

impl LoggingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self) -> Self {
        self.include_content = true;
        self
    }
}

impl Hook for LoggingHook {
    fn before_request<'a>(
        &'a self,
        _ctx: &'a CallContext,
        prompt: String,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            if self.include_content {
                tracing::info!(prompt_len = prompt.len(), prompt = %prompt, "prompt request");
            } else {
                tracing::info!(prompt_len = prompt.len(), "prompt request");
            }
            Ok(prompt)
        })
    }

    fn after_response<'a>(
        &'a self,
        _ctx: &'a CallContext,
        response: String,
        error: Option<&'a Error>,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            match error {
                Some(err) => tracing::warn!(error = %err, "prompt response failed"),
                None if self.include_content => {
                    tracing::info!(response_len = response.len(), response = %response, "prompt response")
                }
                None => tracing::info!(response_len = response.len(), "prompt response"),
            }
            Ok(response)
        })
    }
}

type TransformFn = Arc<dyn Fn(String) -> Result<String, Error> + Send + Sync>;

/// A hook built from plain closures.
///
/// # Example
/// ```ignore
/// let hook = FnHook::new()
///     .before(|prompt| Ok(format!("{prompt}\nAnswer in French.")))
///     .after(|response| Ok(response.replace("Bonjour", "Salut")));
/// ```
#[derive(Clone, Default)]
pub struct FnHook {
    before: Option<TransformFn>,
    after: Option<TransformFn>,
}

impl FnHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(
        mut self,
        f: impl Fn(String) -> Result<String, Error> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after(
        mut self,
        f: impl Fn(String) -> Result<String, Error> + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(f));
        self
    }
}

impl Hook for FnHook {
    fn before_request<'a>(
        &'a self,
        _ctx: &'a CallContext,
        prompt: String,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            match &self.before {
                Some(f) => f(prompt),
                None => Ok(prompt),
            }
        })
    }

    fn after_response<'a>(
        &'a self,
        _ctx: &'a CallContext,
        response: String,
        _error: Option<&'a Error>,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            match &self.after {
                Some(f) => f(response),
                None => Ok(response),
            }
        })
    }
}

impl std::fmt::Debug for FnHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHook")
            .field("before", &self.before.as_ref().map(|_| "..."))
            .field("after", &self.after.as_ref().map(|_| "..."))
            .finish()
    }
}
