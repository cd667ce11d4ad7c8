// MockBackend: scripted backend for tests and examples.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use promptgen_types::{Backend, BackendStream, BoxFuture, CallContext, Error};

/// One queued `stream()` outcome.
#[derive(Debug, Default)]
pub struct StreamScript {
    tokens: Vec<String>,
    trailing_error: Option<Error>,
    start_error: Option<Error>,
}

/// A backend that replays queued outcomes in FIFO order.
///
/// Every prompt it receives is recorded behind a mutex, so one mock can be shared across
/// concurrent calls.
pub struct MockBackend {
    name: String,
    completions: Mutex<VecDeque<Result<String, Error>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    recorded: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    /// Latency before each `complete()` reply.
    delay: Mutex<Option<Duration>>,
    /// Pause before each streamed token.
    token_delay: Mutex<Option<Duration>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completions: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            recorded: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            delay: Mutex::new(None),
            token_delay: Mutex::new(None),
        }
    }

    /// Queue a successful `complete()` reply.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        lock(&self.completions).push_back(Ok(text.into()));
        self
    }

    /// Queue a failing `complete()` call.
    pub fn with_error(self, error: Error) -> Self {
        lock(&self.completions).push_back(Err(error));
        self
    }

    /// Delay every `complete()` reply. The delay is cut short when the context ends.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    /// Queue a stream that emits `tokens` and then ends normally.
    pub fn with_stream<S: Into<String>>(self, tokens: impl IntoIterator<Item = S>) -> Self {
        lock(&self.streams).push_back(StreamScript {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Default::default()
        });
        self
    }

    /// Queue a stream that emits `tokens` and then reports `error`.
    pub fn with_stream_error<S: Into<String>>(
        self,
        tokens: impl IntoIterator<Item = S>,
        error: Error,
    ) -> Self {
        lock(&self.streams).push_back(StreamScript {
            tokens: tokens.into_iter().map(Into::into).collect(),
            trailing_error: Some(error),
            start_error: None,
        });
        self
    }

    /// Queue a `stream()` call that fails before producing anything.
    pub fn with_stream_start_error(self, error: Error) -> Self {
        lock(&self.streams).push_back(StreamScript {
            start_error: Some(error),
            ..Default::default()
        });
        self
    }

    /// Pause before each streamed token. Pair with `tokio::time::pause()` for determinism.
    pub fn with_token_delay(self, delay: Duration) -> Self {
        *lock(&self.token_delay) = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received by `complete()` or `stream()`, in arrival order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        lock(&self.recorded).clone()
    }

    fn record(&self, prompt: &str) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded).push(prompt.to_string());
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        self.record(prompt);
        let delay = *lock(&self.delay);
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::select! {
                    biased;
                    err = ctx.done() => return Err(err),
                    _ = tokio::time::sleep(d) => {}
                }
            }
            lock(&self.completions)
                .pop_front()
                .unwrap_or_else(|| Err(Error::configuration("MockBackend: no responses queued")))
        })
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<BackendStream, Error>> {
        self.record(prompt);
        let script = lock(&self.streams).pop_front().unwrap_or_default();
        let delay = *lock(&self.token_delay);
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(err) = script.start_error {
                return Err(err);
            }
            let (stream, sink) = BackendStream::channel(1);
            tokio::spawn(async move {
                for token in script.tokens {
                    if let Some(d) = delay {
                        tokio::select! {
                            biased;
                            _ = ctx.done() => return,
                            _ = tokio::time::sleep(d) => {}
                        }
                    }
                    if !sink.send(token).await {
                        return;
                    }
                }
                if let Some(err) = script.trailing_error {
                    sink.fail(err).await;
                }
            });
            Ok(stream)
        })
    }
}
