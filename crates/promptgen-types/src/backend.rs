// Backend trait: the contract every text-generation backend must implement.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::context::CallContext;
use crate::error::Error;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The two sources a backend hands back when a stream starts.
///
/// Content closes to signal normal end of stream. The error source yields at most one
/// error. Both close when the producing [`BackendSink`] is dropped.
#[derive(Debug)]
pub struct BackendStream {
    pub content: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<Error>,
}

/// Producer half of a [`BackendStream`].
#[derive(Debug, Clone)]
pub struct BackendSink {
    content: mpsc::Sender<String>,
    errors: mpsc::Sender<Error>,
}

impl BackendStream {
    /// Create a stream with a content buffer of `capacity` tokens.
    pub fn channel(capacity: usize) -> (BackendStream, BackendSink) {
        let (content_tx, content_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel(1);
        (
            BackendStream {
                content: content_rx,
                errors: error_rx,
            },
            BackendSink {
                content: content_tx,
                errors: error_tx,
            },
        )
    }
}

impl BackendSink {
    /// Send one token. Returns `false` once the consumer has gone away.
    pub async fn send(&self, token: impl Into<String>) -> bool {
        self.content.send(token.into()).await.is_ok()
    }

    /// Report the stream's error and close both sources.
    pub async fn fail(self, err: Error) {
        let _ = self.errors.send(err).await;
    }

    /// True once the consumer dropped the content source.
    pub fn is_closed(&self) -> bool {
        self.content.is_closed()
    }
}

/// The contract every backend must implement.
///
/// Uses explicit [`BoxFuture`] return types rather than `async-trait` so lifetimes
/// stay visible in the signature.
pub trait Backend: Send + Sync {
    /// Backend name (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Send a prompt, return the full reply text.
    fn complete<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>>;

    /// Start a streamed completion. An `Err` means the stream could not be started.
    ///
    /// Implementations stop producing and drop their sink promptly once `ctx` is done.
    fn stream<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<BackendStream, Error>>;
}
