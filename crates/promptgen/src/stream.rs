// stream.rs -- Live generation stream and the task that feeds it (Layer 4).
//
// One task per stream merges the backend's content and error sources with the call
// context. Content is published in arrival order with at most one token in flight, and the
// task ends with exactly one terminal outcome: `Ok(())` or the error that stopped it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use promptgen_types::{classify_backend_error, BackendStream, CallContext, Error};

use crate::hooks::HookChain;

/// One observation from a [`GenerationStream`] used as a `Stream`.
#[derive(Debug)]
pub enum StreamEvent {
    /// A token, already passed through the after-response hooks.
    Content(String),
    /// The stream failed. No content follows.
    Error(Error),
    /// The stream completed normally.
    Done,
}

/// Terminal outcome of a stream: resolves to `Ok(())` on completion or the stream's error.
#[derive(Debug)]
pub struct StreamOutcome {
    rx: oneshot::Receiver<Result<(), Error>>,
}

impl Future for StreamOutcome {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(Error::stream("stream task ended without an outcome")))
        })
    }
}

/// Content side of a stream.
///
/// Once the call's context is done no further token is handed out, even one the
/// multiplexer buffered before the cancellation.
#[derive(Debug)]
pub struct TokenReceiver {
    rx: mpsc::Receiver<String>,
    ctx: CallContext,
    closed: bool,
}

impl TokenReceiver {
    /// The next token, or `None` once the content output is closed or the context is done.
    pub async fn recv(&mut self) -> Option<String> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if self.closed {
            return Poll::Ready(None);
        }
        if self.ctx.is_done() {
            self.close();
            return Poll::Ready(None);
        }
        let received = std::task::ready!(self.rx.poll_recv(cx));
        if received.is_none() || self.ctx.is_done() {
            self.close();
            return Poll::Ready(None);
        }
        Poll::Ready(received)
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}

/// A live generation: content tokens, then exactly one terminal outcome.
///
/// Read tokens with [`next_token`](Self::next_token) and then call
/// [`finish`](Self::finish), or consume it as a `futures::Stream` of [`StreamEvent`]s.
/// Dropping it cancels the generation.
#[derive(Debug)]
pub struct GenerationStream {
    tokens: TokenReceiver,
    outcome: StreamOutcome,
    terminated: bool,
}

impl GenerationStream {
    fn new(
        ctx: CallContext,
        content: mpsc::Receiver<String>,
        outcome: oneshot::Receiver<Result<(), Error>>,
    ) -> Self {
        Self {
            tokens: TokenReceiver {
                rx: content,
                ctx,
                closed: false,
            },
            outcome: StreamOutcome { rx: outcome },
            terminated: false,
        }
    }

    /// The next token, or `None` once the content output is closed or the call was
    /// cancelled or timed out.
    pub async fn next_token(&mut self) -> Option<String> {
        self.tokens.recv().await
    }

    /// Discard any unread tokens and wait for the terminal outcome.
    pub async fn finish(mut self) -> Result<(), Error> {
        while self.next_token().await.is_some() {}
        self.outcome.await
    }

    /// Concatenate every token, then return the text or the stream's error.
    pub async fn collect_text(mut self) -> Result<String, Error> {
        let mut text = String::new();
        while let Some(token) = self.next_token().await {
            text.push_str(&token);
        }
        self.outcome.await?;
        Ok(text)
    }

    /// Split into the token receiver and the terminal outcome, for use on separate tasks.
    pub fn into_parts(self) -> (TokenReceiver, StreamOutcome) {
        (self.tokens, self.outcome)
    }
}

impl futures_core::Stream for GenerationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.tokens.poll_recv(cx) {
            Poll::Ready(Some(token)) => return Poll::Ready(Some(StreamEvent::Content(token))),
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }
        match Pin::new(&mut this.outcome).poll(cx) {
            Poll::Ready(outcome) => {
                this.terminated = true;
                Poll::Ready(Some(match outcome {
                    Ok(()) => StreamEvent::Done,
                    Err(err) => StreamEvent::Error(err),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start the task that turns `source` into a [`GenerationStream`].
///
/// `backend_ctx` is the scope the backend was started with; it is cancelled when the task
/// exits so the backend stops producing.
pub(crate) fn spawn_multiplexer(
    ctx: CallContext,
    backend_ctx: CallContext,
    source: BackendStream,
    hooks: HookChain,
) -> GenerationStream {
    let (content_tx, content_rx) = mpsc::channel(1);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let consumer_ctx = ctx.clone();

    tokio::spawn(async move {
        let mut mux = Multiplexer {
            ctx,
            hooks,
            out: content_tx,
            published: 0,
        };
        let outcome = mux.run(source).await;
        backend_ctx.cancel();

        match &outcome {
            Ok(()) => tracing::debug!(tokens = mux.published, "stream completed"),
            Err(err) => tracing::debug!(tokens = mux.published, error = %err, "stream ended with error"),
        }
        // Content closes before the outcome is observable.
        drop(mux);
        let _ = outcome_tx.send(outcome);
    });

    GenerationStream::new(consumer_ctx, content_rx, outcome_rx)
}

struct Multiplexer {
    ctx: CallContext,
    hooks: HookChain,
    out: mpsc::Sender<String>,
    published: usize,
}

impl Multiplexer {
    async fn run(&mut self, mut source: BackendStream) -> Result<(), Error> {
        let mut errors_open = true;
        loop {
            tokio::select! {
                biased;
                err = self.ctx.done() => return Err(err),
                _ = self.out.closed() => return Err(consumer_gone()),
                item = source.content.recv() => match item {
                    Some(token) => self.forward(token).await?,
                    None => return self.trailing_error(&mut source.errors, errors_open).await,
                },
                item = source.errors.recv(), if errors_open => match item {
                    Some(err) => return Err(classify_backend_error(err)),
                    None => errors_open = false,
                },
            }
        }
    }

    /// Run one token through the hooks and publish it, yielding to the context throughout.
    async fn forward(&mut self, token: String) -> Result<(), Error> {
        let token = tokio::select! {
            biased;
            err = self.ctx.done() => return Err(err),
            hooked = self.hooks.after_response(&self.ctx, token, None) => hooked?,
        };
        tokio::select! {
            biased;
            err = self.ctx.done() => Err(err),
            sent = self.out.send(token) => sent.map_err(|_| consumer_gone()),
        }?;
        self.published += 1;
        Ok(())
    }

    /// Content closed: surface an error the backend reported alongside, if any.
    async fn trailing_error(
        &self,
        errors: &mut mpsc::Receiver<Error>,
        errors_open: bool,
    ) -> Result<(), Error> {
        if !errors_open {
            return Ok(());
        }
        tokio::select! {
            biased;
            err = self.ctx.done() => Err(err),
            item = errors.recv() => match item {
                Some(err) => Err(classify_backend_error(err)),
                None => Ok(()),
            },
        }
    }
}

fn consumer_gone() -> Error {
    tracing::warn!("stream consumer dropped before the stream finished");
    Error::canceled().with_detail("reason", "consumer dropped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use promptgen_types::ErrorKind;
    use std::time::Duration;

    use crate::hooks::FnHook;
    use std::sync::Arc;

    fn start(source: BackendStream, ctx: CallContext, hooks: HookChain) -> GenerationStream {
        let backend_ctx = ctx.child();
        spawn_multiplexer(ctx, backend_ctx, source, hooks)
    }

    async fn feed(tokens: &[&str], error: Option<Error>) -> BackendStream {
        let (stream, sink) = BackendStream::channel(tokens.len() + 1);
        for t in tokens {
            sink.send(*t).await;
        }
        if let Some(err) = error {
            sink.fail(err).await;
        }
        stream
    }

    #[tokio::test]
    async fn test_tokens_then_done() {
        let source = feed(&["a", "b", "c"], None).await;
        let events: Vec<StreamEvent> = start(source, CallContext::new(), HookChain::new())
            .collect()
            .await;
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StreamEvent::Content(t) if t == "a"));
        assert!(matches!(&events[1], StreamEvent::Content(t) if t == "b"));
        assert!(matches!(&events[2], StreamEvent::Content(t) if t == "c"));
        assert!(matches!(events[3], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_trailing_error_after_tokens() {
        let source = feed(&["a", "b"], Some(Error::backend("cut off"))).await;
        let mut stream = start(source, CallContext::new(), HookChain::new());
        assert_eq!(stream.next_token().await.as_deref(), Some("a"));
        assert_eq!(stream.next_token().await.as_deref(), Some("b"));
        assert!(stream.next_token().await.is_none());
        let err = stream.finish().await.unwrap_err();
        assert_eq!(err.message, "cut off");
    }

    #[tokio::test]
    async fn test_backend_error_is_classified() {
        let source = feed(&[], Some(Error::backend("Too Many Requests"))).await;
        let err = start(source, CallContext::new(), HookChain::new())
            .finish()
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_hooks_transform_each_token() {
        let mut hooks = HookChain::new();
        hooks.push(Arc::new(FnHook::new().after(|t| Ok(t.to_uppercase()))));
        let source = feed(&["ab", "cd"], None).await;
        let text = start(source, CallContext::new(), hooks)
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "ABCD");
    }

    #[tokio::test]
    async fn test_hook_error_terminates_without_forwarding() {
        let mut hooks = HookChain::new();
        hooks.push(Arc::new(FnHook::new().after(|t| {
            if t == "bad" {
                Err(Error::validation("bad token"))
            } else {
                Ok(t)
            }
        })));
        let source = feed(&["ok", "bad", "never"], None).await;
        let events: Vec<StreamEvent> = start(source, CallContext::new(), hooks).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Content(t) if t == "ok"));
        match &events[1] {
            StreamEvent::Error(err) => {
                assert_eq!(err.kind, ErrorKind::Hook);
                assert!(err.is_validation());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wins_over_stalled_consumer() {
        let source = feed(&["a", "b", "c"], None).await;
        let ctx = CallContext::new();
        let stream = start(source, ctx.clone(), HookChain::new());
        let (mut content, outcome) = stream.into_parts();

        // Let the task block on publishing the second token.
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        let err = outcome.await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Canceled);
        assert!(content.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_token_withheld_after_cancel() {
        let source = feed(&["a", "b", "c"], None).await;
        let ctx = CallContext::new();
        let mut stream = start(source, ctx.clone(), HookChain::new());

        // "a" sits in the content buffer while the task waits to publish "b".
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        assert!(stream.next_token().await.is_none());
        assert!(stream.next_token().await.is_none());
        assert_eq!(stream.finish().await.unwrap_err().kind, ErrorKind::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_cancel_are_terminal_only() {
        let source = feed(&["a", "b", "c"], None).await;
        let ctx = CallContext::new();
        let stream = start(source, ctx.clone(), HookChain::new());

        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        let events: Vec<StreamEvent> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(err) if err.is_canceled()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_backend_idle() {
        let (source, sink) = BackendStream::channel(1);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let backend_ctx = ctx.child();
        let stream = spawn_multiplexer(ctx, backend_ctx.clone(), source, HookChain::new());

        let err = stream.finish().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(backend_ctx.token().is_cancelled());
        drop(sink);
    }

    #[tokio::test]
    async fn test_dropped_consumer_stops_backend() {
        let (source, sink) = BackendStream::channel(1);
        let ctx = CallContext::new();
        let backend_ctx = ctx.child();
        let stream = spawn_multiplexer(ctx.clone(), backend_ctx.clone(), source, HookChain::new());
        drop(stream);

        backend_ctx.token().cancelled().await;
        assert!(!ctx.is_done());
        drop(sink);
    }

    #[tokio::test]
    async fn test_stream_ends_after_terminal_event() {
        let source = feed(&[], None).await;
        let mut stream = start(source, CallContext::new(), HookChain::new());
        assert!(matches!(stream.next().await, Some(StreamEvent::Done)));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
