// Hook trait: interceptors around the backend call.

use crate::backend::BoxFuture;
use crate::context::CallContext;
use crate::error::Error;

/// Intercepts the outbound prompt and the inbound response.
///
/// Both methods default to passing their input through unchanged. Hooks may be called
/// many times and from concurrent calls.
pub trait Hook: Send + Sync {
    /// Transform the prompt before it is sent. An error aborts the call.
    fn before_request<'a>(
        &'a self,
        _ctx: &'a CallContext,
        prompt: String,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move { Ok(prompt) })
    }

    /// Transform the raw response, or a single token when streaming. An error aborts the call.
    fn after_response<'a>(
        &'a self,
        _ctx: &'a CallContext,
        response: String,
        _error: Option<&'a Error>,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move { Ok(response) })
    }
}
