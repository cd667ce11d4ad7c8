// OpenAI Chat Completions backend.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use promptgen_types::{
    Backend, BackendSink, BackendStream, BoxFuture, CallContext, Error, ModelSettings,
    OpenAiConfig,
};

use crate::util::http::{error_message, normalize_base_url, parse_retry_after};
use crate::util::sse::SseParser;

/// Buffered tokens between the HTTP reader task and the stream consumer.
const STREAM_BUFFER: usize = 32;

/// Backend for `/v1/chat/completions` on OpenAI or any compatible server.
///
/// Each prompt is sent as a single user message with the configured model, temperature
/// and token limit.
pub struct OpenAiBackend {
    api_key: SecretString,
    base_url: String,
    settings: ModelSettings,
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout_secs("connect", config.timeout.connect)?)
            .timeout(timeout_secs("request", config.timeout.request)?)
            .build()
            .map_err(|e| {
                Error::configuration(format!("failed to build HTTP client: {e}")).with_source(e)
            })?;
        Ok(Self {
            api_key: config.api_key,
            base_url: normalize_base_url(&config.base_url),
            settings: config.settings,
            http_client,
        })
    }

    /// Build from `OPENAI_API_KEY` and friends; see [`OpenAiConfig::from_env`].
    pub fn from_env() -> Result<Self, Error> {
        Self::new(OpenAiConfig::from_env()?)
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
            .map_err(|_| {
                Error::configuration("invalid API key: contains non-ASCII or control characters")
            })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// POST the prompt and return the response once its status is known to be a success.
    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, Error> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .headers(self.headers()?)
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            let headers = response.headers().clone();
            let body: Value = response
                .json()
                .await
                .unwrap_or_else(|_| json!({"error": {"message": "failed to parse error response"}}));
            return Err(parse_error(status, &headers, &body));
        }
        Ok(response)
    }

    async fn do_complete(&self, prompt: &str) -> Result<String, Error> {
        let response = self.send(prompt, false).await?;
        let body: Value = response.json().await.map_err(|e| {
            Error::backend(format!("failed to parse response: {e}")).with_source(e)
        })?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::backend("response has no message content"))
    }
}

impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                err = ctx.done() => Err(err),
                result = self.do_complete(prompt) => result,
            }
        })
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<BackendStream, Error>> {
        Box::pin(async move {
            let response = tokio::select! {
                biased;
                err = ctx.done() => Err(err),
                result = self.send(prompt, true) => result,
            }?;
            let (stream, sink) = BackendStream::channel(STREAM_BUFFER);
            tokio::spawn(pump_sse(response, sink, ctx.clone()));
            Ok(stream)
        })
    }
}

/// Forward `choices[0].delta.content` from an SSE body into `sink` until `[DONE]`, EOF,
/// an error, or the context ends.
async fn pump_sse(response: reqwest::Response, sink: BackendSink, ctx: CallContext) {
    let mut parser = SseParser::new();
    let mut bytes = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = ctx.done() => return,
            chunk = bytes.next() => chunk,
        };
        let chunk = match chunk {
            None => return,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                sink.fail(Error::stream(format!("stream read error: {e}")).with_source(e))
                    .await;
                return;
            }
        };

        for event in parser.feed(&chunk) {
            let data = event.data.trim();
            if data == "[DONE]" {
                return;
            }
            let value: Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable SSE data");
                    continue;
                }
            };
            if value.get("error").is_some() {
                sink.fail(Error::stream(error_message(&value))).await;
                return;
            }
            let token = value
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !token.is_empty() && !sink.send(token).await {
                return;
            }
        }
    }
}

/// A positive, representable timeout. Zero, negative, NaN and overflowing values are rejected.
fn timeout_secs(which: &str, secs: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            Error::configuration(format!("invalid {which} timeout: {secs} seconds"))
                .with_detail("timeout", which)
        })
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout().with_source(e)
    } else {
        Error::network(format!("HTTP request failed: {e}"), e)
    }
}

/// Map an error response to a classified [`Error`].
pub(crate) fn parse_error(status: u16, headers: &HeaderMap, body: &Value) -> Error {
    let mut err = Error::from_http_status(status, error_message(body)).with_detail("provider", "openai");
    if let Some(code) = body.pointer("/error/code").and_then(Value::as_str) {
        err = err.with_detail("provider_code", code);
    }
    if let Some(retry_after) = parse_retry_after(headers) {
        err = err.with_detail("retry_after_secs", retry_after.as_secs_f64());
    }
    err
}
