// Error taxonomy: one error type for the whole pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel kind used to classify an [`Error`] independent of how it was wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No backend could be resolved for the call.
    NoProvider,
    /// Default configuration could not be resolved (e.g. missing credential).
    Configuration,
    /// The prompt template failed to compile or render.
    Template,
    /// The backend reply could not be extracted or decoded into the output shape.
    InvalidResponse,
    /// The decoded value broke one or more schema/format rules.
    Validation,
    /// The call's deadline expired.
    Timeout,
    /// The caller cancelled the call.
    Canceled,
    /// The backend signalled rate limiting.
    RateLimit,
    /// The backend rejected the prompt as too long.
    ContextLength,
    /// A hook rejected the prompt or the response.
    Hook,
    /// Unclassified backend failure, passed through as-is.
    Backend,
    /// Transport failure talking to the backend.
    Network,
    /// Failure while reading a backend stream.
    Stream,
}

impl ErrorKind {
    /// Short machine tag used as the default `code` for errors of this kind.
    pub fn default_code(&self) -> &'static str {
        match self {
            Self::NoProvider => "no_provider",
            Self::Configuration => "config_error",
            Self::Template => "template_error",
            Self::InvalidResponse => "invalid_format",
            Self::Validation => "validation_failed",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::RateLimit => "rate_limit",
            Self::ContextLength => "context_length",
            Self::Hook => "hook_error",
            Self::Backend => "backend_error",
            Self::Network => "network_error",
            Self::Stream => "stream_error",
        }
    }
}

/// The single error type for the library.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    /// Short machine tag, e.g. `validation_failed`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional key-value bag with extra context.
    pub details: Option<Map<String, Value>>,
    /// Informational only; nothing in this crate retries.
    pub retryable: bool,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an error of `kind` with the kind's default code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code().to_string(),
            message: message.into(),
            details: None,
            retryable: false,
            source: None,
        }
    }

    /// Replace the machine tag.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Attach a cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add one entry to the details bag.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn no_provider() -> Self {
        Self::new(ErrorKind::NoProvider, "no provider configured")
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Template, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "deadline exceeded")
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "operation canceled")
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(ErrorKind::RateLimit, message)
        }
    }

    pub fn context_length(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContextLength, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    /// Wrap a hook failure. The hook's own error stays reachable through `source()`.
    pub fn hook(cause: Error) -> Self {
        Self::new(ErrorKind::Hook, format!("hook error: {cause}")).with_source(cause)
    }

    pub fn network(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            retryable: true,
            ..Self::new(ErrorKind::Network, message)
        }
        .with_source(source)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stream, message)
    }

    /// Map an HTTP status from a backend into a kind, then refine it from the message body.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let (kind, retryable) = match status {
            401 | 403 => (ErrorKind::Configuration, false),
            408 => (ErrorKind::Timeout, true),
            413 => (ErrorKind::ContextLength, false),
            429 => (ErrorKind::RateLimit, true),
            500..=599 => (ErrorKind::Backend, true),
            _ => (ErrorKind::Backend, false),
        };
        let kind = classify_by_message(&message, kind);
        Self {
            retryable: retryable && kind != ErrorKind::ContextLength,
            ..Self::new(kind, message)
        }
        .with_detail("status", status)
    }

    pub fn is_no_provider(&self) -> bool {
        is_no_provider(self)
    }

    pub fn is_configuration(&self) -> bool {
        is_configuration(self)
    }

    pub fn is_invalid_response(&self) -> bool {
        is_invalid_response(self)
    }

    pub fn is_validation(&self) -> bool {
        is_validation(self)
    }

    pub fn is_timeout(&self) -> bool {
        is_timeout(self)
    }

    pub fn is_canceled(&self) -> bool {
        is_canceled(self)
    }

    pub fn is_rate_limit(&self) -> bool {
        is_rate_limit(self)
    }

    pub fn is_context_length(&self) -> bool {
        is_context_length(self)
    }

    pub fn is_hook(&self) -> bool {
        is_hook(self)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Walk the `source()` chain and report whether any layer is an [`Error`] of `kind`.
pub fn find_kind(err: &(dyn std::error::Error + 'static), kind: ErrorKind) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(ours) = e.downcast_ref::<Error>() {
            if ours.kind == kind {
                return true;
            }
        }
        current = e.source();
    }
    false
}

pub fn is_no_provider(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::NoProvider)
}

pub fn is_configuration(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::Configuration)
}

pub fn is_invalid_response(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::InvalidResponse)
}

pub fn is_validation(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::Validation)
}

pub fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::Timeout)
}

pub fn is_canceled(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::Canceled)
}

pub fn is_rate_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::RateLimit)
}

pub fn is_context_length(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::ContextLength)
}

pub fn is_hook(err: &(dyn std::error::Error + 'static)) -> bool {
    find_kind(err, ErrorKind::Hook)
}

/// Reclassify a failed backend call so callers can branch without knowing the backend.
///
/// Already-specific kinds are returned untouched. Generic backend or transport errors
/// whose message names a rate limit or a context-length overflow are re-tagged, keeping
/// the original error as the cause.
pub fn classify_backend_error(err: Error) -> Error {
    if !matches!(err.kind, ErrorKind::Backend | ErrorKind::Network) {
        return err;
    }
    match classify_by_message(&err.message, err.kind) {
        ErrorKind::RateLimit => Error::rate_limit(format!("rate limit exceeded: {}", err.message))
            .with_source(err),
        ErrorKind::ContextLength => {
            Error::context_length(format!("context length exceeded: {}", err.message))
                .with_source(err)
        }
        _ => err,
    }
}

fn classify_by_message(message: &str, default: ErrorKind) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorKind::RateLimit
    } else if lower.contains("context length")
        || lower.contains("context window")
        || lower.contains("maximum context")
        || lower.contains("too many tokens")
    {
        ErrorKind::ContextLength
    } else {
        default
    }
}
