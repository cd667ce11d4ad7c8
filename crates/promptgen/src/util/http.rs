// HTTP helpers shared by backend adapters.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;

/// Strip trailing slashes and a trailing `/v1` so callers may pass either form.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .to_string()
}

/// Parse `Retry-After` as numeric seconds or an HTTP-date.
/// Returns `None` when missing, malformed, negative, or already in the past.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(secs) = value.trim().parse::<f64>() {
        return (secs >= 0.0 && secs.is_finite()).then(|| Duration::from_secs_f64(secs));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(std::time::SystemTime::now()).ok()
}

/// Pull `error.message` out of an error body, falling back to the whole body.
pub fn error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.openai.com"), "https://api.openai.com");
        assert_eq!(normalize_base_url("https://api.openai.com/"), "https://api.openai.com");
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(normalize_base_url("http://localhost:11434/v1"), "http://localhost:11434");
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_retry_after_negative_or_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert("retry-after", "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_retry_after_http_date_in_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(120);
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", httpdate::fmt_http_date(future).parse().unwrap());
        let parsed = parse_retry_after(&headers).unwrap();
        assert!(parsed <= Duration::from_secs(120));
        assert!(parsed >= Duration::from_secs(100));
    }

    #[test]
    fn test_retry_after_missing() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = json!({"error": {"message": "Rate limited", "code": "rate_limit"}});
        assert_eq!(error_message(&body), "Rate limited");
        let body = json!({"detail": "odd shape"});
        assert_eq!(error_message(&body), r#"{"detail":"odd shape"}"#);
    }
}
