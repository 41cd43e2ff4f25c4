use std::time::Duration;

use motif_contracts::DataUri;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Response;
use serde_json::Value;

use crate::config::RateLimitPolicy;
use crate::error::GatewayError;

const ERROR_BODY_MAX_CHARS: usize = 200;

pub(crate) async fn response_json_or_error(
    label: &str,
    response: Response,
) -> Result<Value, GatewayError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| GatewayError::transport(format!("{label} response body read failed"), err))?;
    if !status.is_success() {
        return Err(GatewayError::upstream_with_details(
            Some(code),
            format!("{label} error ({code})"),
            truncate_text(&body, 512),
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        GatewayError::upstream_with_details(
            Some(code),
            format!("{label} returned invalid JSON payload"),
            err.to_string(),
        )
    })
}

/// Turns a non-2xx image response into an upstream error whose message carries
/// the provider's `error` and `message` fields, or the head of a non-JSON body.
pub(crate) async fn image_error(label: &str, response: Response) -> GatewayError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GatewayError::upstream(Some(code), upstream_error_message(label, code, &body))
}

pub(crate) fn upstream_error_message(label: &str, code: u16, body: &str) -> String {
    let mut message = format!("{label} ({code})");
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => {
            for key in ["error", "message"] {
                if let Some(text) = fields.get(key).and_then(value_text) {
                    message.push_str(": ");
                    message.push_str(&text);
                }
            }
        }
        Ok(_) => {}
        Err(_) => {
            if !body.is_empty() {
                message.push_str(": ");
                message.push_str(&head_chars(body, ERROR_BODY_MAX_CHARS));
            }
        }
    }
    message
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads an image body into a data URI. Non-image content types fall back to
/// `default_mime`.
pub(crate) async fn read_image(
    label: &str,
    response: Response,
    default_mime: &str,
) -> Result<DataUri, GatewayError> {
    let mime = image_mime(content_type(response.headers()).as_deref(), default_mime);
    let bytes = response
        .bytes()
        .await
        .map_err(|err| GatewayError::transport(format!("failed reading {label} image bytes"), err))?;
    if bytes.is_empty() {
        return Err(GatewayError::upstream(None, format!("{label} returned an empty image")));
    }
    Ok(DataUri::new(mime, bytes.to_vec()))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn image_mime(content_type: Option<&str>, default_mime: &str) -> String {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| value.starts_with("image/"))
        .unwrap_or_else(|| default_mime.to_string())
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let seconds = raw.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
}

/// Wait before retry number `attempt + 1`: the provider's hint when present,
/// otherwise `fallback_base * 2^attempt` (1s, 2s, 4s by default).
pub(crate) fn rate_limit_delay(
    retry_after: Option<Duration>,
    attempt: u32,
    policy: &RateLimitPolicy,
) -> Duration {
    retry_after
        .unwrap_or_else(|| policy.fallback_base * 2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn head_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::*;

    #[test]
    fn error_message_appends_json_error_and_message() {
        let body = r#"{"error":"bad job","message":"prompt too long"}"#;
        assert_eq!(
            upstream_error_message("Prodia API error", 400, body),
            "Prodia API error (400): bad job: prompt too long"
        );
        assert_eq!(
            upstream_error_message("Prodia API error", 500, r#"{"detail":"x"}"#),
            "Prodia API error (500)"
        );
    }

    #[test]
    fn error_message_keeps_head_of_plain_text_body() {
        let body = "x".repeat(300);
        let message = upstream_error_message("Prodia img2img error", 502, &body);
        assert_eq!(message.len(), "Prodia img2img error (502): ".len() + 200);
        assert_eq!(
            upstream_error_message("Prodia img2img error", 502, ""),
            "Prodia img2img error (502)"
        );
    }

    #[test]
    fn retry_after_accepts_delta_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn oversized_retry_after_is_capped_by_policy() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e30"));
        let hint = parse_retry_after(&headers);
        assert_eq!(hint, Some(Duration::MAX));
        let policy = RateLimitPolicy::default();
        assert_eq!(rate_limit_delay(hint, 0, &policy), Duration::from_secs(60));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("1000000000000000000000000"),
        );
        assert_eq!(
            rate_limit_delay(parse_retry_after(&headers), 1, &policy),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn rate_limit_delay_prefers_hint_then_doubles() {
        let policy = RateLimitPolicy::default();
        assert_eq!(
            rate_limit_delay(Some(Duration::from_secs(2)), 0, &policy),
            Duration::from_secs(2)
        );
        let fallback: Vec<Duration> = (0..3)
            .map(|attempt| rate_limit_delay(None, attempt, &policy))
            .collect();
        assert_eq!(
            fallback,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert_eq!(
            rate_limit_delay(Some(Duration::from_secs(600)), 0, &policy),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn image_mime_ignores_non_image_content_types() {
        assert_eq!(image_mime(Some("image/PNG; q=1"), "image/jpeg"), "image/png");
        assert_eq!(image_mime(Some("application/json"), "image/jpeg"), "image/jpeg");
        assert_eq!(image_mime(None, "image/png"), "image/png");
    }
}
