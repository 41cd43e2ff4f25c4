use motif_contracts::DataUri;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{GatewayConfig, PollPolicy};
use crate::error::GatewayError;
use crate::gateway::UpscaleFactor;
use crate::http::{read_image, response_json_or_error, truncate_text};

const OUTPUT_MIME: &str = "image/png";

/// Replicate predictions API driving the Real-ESRGAN upscaler.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    http: HttpClient,
    api_base: String,
    api_token: Option<String>,
    version: String,
    poll: PollPolicy,
}

impl ReplicateClient {
    pub fn new(http: HttpClient, config: &GatewayConfig) -> Self {
        Self {
            http,
            api_base: config.replicate_api_base.clone(),
            api_token: config.replicate_api_token.clone(),
            version: config.replicate_version.clone(),
            poll: config.poll,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    pub(crate) fn api_token(&self) -> Result<&str, GatewayError> {
        self.api_token
            .as_deref()
            .ok_or(GatewayError::Configuration("REPLICATE_API_TOKEN"))
    }

    /// Submits a prediction, polls it to a terminal state and downloads the
    /// first output image.
    pub async fn upscale(
        &self,
        image: &DataUri,
        factor: UpscaleFactor,
    ) -> Result<DataUri, GatewayError> {
        let api_token = self.api_token()?;
        let endpoint = format!("{}/predictions", self.api_base);
        let payload = json!({
            "version": self.version,
            "input": {
                "image": image.to_string(),
                "scale": factor.get(),
                "face_enhance": false,
            },
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GatewayError::transport(format!("Replicate request failed ({endpoint})"), err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream_with_details(
                Some(status.as_u16()),
                "Replicate API error",
                truncate_text(&body, 512),
            ));
        }
        let created = response_json_or_error("Replicate API", response).await?;
        let prediction_id = created
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default();
        debug!(prediction_id, "replicate prediction created");

        let finished = self.poll_prediction(created, api_token).await?;
        let output_url = extract_output_url(&finished).ok_or_else(|| {
            GatewayError::upstream(None, "Replicate prediction succeeded without an output image")
        })?;
        let download = self
            .http
            .get(&output_url)
            .send()
            .await
            .map_err(|err| GatewayError::transport("Replicate output download failed", err))?;
        let status = download.status();
        if !status.is_success() {
            return Err(GatewayError::upstream(
                Some(status.as_u16()),
                format!("Replicate output download failed ({})", status.as_u16()),
            ));
        }
        read_image("Replicate", download, OUTPUT_MIME).await
    }

    async fn poll_prediction(
        &self,
        mut prediction: Value,
        api_token: &str,
    ) -> Result<Value, GatewayError> {
        let started = Instant::now();
        loop {
            match prediction_status(&prediction).as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    let details = prediction
                        .get("error")
                        .map(|error| match error {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_default();
                    return Err(GatewayError::upstream_with_details(
                        None,
                        "Replicate prediction failed",
                        details,
                    ));
                }
                _ => {}
            }
            if started.elapsed() >= self.poll.timeout {
                return Err(GatewayError::upstream(
                    None,
                    format!(
                        "Replicate polling timed out after {:.1}s",
                        self.poll.timeout.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(self.poll.interval).await;

            let poll_url = prediction_poll_url(&prediction, &self.api_base).ok_or_else(|| {
                GatewayError::upstream(None, "Replicate prediction response missing id")
            })?;
            let response = self
                .http
                .get(&poll_url)
                .bearer_auth(api_token)
                .send()
                .await
                .map_err(|err| GatewayError::transport("Replicate polling request failed", err))?;
            prediction = response_json_or_error("Replicate polling", response).await?;
        }
    }
}

fn prediction_status(prediction: &Value) -> String {
    prediction
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn prediction_poll_url(prediction: &Value, api_base: &str) -> Option<String> {
    if let Some(url) = prediction
        .get("urls")
        .and_then(|urls| urls.get("get"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        return Some(url.to_string());
    }
    prediction
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| format!("{api_base}/predictions/{id}"))
}

/// First usable output: a single URL, or the first entry of a URL list.
fn extract_output_url(prediction: &Value) -> Option<String> {
    match prediction.get("output")? {
        Value::String(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;
    use crate::test_support::{sample_jpeg, sample_png, spawn_upstream, test_config};

    #[derive(Clone)]
    struct Upstream {
        base: Arc<std::sync::Mutex<String>>,
        polls: Arc<AtomicUsize>,
        ready_after: usize,
        terminal: &'static str,
        output: Bytes,
    }

    fn upstream_app(state: Upstream) -> Router {
        Router::new()
            .route(
                "/v1/predictions",
                post(|Json(body): Json<Value>| async move {
                    if body["input"]["face_enhance"] != json!(false) || body["input"]["scale"] != json!(4) {
                        return Json(json!({"id": "bad", "status": "failed", "error": "bad input"}));
                    }
                    Json(json!({"id": "p-1", "status": "starting"}))
                }),
            )
            .route(
                "/v1/predictions/:id",
                get(|State(state): State<Upstream>, Path(id): Path<String>| async move {
                    let seen = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen < state.ready_after {
                        return Json(json!({"id": id, "status": "processing"}));
                    }
                    let base = state.base.lock().map(|base| base.clone()).unwrap_or_default();
                    Json(json!({
                        "id": id,
                        "status": state.terminal,
                        "output": format!("{base}/files/out.png"),
                        "error": "GPU out of memory",
                    }))
                }),
            )
            .route(
                "/files/out.png",
                get(|State(state): State<Upstream>| async move {
                    ([(header::CONTENT_TYPE, "image/png")], state.output.clone()).into_response()
                }),
            )
            .with_state(state)
    }

    async fn spawn(terminal: &'static str, ready_after: usize) -> (ReplicateClient, Upstream, DataUri) {
        let output = sample_png(16, 16);
        let state = Upstream {
            base: Arc::new(std::sync::Mutex::new(String::new())),
            polls: Arc::new(AtomicUsize::new(0)),
            ready_after,
            terminal,
            output: Bytes::from(output.bytes().to_vec()),
        };
        let base = spawn_upstream(upstream_app(state.clone())).await;
        if let Ok(mut slot) = state.base.lock() {
            *slot = base.clone();
        }
        let client = ReplicateClient::new(HttpClient::new(), &test_config(&base));
        (client, state, output)
    }

    #[tokio::test]
    async fn upscale_polls_until_succeeded_and_downloads_output() -> anyhow::Result<()> {
        let (client, state, output) = spawn("succeeded", 3).await;

        let image = client.upscale(&sample_jpeg(8, 8), UpscaleFactor::X4).await?;
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.bytes(), output.bytes());
        assert_eq!(state.polls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn failed_prediction_reports_provider_error() -> anyhow::Result<()> {
        let (client, _, _) = spawn("failed", 1).await;

        let err = client
            .upscale(&sample_jpeg(8, 8), UpscaleFactor::X4)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
        assert_eq!(err.to_string(), "Replicate prediction failed");
        assert_eq!(err.details().as_deref(), Some("GPU out of memory"));
        Ok(())
    }

    #[tokio::test]
    async fn polling_stops_at_the_timeout() -> anyhow::Result<()> {
        let (_, state, _) = spawn("succeeded", usize::MAX).await;
        let base = state.base.lock().map(|base| base.clone()).unwrap_or_default();
        let mut config = test_config(&base);
        config.poll = PollPolicy {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(60),
        };
        let client = ReplicateClient::new(HttpClient::new(), &config);

        let err = client
            .upscale(&sample_jpeg(8, 8), UpscaleFactor::X4)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
        assert!(err.to_string().starts_with("Replicate polling timed out"));
        Ok(())
    }

    #[test]
    fn output_url_accepts_string_or_list() {
        assert_eq!(
            extract_output_url(&json!({"output": "https://x.test/a.png"})).as_deref(),
            Some("https://x.test/a.png")
        );
        assert_eq!(
            extract_output_url(&json!({"output": ["", "https://x.test/b.png"]})).as_deref(),
            Some("https://x.test/b.png")
        );
        assert_eq!(extract_output_url(&json!({"output": null})), None);
    }

    #[test]
    fn poll_url_prefers_provider_link() {
        let prediction = json!({"id": "abc", "urls": {"get": "https://r.test/p/abc"}});
        assert_eq!(
            prediction_poll_url(&prediction, "https://api.test/v1").as_deref(),
            Some("https://r.test/p/abc")
        );
        assert_eq!(
            prediction_poll_url(&json!({"id": "abc"}), "https://api.test/v1").as_deref(),
            Some("https://api.test/v1/predictions/abc")
        );
        assert_eq!(prediction_poll_url(&json!({}), "https://api.test/v1"), None);
    }

    #[tokio::test]
    async fn missing_token_is_a_configuration_error() {
        let mut config = test_config("http://127.0.0.1:9");
        config.replicate_api_token = None;
        let client = ReplicateClient::new(HttpClient::new(), &config);
        let err = client
            .upscale(&sample_jpeg(4, 4), UpscaleFactor::X2)
            .await
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Server missing REPLICATE_API_TOKEN"));
    }
}
