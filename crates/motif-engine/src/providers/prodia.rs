use motif_contracts::DataUri;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{GatewayConfig, RateLimitPolicy};
use crate::error::GatewayError;
use crate::gateway::UpscaleFactor;
use crate::http::{image_error, parse_retry_after, rate_limit_delay, read_image, truncate_text};

const JOB_IMAGE_MIME: &str = "image/jpeg";

/// Prodia v2 job endpoint: text-to-image, image edit and upscale.
#[derive(Debug, Clone)]
pub struct ProdiaClient {
    http: HttpClient,
    api_base: String,
    api_key: Option<String>,
    generate_job: String,
    edit_job: String,
    upscale_job: String,
    rate_limit: RateLimitPolicy,
}

impl ProdiaClient {
    pub fn new(http: HttpClient, config: &GatewayConfig) -> Self {
        Self {
            http,
            api_base: config.prodia_api_base.clone(),
            api_key: config.prodia_api_key.clone(),
            generate_job: config.generate_job.clone(),
            edit_job: config.edit_job.clone(),
            upscale_job: config.upscale_job.clone(),
            rate_limit: config.rate_limit,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub(crate) fn api_key(&self) -> Result<&str, GatewayError> {
        self.api_key
            .as_deref()
            .ok_or(GatewayError::Configuration("PRODIA_API_KEY"))
    }

    fn job_endpoint(&self) -> String {
        format!("{}/job", self.api_base)
    }

    pub async fn generate(&self, prompt: &str) -> Result<DataUri, GatewayError> {
        let api_key = self.api_key()?;
        let endpoint = self.job_endpoint();
        let job = json!({
            "type": self.generate_job,
            "config": {"prompt": prompt},
        });
        debug!(job_type = %self.generate_job, "submitting prodia generate job");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, JOB_IMAGE_MIME)
            .json(&job)
            .send()
            .await
            .map_err(|err| GatewayError::transport(format!("Prodia request failed ({endpoint})"), err))?;
        if !response.status().is_success() {
            return Err(image_error("Prodia API error", response).await);
        }
        read_image("Prodia", response, JOB_IMAGE_MIME).await
    }

    /// Image edit. Rate-limited answers are retried up to
    /// `rate_limit.max_retries` times before giving up.
    pub async fn edit(&self, image: &DataUri, instruction: &str) -> Result<DataUri, GatewayError> {
        let api_key = self.api_key()?;
        let endpoint = self.job_endpoint();
        let job = json!({
            "type": self.edit_job,
            "config": {"prompt": instruction},
        });
        let policy = self.rate_limit;
        let mut attempt = 0u32;
        loop {
            let response = self
                .http
                .post(&endpoint)
                .bearer_auth(api_key)
                .header(ACCEPT, JOB_IMAGE_MIME)
                .multipart(job_form(&job, image)?)
                .send()
                .await
                .map_err(|err| {
                    GatewayError::transport(format!("Prodia img2img request failed ({endpoint})"), err)
                })?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt < policy.max_retries {
                    let delay = rate_limit_delay(parse_retry_after(response.headers()), attempt, &policy);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "prodia img2img rate limited; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::upstream_with_details(
                    Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
                    format!(
                        "Prodia img2img rate limit exhausted after {} retries (429)",
                        policy.max_retries
                    ),
                    truncate_text(&body, 512),
                ));
            }

            if !response.status().is_success() {
                return Err(image_error("Prodia img2img error", response).await);
            }
            return read_image("Prodia img2img", response, JOB_IMAGE_MIME).await;
        }
    }

    pub async fn upscale(
        &self,
        image: &DataUri,
        factor: UpscaleFactor,
    ) -> Result<DataUri, GatewayError> {
        let api_key = self.api_key()?;
        let endpoint = self.job_endpoint();
        let job = json!({
            "type": self.upscale_job,
            "config": {"upscale": factor.get()},
        });
        debug!(factor = factor.get(), "submitting prodia upscale job");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, JOB_IMAGE_MIME)
            .multipart(job_form(&job, image)?)
            .send()
            .await
            .map_err(|err| {
                GatewayError::transport(format!("Prodia upscale request failed ({endpoint})"), err)
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream_with_details(
                Some(status.as_u16()),
                "Prodia upscale API error",
                truncate_text(&body, 512),
            ));
        }
        read_image("Prodia upscale", response, JOB_IMAGE_MIME).await
    }
}

/// Multipart body with a `job` JSON part and an `input` image part.
fn job_form(job: &Value, image: &DataUri) -> Result<Form, GatewayError> {
    let job_part = Part::bytes(job.to_string().into_bytes())
        .file_name("job.json")
        .mime_str("application/json")
        .map_err(|err| GatewayError::validation(format!("Invalid job payload: {err}")))?;
    let input_mime = if image.mime_type().starts_with("image/") {
        image.mime_type()
    } else {
        JOB_IMAGE_MIME
    };
    let input_part = Part::bytes(image.bytes().to_vec())
        .file_name(format!("input.{}", image.extension()))
        .mime_str(input_mime)
        .map_err(|_| GatewayError::validation(format!("Invalid image data: unsupported type {input_mime}")))?;
    Ok(Form::new().part("job", job_part).part("input", input_part))
}
