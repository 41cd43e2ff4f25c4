use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::response_json_or_error;

/// Text-rewriting collaborator (OpenAI-compatible chat completions on Groq).
#[derive(Debug, Clone)]
pub struct RewriteClient {
    http: HttpClient,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl RewriteClient {
    pub fn new(http: HttpClient, config: &GatewayConfig) -> Self {
        Self {
            http,
            api_base: config.groq_api_base.clone(),
            api_key: config.groq_api_key.clone(),
            model: config.rewrite_model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Raw rewriter output, before any cleanup.
    pub async fn rewrite(&self, text: &str) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::Configuration("GROQ_API_KEY"))?;
        let endpoint = self.completions_endpoint();
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": rewrite_instruction(text),
                }
            ],
            "temperature": 0.3,
            "max_tokens": 500,
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GatewayError::transport(format!("Groq request failed ({endpoint})"), err))?;
        let body = response_json_or_error("Groq API", response).await?;
        extract_message_content(&body)
            .ok_or_else(|| GatewayError::upstream(None, "Groq response missing message content"))
    }
}

fn extract_message_content(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

/// Instruction sent to the rewriter for one prompt.
pub fn rewrite_instruction(text: &str) -> String {
    format!(
        "1. Remove words related to text/logos: text, logo, brand, lettering, typography, words, numbers, letters, font, label, sign
2. Replace brand/character names with \"abstract [description]\": BMW→abstract luxury car, Star Wars→abstract space saga
3. Replace famous artist names with their art style: Jackson Pollock→abstract expressionist, Picasso→cubist abstract, Van Gogh→post-impressionist
4. Keep fashion/art style terms unchanged: grunge, academia, chic, vintage, impressionist, abstract

TO replace:
- \"with text\" → \"\" (removed)
- \"BMW logo\" → \"abstract luxury car\"
- \"Star Wars\" → \"abstract space saga\"
- \"Jackson Pollock\" → \"abstract expressionist\"
- \"Andy Warhol style\" → \"pop art style\"

NOT to replace:
- \"dark academia\" → \"dark academia\"
- \"grunge style\" → \"grunge style\"
- \"impressionist\" → \"impressionist\"
- \"abstract expressionist\" → \"abstract expressionist\"

Text: {text}
Filtered:"
    )
}
