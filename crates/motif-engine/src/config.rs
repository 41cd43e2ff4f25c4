use std::env;
use std::time::Duration;

pub const PRODIA_API_BASE: &str = "https://inference.prodia.com/v2";
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

pub const PRODIA_GENERATE_JOB: &str = "inference.flux-fast.schnell.txt2img.v2";
pub const PRODIA_EDIT_JOB: &str = "inference.qwen.image-edit.plus.lightning.img2img.v2";
pub const PRODIA_UPSCALE_JOB: &str = "inference.upscale.v1";
pub const REPLICATE_ESRGAN_VERSION: &str =
    "42fed1c4974146d4d2414e2be2c5277c7fcf05fcc3a73abf41610695738c1d7b";
pub const GROQ_REWRITE_MODEL: &str = "llama-3.3-70b-versatile";

/// Retry policy for rate-limited edit calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Base of the exponential fallback when no `Retry-After` is given.
    pub fallback_base: Duration,
    /// Upper bound applied to any single wait.
    pub max_delay: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fallback_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Polling policy for asynchronous upscale jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Process-wide gateway configuration: credentials, endpoints and policies.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub prodia_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub groq_api_key: Option<String>,
    pub prodia_api_base: String,
    pub replicate_api_base: String,
    pub groq_api_base: String,
    pub generate_job: String,
    pub edit_job: String,
    pub upscale_job: String,
    pub replicate_version: String,
    pub rewrite_model: String,
    pub brand_blacklist: bool,
    pub request_timeout: Duration,
    pub rate_limit: RateLimitPolicy,
    pub poll: PollPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            prodia_api_key: None,
            replicate_api_token: None,
            groq_api_key: None,
            prodia_api_base: PRODIA_API_BASE.to_string(),
            replicate_api_base: REPLICATE_API_BASE.to_string(),
            groq_api_base: GROQ_API_BASE.to_string(),
            generate_job: PRODIA_GENERATE_JOB.to_string(),
            edit_job: PRODIA_EDIT_JOB.to_string(),
            upscale_job: PRODIA_UPSCALE_JOB.to_string(),
            replicate_version: REPLICATE_ESRGAN_VERSION.to_string(),
            rewrite_model: GROQ_REWRITE_MODEL.to_string(),
            brand_blacklist: true,
            request_timeout: Duration::from_secs(90),
            rate_limit: RateLimitPolicy::default(),
            poll: PollPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prodia_api_key: non_empty_env("PRODIA_API_KEY"),
            replicate_api_token: non_empty_env("REPLICATE_API_TOKEN")
                .or_else(|| non_empty_env("REPLICATE_API_KEY")),
            groq_api_key: non_empty_env("GROQ_API_KEY"),
            prodia_api_base: api_base_from_env("PRODIA_API_BASE", PRODIA_API_BASE),
            replicate_api_base: api_base_from_env("REPLICATE_API_BASE", REPLICATE_API_BASE),
            groq_api_base: api_base_from_env("GROQ_API_BASE", GROQ_API_BASE),
            brand_blacklist: non_empty_env("MOTIF_BRAND_BLACKLIST")
                .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
                .unwrap_or(defaults.brand_blacklist),
            request_timeout: seconds_from_env("MOTIF_REQUEST_TIMEOUT", 90.0, 5.0, 300.0),
            poll: PollPolicy {
                interval: seconds_from_env("MOTIF_POLL_INTERVAL", 1.0, 0.01, 5.0),
                timeout: seconds_from_env("MOTIF_POLL_TIMEOUT", 120.0, 1.0, 600.0),
            },
            ..defaults
        }
    }

    /// Names of the credentials that are not configured.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.prodia_api_key.is_none() {
            missing.push("PRODIA_API_KEY");
        }
        if self.replicate_api_token.is_none() {
            missing.push("REPLICATE_API_TOKEN");
        }
        if self.groq_api_key.is_none() {
            missing.push("GROQ_API_KEY");
        }
        missing
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn api_base_from_env(key: &str, default: &str) -> String {
    normalize_api_base(non_empty_env(key).as_deref()).unwrap_or_else(|| default.to_string())
}

fn normalize_api_base(raw: Option<&str>) -> Option<String> {
    raw.map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

fn seconds_from_env(key: &str, default: f64, min: f64, max: f64) -> Duration {
    Duration::from_secs_f64(parse_seconds(non_empty_env(key).as_deref(), default, min, max))
}

fn parse_seconds(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_provider_contracts() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.max_retries, 3);
        assert_eq!(config.rate_limit.fallback_base, Duration::from_secs(1));
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.timeout, Duration::from_secs(120));
        assert!(config.brand_blacklist);
        assert_eq!(
            config.missing_credentials(),
            vec!["PRODIA_API_KEY", "REPLICATE_API_TOKEN", "GROQ_API_KEY"]
        );
    }

    #[test]
    fn seconds_parse_with_defaults_and_clamps() {
        assert_eq!(parse_seconds(None, 1.0, 0.01, 5.0), 1.0);
        assert_eq!(parse_seconds(Some("abc"), 1.0, 0.01, 5.0), 1.0);
        assert_eq!(parse_seconds(Some("0.5"), 1.0, 0.01, 5.0), 0.5);
        assert_eq!(parse_seconds(Some("900"), 120.0, 1.0, 600.0), 600.0);
        assert_eq!(parse_seconds(Some("NaN"), 90.0, 5.0, 300.0), 90.0);
    }

    #[test]
    fn api_base_drops_trailing_slashes() {
        assert_eq!(
            normalize_api_base(Some(" https://example.test/v1/ ")),
            Some("https://example.test/v1".to_string())
        );
        assert_eq!(normalize_api_base(Some("  ")), None);
    }
}
