//! Request and response bodies of the gateway's HTTP surface.
//!
//! Fields are optional on the request side so that a missing field turns into
//! a specific validation message instead of a generic decode failure.

use serde::{Deserialize, Serialize};

pub const DEFAULT_UPSCALE_FACTOR: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateRequest {
    #[serde(default, alias = "imageDataUri")]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpscaleRequest {
    #[serde(default, alias = "imageDataUri")]
    pub image_data_url: Option<String>,
    #[serde(default = "default_upscale_factor", alias = "factor")]
    pub upscale_factor: u32,
    #[serde(default)]
    pub provider: Option<String>,
}

impl Default for UpscaleRequest {
    fn default() -> Self {
        Self {
            image_data_url: None,
            upscale_factor: DEFAULT_UPSCALE_FACTOR,
            provider: None,
        }
    }
}

fn default_upscale_factor() -> u32 {
    DEFAULT_UPSCALE_FACTOR
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanitizeRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredResponse {
    pub filtered: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
