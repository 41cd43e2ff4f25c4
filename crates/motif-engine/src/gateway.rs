use std::fmt;
use std::future::Future;

use anyhow::Context;
use motif_contracts::providers::{NamedProvider, ProviderRegistry};
use motif_contracts::DataUri;
use reqwest::Client as HttpClient;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::providers::{ProdiaClient, ReplicateClient, RewriteClient};
use crate::sanitizer::{BrandBlacklist, PromptSanitizer};

/// Allowed upscale multipliers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpscaleFactor {
    #[default]
    X2,
    X4,
    X8,
}

impl UpscaleFactor {
    pub fn get(self) -> u32 {
        match self {
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

impl TryFrom<u32> for UpscaleFactor {
    type Error = GatewayError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::X2),
            4 => Ok(Self::X4),
            8 => Ok(Self::X8),
            _ => Err(GatewayError::validation(
                "Invalid upscale factor. Must be 2, 4, or 8",
            )),
        }
    }
}

impl fmt::Display for UpscaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.get())
    }
}

/// Upscaling backends. Prodia answers synchronously, Replicate is
/// submit-then-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleBackend {
    Prodia,
    Replicate,
}

impl UpscaleBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prodia => "prodia",
            Self::Replicate => "replicate",
        }
    }
}

impl NamedProvider for UpscaleBackend {
    fn name(&self) -> &str {
        self.as_str()
    }
}

/// The three image operations a session drives.
pub trait ImageService: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<DataUri, GatewayError>> + Send;

    fn iterate(
        &self,
        image: &DataUri,
        instruction: &str,
    ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send;

    fn upscale(
        &self,
        image: &DataUri,
        factor: UpscaleFactor,
        backend: UpscaleBackend,
    ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send;
}

/// Single point of contact for every remote collaborator.
#[derive(Debug, Clone)]
pub struct InferenceGateway {
    config: GatewayConfig,
    prodia: ProdiaClient,
    replicate: ReplicateClient,
    sanitizer: PromptSanitizer,
    blacklist: Option<BrandBlacklist>,
    upscalers: ProviderRegistry<UpscaleBackend>,
}

impl InferenceGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let missing = config.missing_credentials();
        if !missing.is_empty() {
            info!(missing = ?missing, "gateway started without some credentials");
        }
        Ok(Self {
            prodia: ProdiaClient::new(http.clone(), &config),
            replicate: ReplicateClient::new(http.clone(), &config),
            sanitizer: PromptSanitizer::new(RewriteClient::new(http, &config)),
            blacklist: config.brand_blacklist.then_some(BrandBlacklist),
            upscalers: ProviderRegistry::new(vec![UpscaleBackend::Prodia, UpscaleBackend::Replicate]),
            config,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn upscalers(&self) -> &ProviderRegistry<UpscaleBackend> {
        &self.upscalers
    }

    pub fn resolve_upscaler(&self, name: Option<&str>) -> Result<UpscaleBackend, GatewayError> {
        self.upscalers
            .resolve(name)
            .copied()
            .map_err(GatewayError::Validation)
    }

    pub async fn sanitize(&self, text: &str) -> String {
        self.sanitizer.sanitize(text).await
    }

    /// Text-to-image. The prompt is sanitized and brand-stripped first.
    pub async fn generate(&self, prompt: &str) -> Result<DataUri, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::validation("Missing prompt"));
        }
        self.prodia.api_key()?;
        let sanitized = self.sanitizer.sanitize(prompt).await;
        let model_prompt = match &self.blacklist {
            Some(blacklist) => blacklist.strip(&sanitized),
            None => sanitized,
        };
        info!(prompt = %model_prompt, "generate");
        self.prodia.generate(&model_prompt).await
    }

    /// Edits `image` according to `instruction`.
    pub async fn iterate(&self, image: &DataUri, instruction: &str) -> Result<DataUri, GatewayError> {
        if image.is_empty() {
            return Err(GatewayError::validation("Missing image data"));
        }
        if instruction.trim().is_empty() {
            return Err(GatewayError::validation("Missing prompt"));
        }
        self.prodia.api_key()?;
        let sanitized = self.sanitizer.sanitize(instruction).await;
        info!(instruction = %sanitized, bytes = image.len(), "iterate");
        self.prodia.edit(image, &sanitized).await
    }

    pub async fn upscale(
        &self,
        image: &DataUri,
        factor: UpscaleFactor,
        backend: UpscaleBackend,
    ) -> Result<DataUri, GatewayError> {
        if image.is_empty() {
            return Err(GatewayError::validation("Missing image data"));
        }
        info!(backend = backend.as_str(), %factor, bytes = image.len(), "upscale");
        match backend {
            UpscaleBackend::Prodia => self.prodia.upscale(image, factor).await,
            UpscaleBackend::Replicate => self.replicate.upscale(image, factor).await,
        }
    }
}

impl ImageService for InferenceGateway {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
        InferenceGateway::generate(self, prompt)
    }

    fn iterate(
        &self,
        image: &DataUri,
        instruction: &str,
    ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
        InferenceGateway::iterate(self, image, instruction)
    }

    fn upscale(
        &self,
        image: &DataUri,
        factor: UpscaleFactor,
        backend: UpscaleBackend,
    ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
        InferenceGateway::upscale(self, image, factor, backend)
    }
}
