//! Stateless JSON surface over the [`InferenceGateway`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use motif_contracts::wire::{
    ErrorResponse, FilteredResponse, GenerateRequest, ImageResponse, IterateRequest,
    SanitizeRequest, UpscaleRequest,
};
use motif_contracts::DataUri;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::gateway::{InferenceGateway, UpscaleBackend, UpscaleFactor};

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<InferenceGateway>,
}

impl AppState {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/generate", post(generate))
        .route("/api/iterate", post(iterate))
        .route("/api/upscale", post(upscale))
        .route("/api/upscale-replicate", post(upscale_replicate))
        .route("/api/filter-prompt", post(filter_prompt))
        .route("/api/sanitize", post(filter_prompt))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, gateway: InferenceGateway) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("listening on http://{addr}");
    axum::serve(listener, router(AppState::new(gateway))).await?;
    Ok(())
}

/// Error body plus status, rendered as `{error, details?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                details: None,
            },
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %err, "request failed");
        }
        Self {
            status,
            body: err.to_response(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid JSON body: {err}")))
}

fn image_field(raw: Option<&str>) -> Result<DataUri, GatewayError> {
    match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(DataUri::parse(raw)?),
        _ => Err(GatewayError::validation("Missing image data")),
    }
}

fn image_response(image: DataUri) -> Json<ImageResponse> {
    Json(ImageResponse {
        url: image.to_string(),
    })
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn generate(State(state): State<AppState>, body: Bytes) -> ApiResult<ImageResponse> {
    let request: GenerateRequest = parse_body(&body)?;
    let prompt = request.prompt.unwrap_or_default();
    let image = state.gateway.generate(&prompt).await?;
    Ok(image_response(image))
}

async fn iterate(State(state): State<AppState>, body: Bytes) -> ApiResult<ImageResponse> {
    let request: IterateRequest = parse_body(&body)?;
    let image = image_field(request.image_data_url.as_deref())?;
    let prompt = request.prompt.unwrap_or_default();
    let edited = state.gateway.iterate(&image, &prompt).await?;
    Ok(image_response(edited))
}

async fn upscale(State(state): State<AppState>, body: Bytes) -> ApiResult<ImageResponse> {
    let request: UpscaleRequest = parse_body(&body)?;
    let backend = state
        .gateway
        .resolve_upscaler(request.provider.as_deref())?;
    run_upscale(&state, request, backend).await
}

async fn upscale_replicate(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ImageResponse> {
    let request: UpscaleRequest = parse_body(&body)?;
    run_upscale(&state, request, UpscaleBackend::Replicate).await
}

async fn run_upscale(
    state: &AppState,
    request: UpscaleRequest,
    backend: UpscaleBackend,
) -> ApiResult<ImageResponse> {
    let image = image_field(request.image_data_url.as_deref())?;
    let factor = UpscaleFactor::try_from(request.upscale_factor)?;
    let upscaled = state.gateway.upscale(&image, factor, backend).await?;
    Ok(image_response(upscaled))
}

async fn filter_prompt(State(state): State<AppState>, body: Bytes) -> ApiResult<FilteredResponse> {
    let request: SanitizeRequest = parse_body(&body)?;
    let Some(prompt) = request.prompt else {
        return Err(ApiError::bad_request("Invalid prompt"));
    };
    let filtered = state.gateway.sanitize(&prompt).await;
    Ok(Json(FilteredResponse { filtered }))
}
