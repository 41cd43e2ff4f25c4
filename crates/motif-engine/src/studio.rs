use motif_contracts::events::EventWriter;
use motif_contracts::summary::{now_utc_iso, SessionSummary};
use motif_contracts::{
    ColorStyle, ColorizationMode, DataUri, FilterChain, ParamError, RepeatMode, TileParameters,
    ViewTransform,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::color::bake_filter_chain;
use crate::compositor::{decode_image, encode_jpeg, resize_to, CompositeError, TileCompositor};
use crate::error::GatewayError;
use crate::gateway::{ImageService, UpscaleBackend, UpscaleFactor};
use crate::session::{reduce, Action, Operation, SessionState, SourceImage, TransitionError};
use crate::surface::{BackgroundStyle, DragGesture, PresentationSurface, Viewport};

pub const DEFAULT_PROMPT_PREPEND: &str =
    "Perfectly seamless repeating pattern, for fashion print, inspired by ";

#[derive(Debug, Clone)]
pub struct StudioOptions {
    pub prompt_prepend: String,
    pub upscale_backend: UpscaleBackend,
    pub viewport: Viewport,
    pub tile_quality: u8,
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            prompt_prepend: DEFAULT_PROMPT_PREPEND.to_string(),
            upscale_backend: UpscaleBackend::Prodia,
            viewport: Viewport::default(),
            tile_quality: crate::compositor::TILE_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("Enter a prompt.")]
    EmptyPrompt,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Param(#[from] ParamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleOutcome {
    Upscaled,
    /// The current image was already upscaled; nothing was sent.
    AlreadyUpscaled,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    generations: u64,
    iterations: u64,
    upscales: u64,
    failures: u64,
}

/// One editing session: owns the state and runs operations against an
/// [`ImageService`]. Taking `&mut self` keeps a single operation in flight.
pub struct Studio<S: ImageService> {
    service: S,
    options: StudioOptions,
    state: SessionState,
    compositor: TileCompositor,
    surface: PresentationSurface,
    events: EventWriter,
    counters: Counters,
    started_at: String,
    drag: Option<DragGesture>,
}

impl<S: ImageService> Studio<S> {
    pub fn new(service: S, options: StudioOptions, events: EventWriter) -> Self {
        let studio = Self {
            compositor: TileCompositor::new(options.tile_quality),
            surface: PresentationSurface::new(options.viewport),
            service,
            options,
            state: SessionState::default(),
            events,
            counters: Counters::default(),
            started_at: now_utc_iso(),
            drag: None,
        };
        studio.record(
            "session_started",
            json!({
                "prompt_prepend": studio.options.prompt_prepend,
                "upscale_backend": studio.options.upscale_backend.as_str(),
                "viewport": {
                    "width": studio.options.viewport.width_px,
                    "height": studio.options.viewport.height_px,
                },
            }),
        );
        studio
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn options(&self) -> &StudioOptions {
        &self.options
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Prepend plus the trimmed prompt. Blank prompts are refused locally.
    pub fn full_prompt(&self, prompt: &str) -> Result<String, StudioError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        Ok(format!("{}{trimmed}", self.options.prompt_prepend))
    }

    pub async fn generate(&mut self, prompt: &str) -> Result<(), StudioError> {
        let full_prompt = self.full_prompt(prompt)?;
        self.begin(Operation::Generate, json!({"prompt": full_prompt}))?;
        let result = self.generated(&full_prompt).await;
        self.finish(Operation::Generate, result)
    }

    async fn generated(&self, prompt: &str) -> Result<Action, StudioError> {
        let image = self.service.generate(prompt).await?;
        let decoded = decode_image(&image).await?;
        let source = SourceImage::new(image, decoded.width(), decoded.height());
        let tile = self
            .compositor
            .composite(source.image(), &decoded, &TileParameters::default())?;
        let view = self.surface.reset_view(&tile);
        Ok(Action::Succeeded {
            operation: Operation::Generate,
            source,
            tile,
            view: Some(view),
        })
    }

    pub async fn iterate(&mut self, instruction: &str) -> Result<(), StudioError> {
        if instruction.trim().is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        self.begin(Operation::Iterate, json!({"instruction": instruction}))?;
        let result = self.iterated(instruction).await;
        self.finish(Operation::Iterate, result)
    }

    async fn iterated(&self, instruction: &str) -> Result<Action, StudioError> {
        let source = self
            .state
            .source()
            .cloned()
            .ok_or(TransitionError::NoSource(Operation::Iterate))?;
        let working = if source.is_at_base_resolution() {
            source.image().clone()
        } else {
            let (width, height) = source.base_dimensions();
            debug!(
                from = %format!("{}x{}", source.width(), source.height()),
                to = %format!("{width}x{height}"),
                "restoring base resolution before edit"
            );
            resize_to(source.image(), width, height, self.compositor.quality()).await?
        };
        let image = self.service.iterate(&working, instruction).await?;
        let decoded = decode_image(&image).await?;
        let edited = SourceImage::new(image, decoded.width(), decoded.height());
        let tile = self
            .compositor
            .composite(edited.image(), &decoded, self.state.params())?;
        Ok(Action::Succeeded {
            operation: Operation::Iterate,
            source: edited,
            tile,
            view: None,
        })
    }

    pub async fn upscale(&mut self, factor: UpscaleFactor) -> Result<UpscaleOutcome, StudioError> {
        if self.state.is_upscaled() {
            info!("image already upscaled; skipping");
            self.record(
                "upscale_skipped",
                json!({"reason": "already_upscaled", "factor": factor.get()}),
            );
            return Ok(UpscaleOutcome::AlreadyUpscaled);
        }
        let backend = self.options.upscale_backend;
        self.begin(
            Operation::Upscale,
            json!({"factor": factor.get(), "backend": backend.as_str()}),
        )?;
        let result = self.upscaled(factor, backend).await;
        self.finish(Operation::Upscale, result)?;
        Ok(UpscaleOutcome::Upscaled)
    }

    async fn upscaled(
        &self,
        factor: UpscaleFactor,
        backend: UpscaleBackend,
    ) -> Result<Action, StudioError> {
        let source = self
            .state
            .source()
            .cloned()
            .ok_or(TransitionError::NoSource(Operation::Upscale))?;
        let image = self.service.upscale(source.image(), factor, backend).await?;
        let decoded = decode_image(&image).await?;
        let upscaled = SourceImage::upscaled_from(&source, image, decoded.width(), decoded.height());
        let tile = self
            .compositor
            .composite(upscaled.image(), &decoded, self.state.params())?;
        Ok(Action::Succeeded {
            operation: Operation::Upscale,
            source: upscaled,
            tile,
            view: None,
        })
    }

    fn begin(&mut self, operation: Operation, detail: Value) -> Result<(), StudioError> {
        self.state = reduce(&self.state, Action::Begin(operation))?;
        info!(operation = operation.as_str(), "operation started");
        let mut payload = json!({"operation": operation.as_str()});
        merge(&mut payload, detail);
        self.record("operation_started", payload);
        Ok(())
    }

    fn finish(
        &mut self,
        operation: Operation,
        result: Result<Action, StudioError>,
    ) -> Result<(), StudioError> {
        let applied = result.and_then(|action| reduce(&self.state, action).map_err(StudioError::from));
        match applied {
            Ok(next) => {
                self.state = next;
                match operation {
                    Operation::Generate => self.counters.generations += 1,
                    Operation::Iterate => self.counters.iterations += 1,
                    Operation::Upscale => self.counters.upscales += 1,
                }
                self.record_installed(operation);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                warn!(operation = operation.as_str(), error = %message, "operation failed");
                self.state = reduce(
                    &self.state,
                    Action::Failed {
                        operation,
                        message: message.clone(),
                    },
                )?;
                self.counters.failures += 1;
                self.record(
                    "operation_failed",
                    json!({"operation": operation.as_str(), "error": message}),
                );
                Err(err)
            }
        }
    }

    fn record_installed(&self, operation: Operation) {
        if let Some(source) = self.state.source() {
            info!(
                operation = operation.as_str(),
                fingerprint = source.fingerprint(),
                width = source.width(),
                height = source.height(),
                "source replaced"
            );
            self.record(
                "source_replaced",
                json!({
                    "operation": operation.as_str(),
                    "fingerprint": source.fingerprint(),
                    "width": source.width(),
                    "height": source.height(),
                    "mime_type": source.image().mime_type(),
                    "is_upscaled": self.state.is_upscaled(),
                }),
            );
        }
        self.record_tile();
        if operation == Operation::Generate {
            self.record_view();
        }
    }

    fn record_tile(&self) {
        if let Some(tile) = self.state.tile() {
            self.record(
                "tile_composited",
                json!({
                    "source_fingerprint": tile.source_fingerprint(),
                    "crop_percent": tile.crop_percent(),
                    "repeat_mode": tile.repeat_mode().as_str(),
                    "width": tile.width(),
                    "height": tile.height(),
                }),
            );
        }
    }

    fn record_view(&self) {
        let view = self.state.view();
        self.record(
            "view_changed",
            json!({
                "zoom_percent": view.zoom_percent(),
                "rotation_degrees": view.rotation_degrees(),
                "pan": {"x": view.pan().x, "y": view.pan().y},
            }),
        );
    }

    pub async fn set_crop_percent(&mut self, crop_percent: u32) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_crop_percent(crop_percent)?;
        self.apply_geometry(params).await
    }

    pub async fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_repeat_mode(mode);
        self.apply_geometry(params).await
    }

    async fn apply_geometry(&mut self, params: TileParameters) -> Result<(), StudioError> {
        if !self.state.params().geometry_differs(&params) {
            return Ok(());
        }
        let Some(source) = self.state.source().cloned() else {
            self.state = reduce(&self.state, Action::ParamsChanged(params))?;
            return Ok(());
        };
        let tile = self.compositor.composite_source(source.image(), &params).await?;
        self.state = reduce(&self.state, Action::Recomposited { params, tile })?;
        self.record_tile();
        Ok(())
    }

    pub fn set_colorization(&mut self, mode: ColorizationMode) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_colorization(mode);
        self.apply_color(params)
    }

    pub fn set_hue(&mut self, hue: u32) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_hue(hue)?;
        self.apply_color(params)
    }

    pub fn set_color_style(&mut self, style: ColorStyle) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_color_style(style);
        self.apply_color(params)
    }

    pub fn set_brightness(&mut self, brightness: u32) -> Result<(), StudioError> {
        let mut params = *self.state.params();
        params.set_brightness(brightness)?;
        self.apply_color(params)
    }

    fn apply_color(&mut self, params: TileParameters) -> Result<(), StudioError> {
        self.state = reduce(&self.state, Action::ParamsChanged(params))?;
        self.record(
            "filter_changed",
            json!({
                "colorization": params.colorization().as_str(),
                "hue": params.hue(),
                "color_style": params.color_style().as_str(),
                "brightness": params.brightness(),
                "filter": self.filter_chain().to_css(),
            }),
        );
        Ok(())
    }

    pub fn set_zoom_percent(&mut self, zoom_percent: u32) -> Result<(), StudioError> {
        let mut view = *self.state.view();
        view.set_zoom_percent(zoom_percent)?;
        self.apply_view(view)
    }

    pub fn set_rotation_degrees(&mut self, degrees: u32) -> Result<(), StudioError> {
        let mut view = *self.state.view();
        view.set_rotation_degrees(degrees)?;
        self.apply_view(view)
    }

    fn apply_view(&mut self, view: ViewTransform) -> Result<(), StudioError> {
        self.state = reduce(&self.state, Action::ViewChanged(view))?;
        self.record_view();
        Ok(())
    }

    pub fn begin_drag(&mut self, pointer_x: f64, pointer_y: f64) {
        self.drag = Some(DragGesture::begin(self.state.view(), pointer_x, pointer_y));
    }

    /// Moves the pan with the pointer while a drag is active.
    pub fn drag_to(&mut self, pointer_x: f64, pointer_y: f64) -> Result<(), StudioError> {
        let Some(gesture) = self.drag else {
            return Ok(());
        };
        let mut view = *self.state.view();
        view.set_pan(gesture.pan_at(pointer_x, pointer_y));
        self.state = reduce(&self.state, Action::ViewChanged(view))?;
        Ok(())
    }

    pub fn end_drag(&mut self) {
        if self.drag.take().is_some() {
            self.record_view();
        }
    }

    pub fn filter_chain(&self) -> FilterChain {
        FilterChain::for_parameters(self.state.params())
    }

    /// Current background style, or `None` before the first image.
    pub fn background(&self) -> Option<BackgroundStyle> {
        let tile = self.state.tile()?;
        Some(
            self.surface
                .render(tile, self.state.params(), self.state.view()),
        )
    }

    /// The tile with the current colour treatment baked in, as JPEG.
    pub fn baked_tile(&self) -> Result<Option<DataUri>, CompositeError> {
        let Some(tile) = self.state.tile() else {
            return Ok(None);
        };
        let baked = bake_filter_chain(tile.pixels(), &self.filter_chain());
        encode_jpeg(&baked, self.compositor.quality()).map(Some)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.events.session_id().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            generations: self.counters.generations,
            iterations: self.counters.iterations,
            upscales: self.counters.upscales,
            failures: self.counters.failures,
            source_fingerprint: self
                .state
                .source()
                .map(|source| source.fingerprint().to_string()),
            is_upscaled: self.state.is_upscaled(),
        }
    }

    /// Records `session_finished` and returns the final summary.
    pub fn finish_session(&self) -> SessionSummary {
        let summary = self.summary();
        self.record(
            "session_finished",
            json!({
                "generations": summary.generations,
                "iterations": summary.iterations,
                "upscales": summary.upscales,
                "failures": summary.failures,
            }),
        );
        summary
    }

    fn record(&self, event_type: &str, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event_type, error = %err, "failed to write session event");
        }
    }
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex;

    use super::*;
    use crate::compositor::decode_image_blocking;
    use crate::test_support::sample_png;

    struct FakeService {
        side: u32,
        fail_iterate: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeService {
        fn new(side: u32) -> Self {
            Self {
                side,
                fail_iterate: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn push(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    fn dimensions(image: &DataUri) -> String {
        decode_image_blocking(image.bytes())
            .map(|decoded| format!("{}x{}", decoded.width(), decoded.height()))
            .unwrap_or_else(|_| "undecodable".to_string())
    }

    impl ImageService for FakeService {
        fn generate(&self, prompt: &str) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
            self.push(format!("generate:{prompt}"));
            let image = sample_png(self.side, self.side);
            async move { Ok(image) }
        }

        fn iterate(
            &self,
            image: &DataUri,
            instruction: &str,
        ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
            self.push(format!("iterate:{}:{instruction}", dimensions(image)));
            let result = if self.fail_iterate {
                Err(GatewayError::upstream(Some(500), "Prodia img2img error (500)"))
            } else {
                Ok(sample_png(self.side + 2, self.side + 2))
            };
            async move { result }
        }

        fn upscale(
            &self,
            image: &DataUri,
            factor: UpscaleFactor,
            backend: UpscaleBackend,
        ) -> impl Future<Output = Result<DataUri, GatewayError>> + Send {
            self.push(format!("upscale:{}:{}:{}", dimensions(image), factor, backend.as_str()));
            let side = self.side * factor.get();
            let image = sample_png(side, side);
            async move { Ok(image) }
        }
    }

    fn studio(side: u32) -> Studio<FakeService> {
        let options = StudioOptions {
            prompt_prepend: "Seamless repeating pattern, for fashion print, inspired by ".to_string(),
            viewport: Viewport::new(1000.0, 700.0),
            ..StudioOptions::default()
        };
        Studio::new(FakeService::new(side), options, EventWriter::in_memory("test-session"))
    }

    #[tokio::test]
    async fn dancing_floral_generates_a_reset_mirrored_tile() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.set_zoom_percent(120)?;
        studio.generate("  dancing floral ").await?;

        assert_eq!(
            studio.service().calls(),
            vec!["generate:Seamless repeating pattern, for fashion print, inspired by dancing floral"]
        );
        let state = studio.state();
        let tile = state.tile().ok_or_else(|| anyhow::anyhow!("no tile"))?;
        assert_eq!((tile.width(), tile.height()), (16, 16));
        assert_eq!(state.view().zoom_percent(), 40);
        assert_eq!(state.view().rotation_degrees(), 0);
        assert_eq!(state.view().pan().y, -600.0);
        assert_eq!(state.params().crop_percent(), 0);
        assert_eq!(state.params().colorization(), ColorizationMode::Original);
        assert!(!state.is_upscaled());

        let types = studio.events().event_types();
        assert_eq!(types.first().map(String::as_str), Some("session_started"));
        for expected in ["operation_started", "source_replaced", "tile_composited"] {
            assert!(types.iter().any(|kind| kind == expected), "missing {expected}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn blank_prompt_is_refused_without_a_call() {
        let mut studio = studio(8);
        let err = studio.generate("   ").await.err().map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Enter a prompt."));
        assert!(studio.service().calls().is_empty());
    }

    #[tokio::test]
    async fn second_upscale_is_skipped_locally() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        assert_eq!(studio.upscale(UpscaleFactor::X2).await?, UpscaleOutcome::Upscaled);
        assert!(studio.state().is_upscaled());
        assert_eq!(
            studio.state().source().map(|source| (source.width(), source.height())),
            Some((16, 16))
        );

        assert_eq!(
            studio.upscale(UpscaleFactor::X4).await?,
            UpscaleOutcome::AlreadyUpscaled
        );
        let upscale_calls = studio
            .service()
            .calls()
            .iter()
            .filter(|call| call.starts_with("upscale:"))
            .count();
        assert_eq!(upscale_calls, 1);
        assert!(studio
            .events()
            .event_types()
            .iter()
            .any(|kind| kind == "upscale_skipped"));
        Ok(())
    }

    #[tokio::test]
    async fn iterate_on_upscaled_source_uses_base_resolution() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        studio.upscale(UpscaleFactor::X2).await?;
        studio.iterate("make it blue").await?;

        let calls = studio.service().calls();
        assert_eq!(calls.last().map(String::as_str), Some("iterate:8x8:make it blue"));
        assert!(!studio.state().is_upscaled());
        assert_eq!(studio.summary().iterations, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_iterate_keeps_source_and_records_error() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.service.fail_iterate = true;
        studio.generate("floral").await?;
        studio.set_crop_percent(25).await?;
        let before = studio.state().source().cloned();

        let err = studio.iterate("make it blue").await.err().map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Prodia img2img error (500)"));
        assert_eq!(studio.state().source().cloned(), before);
        assert_eq!(studio.state().params().crop_percent(), 25);
        assert_eq!(studio.state().last_error(), Some("Prodia img2img error (500)"));
        assert_eq!(studio.summary().failures, 1);
        assert!(studio
            .events()
            .event_types()
            .iter()
            .any(|kind| kind == "operation_failed"));
        Ok(())
    }

    #[tokio::test]
    async fn crop_recomposites_from_the_source() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        studio.set_crop_percent(25).await?;
        let tile = studio.state().tile().ok_or_else(|| anyhow::anyhow!("no tile"))?;
        assert_eq!((tile.width(), tile.height()), (12, 12));

        studio.set_crop_percent(0).await?;
        let tile = studio.state().tile().ok_or_else(|| anyhow::anyhow!("no tile"))?;
        assert_eq!((tile.width(), tile.height()), (16, 16));
        Ok(())
    }

    #[tokio::test]
    async fn colour_changes_leave_the_tile_untouched() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        let before = studio.state().tile().map(|tile| tile.image().clone());

        studio.set_colorization(ColorizationMode::Colorized)?;
        studio.set_color_style(ColorStyle::Pastel)?;
        studio.set_hue(120)?;
        studio.set_brightness(60)?;

        assert_eq!(studio.state().tile().map(|tile| tile.image().clone()), before);
        let style = studio.background().ok_or_else(|| anyhow::anyhow!("no background"))?;
        assert_eq!(
            style.filter,
            "grayscale(100%) sepia(100%) saturate(200%) brightness(1.8) hue-rotate(70deg)"
        );
        assert!(studio.baked_tile()?.is_some());
        assert!(studio.set_hue(125).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn drags_update_pan_and_log_once() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        let start = studio.state().view().pan();
        let views_before = studio
            .events()
            .event_types()
            .iter()
            .filter(|kind| kind.as_str() == "view_changed")
            .count();

        studio.begin_drag(0.0, 0.0);
        studio.drag_to(5.0, 5.0)?;
        studio.drag_to(30.0, -10.0)?;
        studio.end_drag();

        assert_eq!(studio.state().view().pan(), start.translated(30.0, -10.0));
        let views_after = studio
            .events()
            .event_types()
            .iter()
            .filter(|kind| kind.as_str() == "view_changed")
            .count();
        assert_eq!(views_after, views_before + 1);
        Ok(())
    }

    #[tokio::test]
    async fn summary_counts_operations() -> anyhow::Result<()> {
        let mut studio = studio(8);
        studio.generate("floral").await?;
        studio.generate("paisley").await?;
        let summary = studio.finish_session();
        assert_eq!(summary.generations, 2);
        assert_eq!(summary.session_id, "test-session");
        assert_eq!(
            summary.source_fingerprint.as_deref(),
            studio.state().source().map(SourceImage::fingerprint)
        );
        assert_eq!(
            studio.events().event_types().last().map(String::as_str),
            Some("session_finished")
        );
        Ok(())
    }
}
