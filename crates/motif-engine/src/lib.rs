//! Pattern studio engine: prompt sanitizing, the inference gateway, the tile
//! compositor, the presentation surface and the session driver.

pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod gateway;
pub(crate) mod http;
pub mod providers;
pub mod sanitizer;
pub mod server;
pub mod session;
pub mod studio;
pub mod surface;

#[cfg(test)]
mod test_support;

pub use compositor::{CompositeError, MirroredTile, TileCompositor};
pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError};
pub use gateway::{ImageService, InferenceGateway, UpscaleBackend, UpscaleFactor};
pub use sanitizer::{BrandBlacklist, PromptSanitizer};
pub use session::{Phase, SessionState};
pub use studio::{Studio, StudioError, StudioOptions, UpscaleOutcome, DEFAULT_PROMPT_PREPEND};
pub use surface::{BackgroundStyle, PresentationSurface, Viewport};
