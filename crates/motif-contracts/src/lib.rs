pub mod data_uri;
pub mod events;
pub mod filters;
pub mod params;
pub mod providers;
pub mod summary;
pub mod wire;

pub use data_uri::{DataUri, DataUriError};
pub use filters::{FilterChain, FilterOp};
pub use params::{
    ColorStyle, ColorizationMode, PanOffset, ParamError, RepeatMode, StylePreset, TileParameters,
    ViewTransform,
};
