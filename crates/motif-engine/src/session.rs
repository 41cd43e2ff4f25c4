//! Session state and its transitions.
//!
//! `reduce` is pure: it takes the current state and one action and returns
//! the next state or the reason the action is not allowed. Network calls and
//! compositing happen outside, in the studio driver.

use motif_contracts::{DataUri, TileParameters, ViewTransform};
use serde::Serialize;

use crate::compositor::MirroredTile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Empty,
    Generating,
    Ready,
    Iterating,
    Upscaling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    Iterate,
    Upscale,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Iterate => "iterate",
            Self::Upscale => "upscale",
        }
    }

    fn phase(self) -> Phase {
        match self {
            Self::Generate => Phase::Generating,
            Self::Iterate => Phase::Iterating,
            Self::Upscale => Phase::Upscaling,
        }
    }
}

/// The authoritative raster for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    image: DataUri,
    width: u32,
    height: u32,
    base_width: u32,
    base_height: u32,
    fingerprint: String,
}

impl SourceImage {
    /// A freshly generated or edited image; its size is the working size.
    pub fn new(image: DataUri, width: u32, height: u32) -> Self {
        let fingerprint = image.fingerprint();
        Self {
            image,
            width,
            height,
            base_width: width,
            base_height: height,
            fingerprint,
        }
    }

    /// An upscaled version of `previous`, keeping its working size.
    pub fn upscaled_from(previous: &SourceImage, image: DataUri, width: u32, height: u32) -> Self {
        let fingerprint = image.fingerprint();
        Self {
            image,
            width,
            height,
            base_width: previous.base_width,
            base_height: previous.base_height,
            fingerprint,
        }
    }

    pub fn image(&self) -> &DataUri {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn base_dimensions(&self) -> (u32, u32) {
        (self.base_width, self.base_height)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_at_base_resolution(&self) -> bool {
        self.width == self.base_width && self.height == self.base_height
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Begin(Operation),
    Succeeded {
        operation: Operation,
        source: SourceImage,
        tile: MirroredTile,
        /// Replacement transform; generate supplies the reset view.
        view: Option<ViewTransform>,
    },
    Failed {
        operation: Operation,
        message: String,
    },
    /// Crop or repeat mode changed and the tile was rebuilt.
    Recomposited {
        params: TileParameters,
        tile: MirroredTile,
    },
    /// Change that keeps the current tile valid (colour only), or any change
    /// while there is no tile yet.
    ParamsChanged(TileParameters),
    ViewChanged(ViewTransform),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("another operation is in progress ({})", .0.as_str())]
    Busy(Operation),
    #[error("no image to {}", .0.as_str())]
    NoSource(Operation),
    #[error("image is already upscaled; generate a new image first")]
    AlreadyUpscaled,
    #[error("no {} is in progress", .0.as_str())]
    NotPending(Operation),
    #[error("tile does not belong to the current image and parameters")]
    StaleTile,
    #[error("crop or repeat mode changed; the tile must be rebuilt")]
    GeometryChanged,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    source: Option<SourceImage>,
    tile: Option<MirroredTile>,
    params: TileParameters,
    view: ViewTransform,
    is_upscaled: bool,
    pending: Option<Operation>,
    last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Empty,
            source: None,
            tile: None,
            params: TileParameters::default(),
            view: ViewTransform::default(),
            is_upscaled: false,
            pending: None,
            last_error: None,
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn tile(&self) -> Option<&MirroredTile> {
        self.tile.as_ref()
    }

    pub fn params(&self) -> &TileParameters {
        &self.params
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn is_upscaled(&self) -> bool {
        self.is_upscaled
    }

    pub fn pending(&self) -> Option<Operation> {
        self.pending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn settled_phase(&self) -> Phase {
        if self.source.is_some() {
            Phase::Ready
        } else {
            Phase::Empty
        }
    }
}

pub fn reduce(state: &SessionState, action: Action) -> Result<SessionState, TransitionError> {
    let mut next = state.clone();
    match action {
        Action::Begin(operation) => {
            if let Some(pending) = state.pending {
                return Err(TransitionError::Busy(pending));
            }
            if operation != Operation::Generate && state.source.is_none() {
                return Err(TransitionError::NoSource(operation));
            }
            if operation == Operation::Upscale && state.is_upscaled {
                return Err(TransitionError::AlreadyUpscaled);
            }
            next.pending = Some(operation);
            next.phase = operation.phase();
            next.last_error = None;
        }
        Action::Succeeded {
            operation,
            source,
            tile,
            view,
        } => {
            if state.pending != Some(operation) {
                return Err(TransitionError::NotPending(operation));
            }
            let params = if operation == Operation::Generate {
                TileParameters::default()
            } else {
                state.params
            };
            if !tile.matches(source.fingerprint(), &params) {
                return Err(TransitionError::StaleTile);
            }
            next.params = params;
            if let Some(view) = view {
                next.view = view;
            } else if operation == Operation::Generate {
                next.view = ViewTransform::default();
            }
            next.is_upscaled = operation == Operation::Upscale;
            next.source = Some(source);
            next.tile = Some(tile);
            next.pending = None;
            next.phase = Phase::Ready;
            next.last_error = None;
        }
        Action::Failed { operation, message } => {
            if state.pending != Some(operation) {
                return Err(TransitionError::NotPending(operation));
            }
            next.pending = None;
            next.phase = state.settled_phase();
            next.last_error = Some(message);
        }
        Action::Recomposited { params, tile } => {
            let source = state
                .source
                .as_ref()
                .ok_or(TransitionError::NoSource(Operation::Iterate))?;
            if !tile.matches(source.fingerprint(), &params) {
                return Err(TransitionError::StaleTile);
            }
            next.params = params;
            next.tile = Some(tile);
        }
        Action::ParamsChanged(params) => {
            if state.tile.is_some() && state.params.geometry_differs(&params) {
                return Err(TransitionError::GeometryChanged);
            }
            next.params = params;
        }
        Action::ViewChanged(view) => {
            next.view = view;
        }
    }
    Ok(next)
}
