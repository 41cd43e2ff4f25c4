use serde::{Deserialize, Serialize};

use crate::params::{ColorizationMode, TileParameters, BRIGHTNESS_NEUTRAL};

/// Aligns the sepia base tone with hue 0. Stored hue selections depend on it.
pub const HUE_CALIBRATION_OFFSET: f64 = 50.0;

/// One step of a render-time color filter. Amounts are fractions (1.0 = 100%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "amount", rename_all = "kebab-case")]
pub enum FilterOp {
    Grayscale(f64),
    Sepia(f64),
    Saturate(f64),
    Brightness(f64),
    HueRotate(f64),
}

impl FilterOp {
    pub fn css(&self) -> String {
        match self {
            Self::Grayscale(amount) => format!("grayscale({}%)", trim_float(amount * 100.0)),
            Self::Sepia(amount) => format!("sepia({}%)", trim_float(amount * 100.0)),
            Self::Saturate(amount) => format!("saturate({}%)", trim_float(amount * 100.0)),
            Self::Brightness(amount) => format!("brightness({})", trim_float(*amount)),
            Self::HueRotate(degrees) => format!("hue-rotate({}deg)", trim_float(*degrees)),
        }
    }
}

/// Ordered, declarative color filter applied on top of a tile at render time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterChain {
    ops: Vec<FilterOp>,
}

impl FilterChain {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<FilterOp>) -> Self {
        Self { ops }
    }

    pub fn for_parameters(params: &TileParameters) -> Self {
        let brightness = f64::from(params.brightness()) / f64::from(BRIGHTNESS_NEUTRAL);
        match params.colorization() {
            ColorizationMode::Original => Self::identity(),
            ColorizationMode::Greyscale => Self::from_ops(vec![
                FilterOp::Grayscale(1.0),
                FilterOp::Brightness(brightness),
            ]),
            ColorizationMode::Colorized => {
                let preset = params.color_style().preset();
                let lightness = f64::from(preset.lightness) / 50.0;
                Self::from_ops(vec![
                    FilterOp::Grayscale(1.0),
                    FilterOp::Sepia(1.0),
                    FilterOp::Saturate(f64::from(preset.saturation) * 4.0 / 100.0),
                    FilterOp::Brightness(brightness * lightness),
                    FilterOp::HueRotate(f64::from(params.hue()) - HUE_CALIBRATION_OFFSET),
                ])
            }
        }
    }

    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// CSS `filter` property value.
    pub fn to_css(&self) -> String {
        if self.ops.is_empty() {
            return "none".to_string();
        }
        self.ops
            .iter()
            .map(FilterOp::css)
            .collect::<Vec<String>>()
            .join(" ")
    }
}

fn trim_float(value: f64) -> String {
    let text = format!("{value:.3}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        return "0".to_string();
    }
    trimmed.to_string()
}
