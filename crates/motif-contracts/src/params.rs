use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const CROP_PERCENT_MAX: u32 = 60;
pub const HUE_MAX: u32 = 350;
pub const HUE_STEP: u32 = 10;
pub const BRIGHTNESS_MIN: u32 = 35;
pub const BRIGHTNESS_MAX: u32 = 65;
pub const BRIGHTNESS_NEUTRAL: u32 = 50;
pub const ZOOM_MIN: u32 = 10;
pub const ZOOM_MAX: u32 = 200;
pub const ZOOM_DEFAULT: u32 = 40;
pub const ROTATION_MAX: u32 = 360;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("{name} must be between {min} and {max} (got {value})")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("hue must be a multiple of 10 (got {0})")]
    HueStep(u32),
    #[error("unknown {kind} '{value}'")]
    Unknown { kind: &'static str, value: String },
}

fn check_range(name: &'static str, value: u32, min: u32, max: u32) -> Result<u32, ParamError> {
    if value < min || value > max {
        return Err(ParamError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorizationMode {
    #[default]
    Original,
    #[serde(alias = "grayscale")]
    Greyscale,
    Colorized,
}

impl ColorizationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Greyscale => "greyscale",
            Self::Colorized => "colorized",
        }
    }
}

impl FromStr for ColorizationMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" | "none" => Ok(Self::Original),
            "greyscale" | "grayscale" => Ok(Self::Greyscale),
            "colorized" | "colourised" | "colorize" => Ok(Self::Colorized),
            other => Err(ParamError::Unknown {
                kind: "colorization mode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ColorizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Saturation and lightness, both in percent, for a colorization preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePreset {
    pub saturation: u32,
    pub lightness: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorStyle {
    #[default]
    Vibrant,
    Pastel,
    Neon,
    Deep,
    Muted,
    Bright,
}

impl ColorStyle {
    pub const ALL: [ColorStyle; 6] = [
        ColorStyle::Vibrant,
        ColorStyle::Pastel,
        ColorStyle::Neon,
        ColorStyle::Deep,
        ColorStyle::Muted,
        ColorStyle::Bright,
    ];

    pub fn preset(self) -> StylePreset {
        let (saturation, lightness) = match self {
            Self::Vibrant => (85, 50),
            Self::Pastel => (50, 75),
            Self::Neon => (100, 60),
            Self::Deep => (90, 35),
            Self::Muted => (40, 55),
            Self::Bright => (100, 55),
        };
        StylePreset {
            saturation,
            lightness,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vibrant => "vibrant",
            Self::Pastel => "pastel",
            Self::Neon => "neon",
            Self::Deep => "deep",
            Self::Muted => "muted",
            Self::Bright => "bright",
        }
    }
}

impl FromStr for ColorStyle {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == lowered)
            .ok_or(ParamError::Unknown {
                kind: "color style",
                value: lowered,
            })
    }
}

impl fmt::Display for ColorStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the source image is laid out before it is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Repeat the source image as-is.
    Standard,
    /// Repeat the 2x2 mirrored composite.
    #[default]
    Mirrored,
}

impl RepeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Mirrored => "mirrored",
        }
    }
}

impl FromStr for RepeatMode {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "mirrored" | "mirror" => Ok(Self::Mirrored),
            other => Err(ParamError::Unknown {
                kind: "repeat mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Crop and color settings for the current tile.
///
/// Crop and repeat mode feed the compositor; the color fields only feed the
/// render-time filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileParameters {
    crop_percent: u32,
    colorization: ColorizationMode,
    hue: u32,
    color_style: ColorStyle,
    brightness: u32,
    repeat_mode: RepeatMode,
}

impl Default for TileParameters {
    fn default() -> Self {
        Self {
            crop_percent: 0,
            colorization: ColorizationMode::Original,
            hue: 0,
            color_style: ColorStyle::Vibrant,
            brightness: BRIGHTNESS_NEUTRAL,
            repeat_mode: RepeatMode::Mirrored,
        }
    }
}

impl TileParameters {
    pub fn crop_percent(&self) -> u32 {
        self.crop_percent
    }

    pub fn colorization(&self) -> ColorizationMode {
        self.colorization
    }

    pub fn hue(&self) -> u32 {
        self.hue
    }

    pub fn color_style(&self) -> ColorStyle {
        self.color_style
    }

    pub fn brightness(&self) -> u32 {
        self.brightness
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_crop_percent(&mut self, value: u32) -> Result<(), ParamError> {
        self.crop_percent = check_range("crop", value, 0, CROP_PERCENT_MAX)?;
        Ok(())
    }

    pub fn set_colorization(&mut self, mode: ColorizationMode) {
        self.colorization = mode;
    }

    pub fn set_hue(&mut self, value: u32) -> Result<(), ParamError> {
        check_range("hue", value, 0, HUE_MAX)?;
        if value % HUE_STEP != 0 {
            return Err(ParamError::HueStep(value));
        }
        self.hue = value;
        Ok(())
    }

    pub fn set_color_style(&mut self, style: ColorStyle) {
        self.color_style = style;
    }

    pub fn set_brightness(&mut self, value: u32) -> Result<(), ParamError> {
        self.brightness = check_range("brightness", value, BRIGHTNESS_MIN, BRIGHTNESS_MAX)?;
        Ok(())
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// True when `other` needs a different composite than `self`.
    pub fn geometry_differs(&self, other: &TileParameters) -> bool {
        self.crop_percent != other.crop_percent || self.repeat_mode != other.repeat_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PanOffset {
    pub x: f64,
    pub y: f64,
}

impl PanOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    zoom_percent: u32,
    rotation_degrees: u32,
    pan: PanOffset,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom_percent: ZOOM_DEFAULT,
            rotation_degrees: 0,
            pan: PanOffset::default(),
        }
    }
}

impl ViewTransform {
    pub fn zoom_percent(&self) -> u32 {
        self.zoom_percent
    }

    pub fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }

    pub fn pan(&self) -> PanOffset {
        self.pan
    }

    pub fn set_zoom_percent(&mut self, value: u32) -> Result<(), ParamError> {
        self.zoom_percent = check_range("zoom", value, ZOOM_MIN, ZOOM_MAX)?;
        Ok(())
    }

    pub fn set_rotation_degrees(&mut self, value: u32) -> Result<(), ParamError> {
        self.rotation_degrees = check_range("rotation", value, 0, ROTATION_MAX)?;
        Ok(())
    }

    pub fn set_pan(&mut self, pan: PanOffset) {
        self.pan = pan;
    }
}
