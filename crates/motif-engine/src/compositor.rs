//! Seamless tile construction from a source image.
//!
//! A mirrored tile is the source plus its horizontal, vertical and double
//! reflections laid out 2×2, so every edge meets its own reflection when the
//! tile repeats. The crop is taken symmetrically around the canvas centre,
//! which keeps that property.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use motif_contracts::{DataUri, RepeatMode, TileParameters};

pub const TILE_JPEG_QUALITY: u8 = 92;

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode tile: {0}")]
    Encode(#[source] image::ImageError),
    #[error("source image has no pixels")]
    EmptyImage,
    #[error("image worker stopped: {0}")]
    Worker(String),
}

/// Decodes on the blocking pool so large images do not stall the runtime.
pub async fn decode_image(source: &DataUri) -> Result<RgbaImage, CompositeError> {
    let bytes = source.bytes().to_vec();
    tokio::task::spawn_blocking(move || decode_image_blocking(&bytes))
        .await
        .map_err(|err| CompositeError::Worker(err.to_string()))?
}

pub fn decode_image_blocking(bytes: &[u8]) -> Result<RgbaImage, CompositeError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(CompositeError::Decode)?
        .to_rgba8();
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CompositeError::EmptyImage);
    }
    Ok(decoded)
}

/// 2W×2H canvas: source top-left, horizontal flip top-right, vertical flip
/// bottom-left, both flips bottom-right.
pub fn mirror_quadrants(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let flipped_h = imageops::flip_horizontal(source);
    let flipped_v = imageops::flip_vertical(source);
    let flipped_both = imageops::flip_vertical(&flipped_h);

    let mut canvas = RgbaImage::new(width * 2, height * 2);
    imageops::replace(&mut canvas, source, 0, 0);
    imageops::replace(&mut canvas, &flipped_h, i64::from(width), 0);
    imageops::replace(&mut canvas, &flipped_v, 0, i64::from(height));
    imageops::replace(
        &mut canvas,
        &flipped_both,
        i64::from(width),
        i64::from(height),
    );
    canvas
}

/// Pixels trimmed from each side of a mirrored canvas along an axis whose
/// source extent is `extent`.
pub fn crop_amount(extent: u32, crop_percent: u32) -> u32 {
    let percent = u64::from(crop_percent.min(motif_contracts::params::CROP_PERCENT_MAX));
    (u64::from(extent) * percent / 100) as u32
}

/// Central region of a mirrored canvas built from a `source_width`×`source_height`
/// image.
pub fn crop_centered(
    canvas: &RgbaImage,
    source_width: u32,
    source_height: u32,
    crop_percent: u32,
) -> RgbaImage {
    let crop_x = crop_amount(source_width, crop_percent);
    let crop_y = crop_amount(source_height, crop_percent);
    let width = canvas.width().saturating_sub(2 * crop_x).max(1);
    let height = canvas.height().saturating_sub(2 * crop_y).max(1);
    imageops::crop_imm(canvas, crop_x, crop_y, width, height).to_image()
}

/// Mirrored-and-cropped composite of `source`.
pub fn mirrored_tile(source: &RgbaImage, crop_percent: u32) -> RgbaImage {
    let canvas = mirror_quadrants(source);
    if crop_percent == 0 {
        return canvas;
    }
    crop_centered(&canvas, source.width(), source.height(), crop_percent)
}

/// JPEG at `quality`; transparent pixels are flattened onto white.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<DataUri, CompositeError> {
    let mut flattened = RgbaImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]));
    }
    let rgb = DynamicImage::ImageRgba8(flattened).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(CompositeError::Encode)?;
    Ok(DataUri::new("image/jpeg", bytes))
}

/// Resizes `source` to exactly `width`×`height` and re-encodes it as JPEG.
pub async fn resize_to(
    source: &DataUri,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<DataUri, CompositeError> {
    let bytes = source.bytes().to_vec();
    tokio::task::spawn_blocking(move || {
        let decoded = decode_image_blocking(&bytes)?;
        let resized = imageops::resize(&decoded, width.max(1), height.max(1), FilterType::Lanczos3);
        encode_jpeg(&resized, quality)
    })
    .await
    .map_err(|err| CompositeError::Worker(err.to_string()))?
}

/// The repeating unit shown by the surface.
#[derive(Debug, Clone)]
pub struct MirroredTile {
    source_fingerprint: String,
    crop_percent: u32,
    repeat_mode: RepeatMode,
    pixels: RgbaImage,
    image: DataUri,
}

impl MirroredTile {
    pub fn source_fingerprint(&self) -> &str {
        &self.source_fingerprint
    }

    pub fn crop_percent(&self) -> u32 {
        self.crop_percent
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Unencoded composite.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn image(&self) -> &DataUri {
        &self.image
    }

    /// True when this tile was built for `params` from the source with
    /// `fingerprint`.
    pub fn matches(&self, fingerprint: &str, params: &TileParameters) -> bool {
        self.source_fingerprint == fingerprint
            && self.crop_percent == params.crop_percent()
            && self.repeat_mode == params.repeat_mode()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileCompositor {
    quality: u8,
}

impl Default for TileCompositor {
    fn default() -> Self {
        Self {
            quality: TILE_JPEG_QUALITY,
        }
    }
}

impl TileCompositor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Builds the tile for `params` from an already decoded `source`.
    ///
    /// Only the crop and the repeat mode are read; colour parameters never
    /// reach the pixels.
    pub fn composite(
        &self,
        source: &DataUri,
        decoded: &RgbaImage,
        params: &TileParameters,
    ) -> Result<MirroredTile, CompositeError> {
        let (pixels, image) = match params.repeat_mode() {
            RepeatMode::Standard => (decoded.clone(), source.clone()),
            RepeatMode::Mirrored => {
                let pixels = mirrored_tile(decoded, params.crop_percent());
                let image = encode_jpeg(&pixels, self.quality)?;
                (pixels, image)
            }
        };
        Ok(MirroredTile {
            source_fingerprint: source.fingerprint(),
            crop_percent: params.crop_percent(),
            repeat_mode: params.repeat_mode(),
            pixels,
            image,
        })
    }

    pub fn composite_blocking(
        &self,
        source: &DataUri,
        params: &TileParameters,
    ) -> Result<MirroredTile, CompositeError> {
        let decoded = decode_image_blocking(source.bytes())?;
        self.composite(source, &decoded, params)
    }

    /// Decodes `source` and composites it off the async runtime.
    pub async fn composite_source(
        &self,
        source: &DataUri,
        params: &TileParameters,
    ) -> Result<MirroredTile, CompositeError> {
        let compositor = *self;
        let source = source.clone();
        let params = *params;
        tokio::task::spawn_blocking(move || compositor.composite_blocking(&source, &params))
        .await
        .map_err(|err| CompositeError::Worker(err.to_string()))?
    }
}
