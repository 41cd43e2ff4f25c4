//! CPU rendition of a [`FilterChain`], for exporting a tile with its colour
//! treatment baked in. The live surface never uses this; it hands the chain to
//! the renderer as a CSS filter.

use image::{Rgba, RgbaImage};
use motif_contracts::{FilterChain, FilterOp};

type ColorMatrix = [f32; 9];

const IDENTITY: ColorMatrix = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Linear RGB matrix for one filter primitive (Filter Effects Level 1).
fn op_matrix(op: &FilterOp) -> ColorMatrix {
    match *op {
        FilterOp::Grayscale(amount) => {
            let k = 1.0 - (amount as f32).clamp(0.0, 1.0);
            [
                0.2126 + 0.7874 * k,
                0.7152 - 0.7152 * k,
                0.0722 - 0.0722 * k,
                0.2126 - 0.2126 * k,
                0.7152 + 0.2848 * k,
                0.0722 - 0.0722 * k,
                0.2126 - 0.2126 * k,
                0.7152 - 0.7152 * k,
                0.0722 + 0.9278 * k,
            ]
        }
        FilterOp::Sepia(amount) => {
            let k = 1.0 - (amount as f32).clamp(0.0, 1.0);
            [
                0.393 + 0.607 * k,
                0.769 - 0.769 * k,
                0.189 - 0.189 * k,
                0.349 - 0.349 * k,
                0.686 + 0.314 * k,
                0.168 - 0.168 * k,
                0.272 - 0.272 * k,
                0.534 - 0.534 * k,
                0.131 + 0.869 * k,
            ]
        }
        FilterOp::Saturate(amount) => {
            let s = (amount as f32).max(0.0);
            [
                0.213 + 0.787 * s,
                0.715 - 0.715 * s,
                0.072 - 0.072 * s,
                0.213 - 0.213 * s,
                0.715 + 0.285 * s,
                0.072 - 0.072 * s,
                0.213 - 0.213 * s,
                0.715 - 0.715 * s,
                0.072 + 0.928 * s,
            ]
        }
        FilterOp::Brightness(amount) => {
            let b = (amount as f32).max(0.0);
            [b, 0.0, 0.0, 0.0, b, 0.0, 0.0, 0.0, b]
        }
        FilterOp::HueRotate(degrees) => {
            let (sin, cos) = (degrees as f32).to_radians().sin_cos();
            [
                0.213 + cos * 0.787 - sin * 0.213,
                0.715 - cos * 0.715 - sin * 0.715,
                0.072 - cos * 0.072 + sin * 0.928,
                0.213 - cos * 0.213 + sin * 0.143,
                0.715 + cos * 0.285 + sin * 0.140,
                0.072 - cos * 0.072 - sin * 0.283,
                0.213 - cos * 0.213 - sin * 0.787,
                0.715 - cos * 0.715 + sin * 0.715,
                0.072 + cos * 0.928 + sin * 0.072,
            ]
        }
    }
}

fn apply_matrix(m: &ColorMatrix, rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    [
        (m[0] * r + m[1] * g + m[2] * b).clamp(0.0, 1.0),
        (m[3] * r + m[4] * g + m[5] * b).clamp(0.0, 1.0),
        (m[6] * r + m[7] * g + m[8] * b).clamp(0.0, 1.0),
    ]
}

/// Returns a copy of `image` with `chain` applied in order. Each primitive is
/// clamped to the displayable range before the next one runs. Alpha is kept.
pub fn bake_filter_chain(image: &RgbaImage, chain: &FilterChain) -> RgbaImage {
    if chain.is_identity() {
        return image.clone();
    }
    let stages: Vec<ColorMatrix> = chain
        .ops()
        .iter()
        .map(op_matrix)
        .filter(|matrix| *matrix != IDENTITY)
        .collect();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let mut rgb = [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        ];
        for stage in &stages {
            rgb = apply_matrix(stage, rgb);
        }
        let to_byte = |value: f32| (value * 255.0).round().clamp(0.0, 255.0) as u8;
        *pixel = Rgba([to_byte(rgb[0]), to_byte(rgb[1]), to_byte(rgb[2]), a]);
    }
    out
}
