//! Presentation of a tile as a repeating, rotatable, pannable background.

use motif_contracts::{FilterChain, PanOffset, TileParameters, ViewTransform};
use serde::{Deserialize, Serialize};

use crate::compositor::MirroredTile;

/// The background element spans this many viewport widths and heights, offset
/// by one viewport, so rotation never exposes an edge.
pub const BACKGROUND_SPAN: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width_px: f64,
    pub height_px: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width_px: 1280.0,
            height_px: 800.0,
        }
    }
}

impl Viewport {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self {
            width_px: width_px.max(1.0),
            height_px: height_px.max(1.0),
        }
    }
}

/// On-screen size of one tile repetition for `zoom_percent`.
pub fn tile_display_size(
    viewport: Viewport,
    zoom_percent: u32,
    tile_width: u32,
    tile_height: u32,
) -> (f64, f64) {
    let width = f64::from(zoom_percent) * BACKGROUND_SPAN * viewport.width_px / 100.0;
    let aspect = f64::from(tile_height.max(1)) / f64::from(tile_width.max(1));
    (width, width * aspect)
}

/// Pan applied after a fresh generation: half a tile up.
pub fn initial_pan(
    viewport: Viewport,
    zoom_percent: u32,
    tile_width: u32,
    tile_height: u32,
) -> PanOffset {
    let (_, height) = tile_display_size(viewport, zoom_percent, tile_width, tile_height);
    PanOffset::new(0.0, -height / 2.0)
}

/// One click-drag. The pan at any pointer position is the pan at press time
/// plus the pointer travel, so consecutive drags add up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragGesture {
    origin_x: f64,
    origin_y: f64,
    start_pan: PanOffset,
}

impl DragGesture {
    pub fn begin(view: &ViewTransform, pointer_x: f64, pointer_y: f64) -> Self {
        Self {
            origin_x: pointer_x,
            origin_y: pointer_y,
            start_pan: view.pan(),
        }
    }

    pub fn pan_at(&self, pointer_x: f64, pointer_y: f64) -> PanOffset {
        self.start_pan
            .translated(pointer_x - self.origin_x, pointer_y - self.origin_y)
    }
}

/// Declarative style of the background element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundStyle {
    pub background_image: String,
    pub background_repeat: String,
    pub background_size: String,
    pub background_position: String,
    pub width: String,
    pub height: String,
    pub left: String,
    pub top: String,
    pub transform: String,
    pub transform_origin: String,
    pub filter: String,
}

impl BackgroundStyle {
    /// Same style pointing at another image location.
    pub fn with_image_url(mut self, url: &str) -> Self {
        self.background_image = format!("url({url})");
        self
    }

    pub fn to_inline_css(&self) -> String {
        [
            ("background-image", &self.background_image),
            ("background-repeat", &self.background_repeat),
            ("background-size", &self.background_size),
            ("background-position", &self.background_position),
            ("width", &self.width),
            ("height", &self.height),
            ("left", &self.left),
            ("top", &self.top),
            ("transform", &self.transform),
            ("transform-origin", &self.transform_origin),
            ("filter", &self.filter),
        ]
        .iter()
        .map(|(property, value)| format!("{property}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PresentationSurface {
    viewport: Viewport,
}

impl PresentationSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Default transform with the pan centred on a fresh `tile`.
    pub fn reset_view(&self, tile: &MirroredTile) -> ViewTransform {
        let mut view = ViewTransform::default();
        view.set_pan(initial_pan(
            self.viewport,
            view.zoom_percent(),
            tile.width(),
            tile.height(),
        ));
        view
    }

    pub fn render(
        &self,
        tile: &MirroredTile,
        params: &TileParameters,
        view: &ViewTransform,
    ) -> BackgroundStyle {
        let pan = view.pan();
        BackgroundStyle {
            background_image: format!("url({})", tile.image()),
            background_repeat: "repeat".to_string(),
            background_size: format!("{}%", view.zoom_percent()),
            background_position: format!("{}px {}px", format_px(pan.x), format_px(pan.y)),
            width: "300%".to_string(),
            height: "300%".to_string(),
            left: "-100%".to_string(),
            top: "-100%".to_string(),
            transform: format!("rotate({}deg)", view.rotation_degrees()),
            transform_origin: "center".to_string(),
            filter: FilterChain::for_parameters(params).to_css(),
        }
    }
}

fn format_px(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let text = format!("{rounded:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use motif_contracts::ColorizationMode;

    use super::*;
    use crate::compositor::TileCompositor;
    use crate::test_support::sample_png;

    fn tile(width: u32, height: u32) -> anyhow::Result<MirroredTile> {
        let source = sample_png(width, height);
        Ok(TileCompositor::default().composite_blocking(&source, &TileParameters::default())?)
    }

    #[test]
    fn tile_size_follows_zoom_and_aspect() {
        let viewport = Viewport::new(1000.0, 700.0);
        assert_eq!(tile_display_size(viewport, 40, 200, 100), (1200.0, 600.0));
        assert_eq!(initial_pan(viewport, 40, 200, 200), PanOffset::new(0.0, -600.0));
    }

    #[test]
    fn reset_view_uses_defaults_and_half_tile_pan() -> anyhow::Result<()> {
        let surface = PresentationSurface::new(Viewport::new(1000.0, 700.0));
        let view = surface.reset_view(&tile(8, 8)?);
        assert_eq!(view.zoom_percent(), 40);
        assert_eq!(view.rotation_degrees(), 0);
        assert_eq!(view.pan(), PanOffset::new(0.0, -600.0));
        Ok(())
    }

    #[test]
    fn drags_accumulate() {
        let mut view = ViewTransform::default();
        let first = DragGesture::begin(&view, 10.0, 10.0);
        view.set_pan(first.pan_at(25.0, 5.0));
        let second = DragGesture::begin(&view, 100.0, 100.0);
        view.set_pan(second.pan_at(90.0, 130.0));
        assert_eq!(view.pan(), PanOffset::new(5.0, 25.0));
    }

    #[test]
    fn render_emits_background_declarations() -> anyhow::Result<()> {
        let surface = PresentationSurface::new(Viewport::new(1000.0, 700.0));
        let tile = tile(4, 4)?;
        let mut params = TileParameters::default();
        params.set_colorization(ColorizationMode::Greyscale);
        params.set_brightness(65)?;
        let mut view = surface.reset_view(&tile);
        view.set_rotation_degrees(45)?;

        let style = surface.render(&tile, &params, &view);
        assert_eq!(style.background_size, "40%");
        assert_eq!(style.background_position, "0px -600px");
        assert_eq!(style.transform, "rotate(45deg)");
        assert_eq!(style.filter, "grayscale(100%) brightness(1.3)");
        assert!(style.background_image.starts_with("url(data:image/jpeg;base64,"));

        let css = style.with_image_url("tile.jpg").to_inline_css();
        assert!(css.starts_with("background-image: url(tile.jpg);"));
        assert!(css.contains("width: 300%; height: 300%; left: -100%; top: -100%;"));
        Ok(())
    }

    #[test]
    fn pixel_values_are_trimmed() {
        assert_eq!(format_px(-600.0), "-600");
        assert_eq!(format_px(12.5), "12.5");
        assert_eq!(format_px(-0.001), "0");
    }
}
