//! Per-kind overlay behavior
//!
//! Everything that differs between text and image overlays sits behind
//! [`OverlayKindHandler`]: default sizing, hit testing, how content is
//! described in an export payload and how it is painted when flattening.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::export::PayloadContent;
use crate::preset::expand_placeholders;
use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::Rgba;
use overlay_model::{
    rotate_about, DocPoint, DocSize, ImageContent, ImageSource, Overlay, OverlayContent, OverlayKind, TextContent,
};
use overlay_pdf::RgbaImage;
use std::collections::HashMap;

/// Resolves image references to encoded image bytes
pub trait ImageResolver {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>>;
}

impl ImageResolver for HashMap<String, Vec<u8>> {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        self.get(reference).cloned()
    }
}

/// Resolver that knows no references
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

impl ImageResolver for NoImages {
    fn resolve(&self, _reference: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Inputs shared by every rasterization on one page
pub struct RasterContext<'a> {
    pub page_number: u32,
    pub page_count: u32,
    pub font: Option<&'a FontArc>,
    pub images: &'a dyn ImageResolver,
}

pub trait OverlayKindHandler: Send + Sync {
    fn kind(&self) -> OverlayKind;

    fn default_size(&self, config: &EngineConfig) -> DocSize;

    fn hit_test(&self, overlay: &Overlay, point: DocPoint, tolerance: f32) -> bool {
        overlay.contains(point, tolerance)
    }

    /// Content as the processing collaborator sees it on `page_number`
    fn payload_content(&self, overlay: &Overlay, page_number: u32, page_count: u32) -> PayloadContent;

    /// Paint the overlay onto a page raster at one pixel per document unit
    fn rasterize(&self, overlay: &Overlay, canvas: &mut RgbaImage, ctx: &RasterContext<'_>) -> crate::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl OverlayKindHandler for TextHandler {
    fn kind(&self) -> OverlayKind {
        OverlayKind::Text
    }

    fn default_size(&self, config: &EngineConfig) -> DocSize {
        config.default_text_size
    }

    fn payload_content(&self, overlay: &Overlay, page_number: u32, page_count: u32) -> PayloadContent {
        match overlay.content() {
            OverlayContent::Text(text) => PayloadContent::Text {
                text: expand_placeholders(&text.text, page_number, page_count),
                font_size: text.font_size,
                color: text.color.to_hex(),
            },
            OverlayContent::Image(image) => image_payload(image),
        }
    }

    fn rasterize(&self, overlay: &Overlay, canvas: &mut RgbaImage, ctx: &RasterContext<'_>) -> crate::Result<()> {
        let OverlayContent::Text(text) = overlay.content() else {
            return ImageHandler.rasterize(overlay, canvas, ctx);
        };
        if text.text.trim().is_empty() {
            return Ok(());
        }
        let font = ctx.font.ok_or(EngineError::MissingFont)?;

        let expanded = expand_placeholders(&text.text, ctx.page_number, ctx.page_count);
        let local = draw_text(font, &TextContent { text: expanded, ..text.clone() }, overlay.size());
        composite_rotated(canvas, &local, overlay.position(), overlay.rotation(), 1.0);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHandler;

impl OverlayKindHandler for ImageHandler {
    fn kind(&self) -> OverlayKind {
        OverlayKind::Image
    }

    fn default_size(&self, config: &EngineConfig) -> DocSize {
        config.default_image_size
    }

    fn payload_content(&self, overlay: &Overlay, page_number: u32, page_count: u32) -> PayloadContent {
        match overlay.content() {
            OverlayContent::Image(image) => image_payload(image),
            OverlayContent::Text(_) => TextHandler.payload_content(overlay, page_number, page_count),
        }
    }

    fn rasterize(&self, overlay: &Overlay, canvas: &mut RgbaImage, ctx: &RasterContext<'_>) -> crate::Result<()> {
        let OverlayContent::Image(image) = overlay.content() else {
            return TextHandler.rasterize(overlay, canvas, ctx);
        };

        let bytes = match &image.source {
            ImageSource::Embedded(bytes) => bytes.to_vec(),
            ImageSource::Reference(reference) => ctx
                .images
                .resolve(reference)
                .ok_or_else(|| EngineError::UnresolvedImage(reference.clone()))?,
        };

        let decoded = image::load_from_memory(&bytes)?.to_rgba8();
        let (width, height) = pixel_size(overlay.size());
        let local = imageops::resize(&decoded, width, height, FilterType::Triangle);
        composite_rotated(canvas, &local, overlay.position(), overlay.rotation(), image.opacity);
        Ok(())
    }
}

fn image_payload(image: &ImageContent) -> PayloadContent {
    match &image.source {
        ImageSource::Reference(reference) => PayloadContent::ImageReference {
            reference: reference.clone(),
            opacity: image.opacity,
        },
        ImageSource::Embedded(bytes) => PayloadContent::ImageData {
            data: STANDARD.encode(bytes),
            opacity: image.opacity,
        },
    }
}

/// Handlers keyed by kind
pub struct KindRegistry {
    handlers: HashMap<OverlayKind, Box<dyn OverlayKindHandler>>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut handlers: HashMap<OverlayKind, Box<dyn OverlayKindHandler>> = HashMap::new();
        handlers.insert(OverlayKind::Text, Box::new(TextHandler));
        handlers.insert(OverlayKind::Image, Box::new(ImageHandler));
        Self { handlers }
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KindRegistry {
    /// Replace the handler for its kind, returning the previous one
    pub fn register(&mut self, handler: Box<dyn OverlayKindHandler>) -> Option<Box<dyn OverlayKindHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn handler(&self, kind: OverlayKind) -> &dyn OverlayKindHandler {
        match self.handlers.get(&kind) {
            Some(handler) => handler.as_ref(),
            None => match kind {
                OverlayKind::Text => &TextHandler,
                OverlayKind::Image => &ImageHandler,
            },
        }
    }
}

fn pixel_size(size: DocSize) -> (u32, u32) {
    (size.width.round().max(1.0) as u32, size.height.round().max(1.0) as u32)
}

/// Lay out text top-left inside a transparent box, clipping at its edges
fn draw_text(font: &FontArc, text: &TextContent, size: DocSize) -> RgbaImage {
    let (width, height) = pixel_size(size);
    let mut local = RgbaImage::new(width, height);

    let scale = PxScale::from(text.font_size.max(1.0));
    let scaled = font.as_scaled(scale);
    let line_advance = scaled.height() + scaled.line_gap();
    let color = text.color;

    for (line_index, line) in text.text.lines().enumerate() {
        let baseline = scaled.ascent() + line_index as f32 * line_advance;
        let mut caret = 0.0f32;
        let mut previous: Option<GlyphId> = None;

        for ch in line.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(previous) = previous {
                caret += scaled.kern(previous, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);
            previous = Some(id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * color.a as f32).round() as u8;
                let pixel = local.get_pixel_mut(x as u32, y as u32);
                if alpha > pixel.0[3] {
                    *pixel = Rgba([color.r, color.g, color.b, alpha]);
                }
            });
        }
    }

    local
}

/// Paint `local` onto `canvas` with its top-left at `position`, rotated
/// clockwise about its center by `rotation` degrees
pub(crate) fn composite_rotated(
    canvas: &mut RgbaImage,
    local: &RgbaImage,
    position: DocPoint,
    rotation: f32,
    opacity: f32,
) {
    let (local_width, local_height) = local.dimensions();
    let (canvas_width, canvas_height) = canvas.dimensions();
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity == 0.0 || local_width == 0 || local_height == 0 {
        return;
    }

    let center = DocPoint::new(
        position.x + local_width as f32 / 2.0,
        position.y + local_height as f32 / 2.0,
    );
    let corners = [
        DocPoint::new(position.x, position.y),
        DocPoint::new(position.x + local_width as f32, position.y),
        DocPoint::new(position.x + local_width as f32, position.y + local_height as f32),
        DocPoint::new(position.x, position.y + local_height as f32),
    ]
    .map(|corner| rotate_about(corner, center, rotation));

    let min_x = corners.iter().map(|c| c.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let min_y = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let max_x = (corners.iter().map(|c| c.x).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(canvas_width);
    let max_y = (corners.iter().map(|c| c.y).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(canvas_height);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let sample = rotate_about(DocPoint::new(x as f32 + 0.5, y as f32 + 0.5), center, -rotation);
            let sx = (sample.x - position.x).floor();
            let sy = (sample.y - position.y).floor();
            if sx < 0.0 || sy < 0.0 || sx >= local_width as f32 || sy >= local_height as f32 {
                continue;
            }

            let source = local.get_pixel(sx as u32, sy as u32);
            blend_over(canvas.get_pixel_mut(x, y), source, opacity);
        }
    }
}

fn blend_over(destination: &mut Rgba<u8>, source: &Rgba<u8>, opacity: f32) {
    let alpha = source.0[3] as f32 / 255.0 * opacity;
    if alpha <= 0.0 {
        return;
    }
    let dest_alpha = destination.0[3] as f32 / 255.0;
    let out_alpha = alpha + dest_alpha * (1.0 - alpha);

    for channel in 0..3 {
        let src = source.0[channel] as f32;
        let dst = destination.0[channel] as f32;
        let value = if out_alpha > 0.0 {
            (src * alpha + dst * dest_alpha * (1.0 - alpha)) / out_alpha
        } else {
            0.0
        };
        destination.0[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    destination.0[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_model::Color;
    use std::io::Cursor;

    fn red_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn image_overlay(source: ImageSource, x: f32, y: f32) -> Overlay {
        Overlay::draft(
            1,
            DocPoint::new(x, y),
            DocSize::new(10.0, 10.0),
            OverlayContent::Image(ImageContent::new(source)),
        )
        .into_saved()
    }

    fn ctx<'a>(images: &'a dyn ImageResolver) -> RasterContext<'a> {
        RasterContext { page_number: 1, page_count: 1, font: None, images }
    }

    #[test]
    fn text_payload_expands_placeholders() {
        let overlay = Overlay::draft(
            1,
            DocPoint::new(0.0, 0.0),
            DocSize::new(80.0, 20.0),
            OverlayContent::Text(TextContent::new("{page} of {pages}", 12.0, Color::BLACK)),
        );

        let content = TextHandler.payload_content(&overlay, 2, 9);
        assert_eq!(
            content,
            PayloadContent::Text { text: "2 of 9".to_string(), font_size: 12.0, color: "#000000".to_string() }
        );
    }

    #[test]
    fn embedded_images_are_base64_in_payload() {
        let overlay = image_overlay(ImageSource::embedded(vec![1, 2, 3]), 0.0, 0.0);
        let content = ImageHandler.payload_content(&overlay, 1, 1);
        assert_eq!(content, PayloadContent::ImageData { data: "AQID".to_string(), opacity: 1.0 });
    }

    #[test]
    fn embedded_image_is_painted_at_position() {
        let mut canvas = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        let overlay = image_overlay(ImageSource::embedded(red_png(4, 4)), 20.0, 5.0);

        ImageHandler.rasterize(&overlay, &mut canvas, &ctx(&NoImages)).unwrap();

        assert_eq!(canvas.get_pixel(25, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(5, 10), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(25, 30), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn references_go_through_the_resolver() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let overlay = image_overlay(ImageSource::Reference("sig".to_string()), 0.0, 0.0);

        let err = ImageHandler.rasterize(&overlay, &mut canvas, &ctx(&NoImages)).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedImage(reference) if reference == "sig"));

        let mut images = HashMap::new();
        images.insert("sig".to_string(), red_png(2, 2));
        ImageHandler.rasterize(&overlay, &mut canvas, &ctx(&images)).unwrap();
        assert_eq!(canvas.get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn text_without_font_is_an_error() {
        let mut canvas = RgbaImage::new(10, 10);
        let overlay = Overlay::draft(
            1,
            DocPoint::new(0.0, 0.0),
            DocSize::new(10.0, 10.0),
            OverlayContent::Text(TextContent::new("hi", 12.0, Color::BLACK)),
        );

        let err = TextHandler.rasterize(&overlay, &mut canvas, &ctx(&NoImages)).unwrap_err();
        assert!(matches!(err, EngineError::MissingFont));
    }

    #[test]
    fn rotation_moves_painted_pixels() {
        let local = RgbaImage::from_pixel(20, 4, Rgba([0, 0, 0, 255]));
        let mut canvas = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));

        // Horizontal bar centered at (20, 20), turned upright.
        composite_rotated(&mut canvas, &local, DocPoint::new(10.0, 18.0), 90.0, 1.0);

        assert_eq!(canvas.get_pixel(20, 12), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(12, 20), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn opacity_blends_with_page() {
        let local = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let mut canvas = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));

        composite_rotated(&mut canvas, &local, DocPoint::new(0.0, 0.0), 0.0, 0.5);

        let pixel = canvas.get_pixel(0, 0);
        assert!((120..=135).contains(&pixel.0[0]), "got {pixel:?}");
        assert_eq!(pixel.0[3], 255);
    }

    #[test]
    fn default_registry_covers_both_kinds() {
        let registry = KindRegistry::default();
        let config = EngineConfig::default();
        assert_eq!(registry.handler(OverlayKind::Text).default_size(&config), config.default_text_size);
        assert_eq!(registry.handler(OverlayKind::Image).default_size(&config), config.default_image_size);
    }
}
