//! Overlay data model
//!
//! Plain values shared by the overlay engine: points in the two coordinate
//! systems, sizes, colors and the overlay record itself.
//!
//! Document units use a top-left origin with y growing downward, the same
//! orientation as display pixels. The two systems differ only by the
//! viewport scale, which is why they are kept as distinct types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for an overlay
///
/// Generated using UUID v4, so independent copies created by
/// "apply to all pages" never collide with their source.
pub type OverlayId = uuid::Uuid;

/// Point in document units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &DocPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Point in on-screen pixels, relative to the rendered page's origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f32,
    pub y: f32,
}

impl DisplayPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Width and height in document units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocSize {
    pub width: f32,
    pub height: f32,
}

impl DocSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Multiply both dimensions by `factor`, flooring each at `min`.
    pub fn scaled(self, factor: f32, min: f32) -> Self {
        Self { width: (self.width * factor).max(min), height: (self.height * factor).max(min) }
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb` for opaque colors, `#rrggbbaa` otherwise.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Parse `#rgb`-style hex strings with 6 or 8 digits, leading `#` optional.
    pub fn from_hex(value: &str) -> Option<Self> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |index: usize| u8::from_str_radix(hex.get(index..index + 2)?, 16).ok();

        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

/// Intrinsic size of a document page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 1-based page number
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
}

impl PageInfo {
    pub fn new(page_number: u32, width: f32, height: f32) -> Self {
        Self { page_number, width, height }
    }

    /// Clamp a top-left position so a box of `size` stays on the page.
    ///
    /// Boxes larger than the page pin to the origin on that axis.
    pub fn clamp_position(&self, position: DocPoint, size: DocSize) -> DocPoint {
        let max_x = (self.width - size.width).max(0.0);
        let max_y = (self.height - size.height).max(0.0);
        DocPoint::new(position.x.clamp(0.0, max_x), position.y.clamp(0.0, max_y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Created but not yet committed to its page's collection
    Draft,
    Saved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextContent {
    pub text: String,
    /// Font size in document units
    pub font_size: f32,
    pub color: Color,
}

impl TextContent {
    pub fn new(text: impl Into<String>, font_size: f32, color: Color) -> Self {
        Self { text: text.into(), font_size, color }
    }
}

/// Where an image overlay's pixels come from
///
/// Equality compares the reference string or the embedded bytes, so two
/// copies of the same signature image are considered identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Opaque reference understood by the processing collaborator
    Reference(String),
    /// Encoded image bytes (PNG, JPEG, ...)
    Embedded(Arc<[u8]>),
}

impl ImageSource {
    pub fn embedded(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Embedded(Arc::from(bytes.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageContent {
    pub source: ImageSource,
    /// 0.0 = transparent, 1.0 = opaque
    pub opacity: f32,
}

impl ImageContent {
    pub fn new(source: ImageSource) -> Self {
        Self { source, opacity: 1.0 }
    }
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    Text(TextContent),
    Image(ImageContent),
}

impl OverlayContent {
    pub fn kind(&self) -> OverlayKind {
        match self {
            OverlayContent::Text(_) => OverlayKind::Text,
            OverlayContent::Image(_) => OverlayKind::Image,
        }
    }
}

/// Wrap a rotation in degrees into [-180, 180].
///
/// Values already inside the range are returned unchanged (so both 180 and
/// -180 survive), everything else is wrapped modulo 360. Non-finite input
/// maps to 0.
pub fn normalize_rotation(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    if (-180.0..=180.0).contains(&degrees) {
        return degrees;
    }

    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    wrapped.clamp(-180.0, 180.0)
}

/// Rotate `point` about `center` by `degrees`, clockwise on screen.
pub fn rotate_about(point: DocPoint, center: DocPoint, degrees: f32) -> DocPoint {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    DocPoint::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos)
}

/// A positioned visual element attached to exactly one page
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    id: OverlayId,
    page_number: u32,
    position: DocPoint,
    size: DocSize,
    rotation: f32,
    content: OverlayContent,
    lifecycle: Lifecycle,
}

impl Overlay {
    /// Create a draft overlay with a fresh ID and no rotation
    pub fn draft(page_number: u32, position: DocPoint, size: DocSize, content: OverlayContent) -> Self {
        Self {
            id: OverlayId::new_v4(),
            page_number,
            position,
            size,
            rotation: 0.0,
            content,
            lifecycle: Lifecycle::Draft,
        }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn kind(&self) -> OverlayKind {
        self.content.kind()
    }

    pub fn position(&self) -> DocPoint {
        self.position
    }

    pub fn set_position(&mut self, position: DocPoint) {
        self.position = position;
    }

    pub fn size(&self) -> DocSize {
        self.size
    }

    pub fn set_size(&mut self, size: DocSize) {
        self.size = size;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = normalize_rotation(degrees);
    }

    pub fn content(&self) -> &OverlayContent {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut OverlayContent {
        &mut self.content
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_draft(&self) -> bool {
        self.lifecycle == Lifecycle::Draft
    }

    /// Consume a draft and return it in saved state, ID preserved
    pub fn into_saved(mut self) -> Self {
        self.lifecycle = Lifecycle::Saved;
        self
    }

    /// Independent saved copy on another page: new ID, same geometry and content
    pub fn copy_to_page(&self, page_number: u32) -> Self {
        Self {
            id: OverlayId::new_v4(),
            page_number,
            lifecycle: Lifecycle::Saved,
            ..self.clone()
        }
    }

    /// Geometric center, the pivot for rotation
    pub fn center(&self) -> DocPoint {
        DocPoint::new(
            self.position.x + self.size.width / 2.0,
            self.position.y + self.size.height / 2.0,
        )
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order, rotated
    pub fn corners(&self) -> [DocPoint; 4] {
        let DocPoint { x, y } = self.position;
        let DocSize { width, height } = self.size;
        let center = self.center();

        [
            DocPoint::new(x, y),
            DocPoint::new(x + width, y),
            DocPoint::new(x + width, y + height),
            DocPoint::new(x, y + height),
        ]
        .map(|corner| rotate_about(corner, center, self.rotation))
    }

    /// Rotation-aware hit test
    ///
    /// The point is rotated into the overlay's local frame about its center
    /// and compared against the unrotated box grown by `tolerance`.
    pub fn contains(&self, point: DocPoint, tolerance: f32) -> bool {
        let center = self.center();
        let local = rotate_about(point, center, -self.rotation);

        (local.x - center.x).abs() <= self.size.width / 2.0 + tolerance
            && (local.y - center.y).abs() <= self.size.height / 2.0 + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_overlay() -> Overlay {
        Overlay::draft(
            1,
            DocPoint::new(100.0, 100.0),
            DocSize::new(100.0, 20.0),
            OverlayContent::Text(TextContent::new("hello", 16.0, Color::BLACK)),
        )
    }

    #[test]
    fn rotation_inside_range_is_untouched() {
        assert_eq!(normalize_rotation(0.0), 0.0);
        assert_eq!(normalize_rotation(180.0), 180.0);
        assert_eq!(normalize_rotation(-180.0), -180.0);
        assert_eq!(normalize_rotation(-45.5), -45.5);
    }

    #[test]
    fn rotation_outside_range_wraps() {
        assert_eq!(normalize_rotation(190.0), -170.0);
        assert_eq!(normalize_rotation(-190.0), 170.0);
        assert_eq!(normalize_rotation(360.0), 0.0);
        assert_eq!(normalize_rotation(725.0), 5.0);
        assert_eq!(normalize_rotation(f32::NAN), 0.0);
        assert_eq!(normalize_rotation(f32::INFINITY), 0.0);
    }

    #[test]
    fn set_rotation_normalizes() {
        let mut overlay = text_overlay();
        overlay.set_rotation(270.0);
        assert_eq!(overlay.rotation(), -90.0);
    }

    #[test]
    fn hit_test_respects_rotation() {
        let mut overlay = text_overlay();
        // Center is (150, 110); a point 40 units below the center misses the flat box.
        let below = DocPoint::new(150.0, 150.0);
        assert!(!overlay.contains(below, 0.0));

        overlay.set_rotation(90.0);
        assert!(overlay.contains(below, 0.0));
        assert!(!overlay.contains(DocPoint::new(195.0, 110.0), 0.0));
    }

    #[test]
    fn corners_rotate_about_center() {
        let mut overlay = text_overlay();
        overlay.set_rotation(180.0);
        let corners = overlay.corners();
        assert!((corners[0].x - 200.0).abs() < 1e-3);
        assert!((corners[0].y - 120.0).abs() < 1e-3);
    }

    #[test]
    fn copy_to_page_gets_new_identity() {
        let original = text_overlay();
        let copy = original.copy_to_page(4);

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.page_number(), 4);
        assert_eq!(copy.lifecycle(), Lifecycle::Saved);
        assert_eq!(copy.position(), original.position());
        assert_eq!(copy.content(), original.content());
        assert!(original.is_draft());
    }

    #[test]
    fn into_saved_keeps_id() {
        let draft = text_overlay();
        let id = draft.id();
        let saved = draft.into_saved();
        assert_eq!(saved.id(), id);
        assert_eq!(saved.lifecycle(), Lifecycle::Saved);
    }

    #[test]
    fn clamp_keeps_box_on_page() {
        let page = PageInfo::new(1, 600.0, 800.0);
        let size = DocSize::new(100.0, 50.0);

        assert_eq!(page.clamp_position(DocPoint::new(-5.0, 900.0), size), DocPoint::new(0.0, 750.0));
        assert_eq!(page.clamp_position(DocPoint::new(550.0, 10.0), size), DocPoint::new(500.0, 10.0));

        let oversize = DocSize::new(700.0, 50.0);
        assert_eq!(page.clamp_position(DocPoint::new(30.0, 10.0), oversize).x, 0.0);
    }

    #[test]
    fn scaled_size_is_floored() {
        let size = DocSize::new(12.0, 100.0).scaled(0.5, 10.0);
        assert_eq!(size, DocSize::new(10.0, 50.0));
    }

    #[test]
    fn color_hex_round_trip() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(Color::from_hex("80808040"), Some(Color::new(128, 128, 128, 64)));
        assert_eq!(Color::from_hex("#12"), None);
        assert_eq!(Color::from_hex("#zzzzzz"), None);
        assert_eq!(Color::rgb(255, 128, 0).to_hex(), "#ff8000");
        assert_eq!(Color::new(1, 2, 3, 4).to_hex(), "#01020304");
    }

    #[test]
    fn embedded_sources_compare_by_bytes() {
        let a = ImageSource::embedded(vec![1, 2, 3]);
        let b = ImageSource::embedded(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, ImageSource::Reference("sig.png".to_owned()));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&OverlayKind::Image).expect("serialize kind");
        assert_eq!(json, "\"image\"");
    }
}
