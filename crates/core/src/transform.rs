//! Document <-> display coordinate conversion
//!
//! Both systems share a top-left origin with y growing downward, so the
//! mapping is a pure scale. Every function returns `None` when the scale
//! is missing, zero or not finite; callers treat that as "no-op".

use overlay_model::{DisplayPoint, DocPoint};

fn usable(scale: Option<f32>) -> Option<f32> {
    scale.filter(|scale| scale.is_finite() && *scale > 0.0)
}

pub fn to_display(point: DocPoint, scale: Option<f32>) -> Option<DisplayPoint> {
    let scale = usable(scale)?;
    Some(DisplayPoint::new(point.x * scale, point.y * scale))
}

pub fn to_document(point: DisplayPoint, scale: Option<f32>) -> Option<DocPoint> {
    let scale = usable(scale)?;
    Some(DocPoint::new(point.x / scale, point.y / scale))
}

/// Convert a pointer movement in display pixels to document units
pub fn delta_to_document(dx: f32, dy: f32, scale: Option<f32>) -> Option<(f32, f32)> {
    let scale = usable(scale)?;
    Some((dx / scale, dy / scale))
}

/// Length of `pixels` display pixels in document units
pub fn length_to_document(pixels: f32, scale: Option<f32>) -> Option<f32> {
    let scale = usable(scale)?;
    Some(pixels / scale)
}
