//! Placement templates and tool presets
//!
//! A template is everything a placement click needs to create a draft:
//! initial content, size and rotation. Presets are named templates for the
//! common tools built on the same engine.

use crate::config::EngineConfig;
use overlay_model::{
    normalize_rotation, Color, DocSize, ImageContent, ImageSource, OverlayContent, OverlayKind, TextContent,
};

pub const PAGE_PLACEHOLDER: &str = "{page}";
pub const PAGE_COUNT_PLACEHOLDER: &str = "{pages}";

/// Blueprint for the next placed overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayTemplate {
    pub content: OverlayContent,
    pub size: DocSize,
    pub rotation: f32,
}

impl OverlayTemplate {
    pub fn new(content: OverlayContent, size: DocSize) -> Self {
        Self { content, size, rotation: 0.0 }
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = normalize_rotation(degrees);
        self
    }

    pub fn kind(&self) -> OverlayKind {
        self.content.kind()
    }

    /// Default text box
    pub fn text(config: &EngineConfig) -> Self {
        Self::new(
            OverlayContent::Text(TextContent::new("Text", config.default_font_size, Color::BLACK)),
            config.default_text_size,
        )
    }

    pub fn image(source: ImageSource, config: &EngineConfig) -> Self {
        Self::new(OverlayContent::Image(ImageContent::new(source)), config.default_image_size)
    }

    /// Template for a bare kind
    ///
    /// Image templates start with an empty reference; the source is
    /// expected to be filled in through the property editor.
    pub fn for_kind(kind: OverlayKind, config: &EngineConfig) -> Self {
        match kind {
            OverlayKind::Text => Self::text(config),
            OverlayKind::Image => Self::image(ImageSource::Reference(String::new()), config),
        }
    }
}

/// Tools that share the overlay engine
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPreset {
    /// Plain text box
    TextEdit,
    /// Large translucent diagonal text
    Watermark,
    /// Signature image
    Signature(ImageSource),
    /// Page counter, e.g. "3 / 12"
    PageNumber,
}

impl ToolPreset {
    pub fn template(&self, config: &EngineConfig) -> OverlayTemplate {
        match self {
            ToolPreset::TextEdit => OverlayTemplate::text(config),
            ToolPreset::Watermark => OverlayTemplate::new(
                OverlayContent::Text(TextContent::new("CONFIDENTIAL", 48.0, Color::new(128, 128, 128, 96))),
                DocSize::new(360.0, 80.0),
            )
            .with_rotation(-45.0),
            ToolPreset::Signature(source) => {
                let mut template = OverlayTemplate::image(source.clone(), config);
                template.size = DocSize::new(180.0, 60.0);
                template
            }
            ToolPreset::PageNumber => OverlayTemplate::new(
                OverlayContent::Text(TextContent::new(
                    format!("{PAGE_PLACEHOLDER} / {PAGE_COUNT_PLACEHOLDER}"),
                    12.0,
                    Color::BLACK,
                )),
                DocSize::new(80.0, 20.0),
            ),
        }
    }
}

/// Substitute page placeholders in overlay text
pub fn expand_placeholders(text: &str, page_number: u32, page_count: u32) -> String {
    if !text.contains('{') {
        return text.to_string();
    }
    text.replace(PAGE_COUNT_PLACEHOLDER, &page_count.to_string())
        .replace(PAGE_PLACEHOLDER, &page_number.to_string())
}
