//! Property editor binding
//!
//! Mirrors the editable fields of whichever overlay is the current target
//! (the pending draft or the selected saved overlay). Fields are rehydrated
//! whenever the target identity changes and writes always go straight to
//! the target in the store. Size and rotation writes follow the same rules
//! as the on-page controls: they need the target's page rendered and keep
//! the overlay on its page.

use crate::drag;
use crate::store::OverlayStore;
use crate::viewport::Viewport;
use overlay_model::{Color, DocSize, ImageSource, Overlay, OverlayContent, OverlayId, OverlayKind};
use tracing::debug;

/// Snapshot of the target's editable properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditorFields {
    pub kind: Option<OverlayKind>,
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<Color>,
    pub image: Option<ImageSource>,
    pub opacity: Option<f32>,
    pub rotation: f32,
    pub size: DocSize,
}

impl EditorFields {
    fn from_overlay(overlay: &Overlay) -> Self {
        let mut fields = Self {
            kind: Some(overlay.kind()),
            rotation: overlay.rotation(),
            size: overlay.size(),
            ..Self::default()
        };

        match overlay.content() {
            OverlayContent::Text(text) => {
                fields.text = Some(text.text.clone());
                fields.font_size = Some(text.font_size);
                fields.color = Some(text.color);
            }
            OverlayContent::Image(image) => {
                fields.image = Some(image.source.clone());
                fields.opacity = Some(image.opacity);
            }
        }

        fields
    }
}

/// A single field write
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEdit {
    Text(String),
    FontSize(f32),
    Color(Color),
    Rotation(f32),
    Size(DocSize),
    Image(ImageSource),
    Opacity(f32),
}

#[derive(Debug, Clone)]
pub struct PropertyEditor {
    bound: Option<OverlayId>,
    fields: EditorFields,
    min_size: f32,
}

impl PropertyEditor {
    pub fn new(min_size: f32) -> Self {
        Self { bound: None, fields: EditorFields::default(), min_size }
    }

    pub fn fields(&self) -> &EditorFields {
        &self.fields
    }

    pub fn bound(&self) -> Option<OverlayId> {
        self.bound
    }

    /// Rebind to the store's current target
    ///
    /// Returns `true` if the bound identity changed.
    pub fn sync(&mut self, store: &OverlayStore) -> bool {
        let target = store.target();
        let target_id = target.map(Overlay::id);

        if target_id == self.bound {
            if let Some(overlay) = target {
                self.fields = EditorFields::from_overlay(overlay);
            }
            return false;
        }

        debug!(from = ?self.bound, to = ?target_id, "property editor rebound");
        self.bound = target_id;
        self.fields = target.map(EditorFields::from_overlay).unwrap_or_default();
        true
    }

    /// Write one field to the current target
    ///
    /// Returns `false` without changes when there is no target or the edit
    /// does not apply to the target's kind. Size and rotation edits also
    /// need `viewport` to be the target's rendered page.
    pub fn apply(&mut self, store: &mut OverlayStore, viewport: Option<&Viewport>, edit: PropertyEdit) -> bool {
        self.sync(store);

        let applied = match edit {
            PropertyEdit::Size(size) => drag::resize_to(store, viewport, size, self.min_size),
            PropertyEdit::Rotation(degrees) => drag::set_rotation(store, viewport, degrees),
            edit => match store.target_mut() {
                Some(overlay) => apply_content(overlay.content_mut(), edit),
                None => false,
            },
        };

        if applied {
            self.sync(store);
        }
        applied
    }
}

fn apply_content(content: &mut OverlayContent, edit: PropertyEdit) -> bool {
    match (edit, content) {
        (PropertyEdit::Text(value), OverlayContent::Text(text)) => {
            text.text = value;
            true
        }
        (PropertyEdit::FontSize(size), OverlayContent::Text(text)) if size.is_finite() => {
            text.font_size = size.max(1.0);
            true
        }
        (PropertyEdit::Color(color), OverlayContent::Text(text)) => {
            text.color = color;
            true
        }
        (PropertyEdit::Image(source), OverlayContent::Image(image)) => {
            image.source = source;
            true
        }
        (PropertyEdit::Opacity(opacity), OverlayContent::Image(image)) if opacity.is_finite() => {
            image.opacity = opacity.clamp(0.0, 1.0);
            true
        }
        _ => false,
    }
}
