//! Confirm/export pipeline
//!
//! Saved overlays are grouped by placement identity so an overlay repeated
//! on many pages travels as one payload entry with a page list. The payload
//! is handed to an [`OverlayProcessor`]; on failure it is returned intact
//! inside [`ExportFailure`] so the caller can retry.

use crate::kind::KindRegistry;
use crate::store::OverlayStore;
use overlay_model::{Overlay, OverlayId, OverlayKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Kind-specific content as sent to the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadContent {
    Text {
        text: String,
        font_size: f32,
        /// `#rrggbb` or `#rrggbbaa`
        color: String,
    },
    ImageReference {
        reference: String,
        opacity: f32,
    },
    ImageData {
        /// Base64 of the encoded image bytes
        data: String,
        opacity: f32,
    },
}

/// One placement, possibly repeated on several pages
///
/// Coordinates are document units with a top-left origin and y growing
/// downward; the processor converts to its own convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub kind: OverlayKind,
    pub content: PayloadContent,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    /// Ascending, no duplicates
    pub pages: Vec<u32>,
}

impl PayloadEntry {
    /// Same kind, content, geometry and rotation; pages are ignored
    fn same_placement(&self, other: &PayloadEntry) -> bool {
        self.kind == other.kind
            && self.content == other.content
            && self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.rotation == other.rotation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateOrigin {
    #[default]
    TopLeft,
}

/// Tool-level options forwarded untouched to the processor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExportOptions {
    pub page_count: u32,
    #[serde(default)]
    pub origin: CoordinateOrigin,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExportOptions {
    pub fn new(page_count: u32) -> Self {
        Self { page_count, ..Self::default() }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub overlays: Vec<PayloadEntry>,
    pub options: ExportOptions,
}

impl ExportPayload {
    /// Build from the store's saved overlays; a pending draft is not included
    pub fn build(store: &OverlayStore, registry: &KindRegistry, options: ExportOptions) -> Self {
        let overlays = group_overlays(store.saved(), options.page_count, registry);
        Self { overlays, options }
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Merge overlays sharing placement identity into single entries
///
/// Entries keep first-seen order. Drafts are skipped.
pub fn group_overlays<'a>(
    overlays: impl IntoIterator<Item = &'a Overlay>,
    page_count: u32,
    registry: &KindRegistry,
) -> Vec<PayloadEntry> {
    let mut entries: Vec<PayloadEntry> = Vec::new();

    for overlay in overlays {
        if overlay.is_draft() {
            continue;
        }
        let page = overlay.page_number();
        let position = overlay.position();
        let size = overlay.size();

        let candidate = PayloadEntry {
            kind: overlay.kind(),
            content: registry.handler(overlay.kind()).payload_content(overlay, page, page_count),
            x: position.x,
            y: position.y,
            width: size.width,
            height: size.height,
            rotation: overlay.rotation(),
            pages: vec![page],
        };

        match entries.iter_mut().find(|entry| entry.same_placement(&candidate)) {
            Some(entry) => {
                if let Err(index) = entry.pages.binary_search(&page) {
                    entry.pages.insert(index, page);
                }
            }
            None => entries.push(candidate),
        }
    }

    debug!(entries = entries.len(), "grouped overlays");
    entries
}

/// Copy the current target onto every page of the document
///
/// A pending draft is saved first. Returns the source ID followed by the
/// IDs of the new copies, or nothing when there is no target.
pub fn replicate_to_all_pages(store: &mut OverlayStore, page_count: u32) -> Vec<OverlayId> {
    let source_id = if store.state().draft().is_some() {
        store.save()
    } else {
        store.state().active_id()
    };
    let Some(source) = source_id.and_then(|id| store.get(id)).cloned() else {
        return Vec::new();
    };

    let mut ids = vec![source.id()];
    for page in (1..=page_count).filter(|page| *page != source.page_number()) {
        let copy = source.copy_to_page(page);
        ids.push(copy.id());
        store.insert_saved(copy);
    }

    info!(overlay = %source.id(), copies = ids.len() - 1, "replicated to all pages");
    ids
}

/// Error reported by a processing collaborator
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("processor rejected payload: {0}")]
    Rejected(String),
    #[error("processor unavailable: {0}")]
    Unavailable(String),
}

/// External service that burns a payload into the document
pub trait OverlayProcessor {
    fn process(&mut self, document: &[u8], payload: &ExportPayload) -> Result<Vec<u8>, ProcessorError>;
}

/// Submission failure; carries the payload for a retry
#[derive(Debug, thiserror::Error)]
#[error("export failed: {error}")]
pub struct ExportFailure {
    pub payload: ExportPayload,
    #[source]
    pub error: ProcessorError,
}

/// Send `payload` to `processor`, returning the processed document bytes
pub fn submit(
    processor: &mut dyn OverlayProcessor,
    document: &[u8],
    payload: ExportPayload,
) -> Result<Vec<u8>, ExportFailure> {
    match processor.process(document, &payload) {
        Ok(output) => {
            info!(entries = payload.overlays.len(), bytes = output.len(), "export processed");
            Ok(output)
        }
        Err(error) => {
            warn!(%error, "export failed");
            Err(ExportFailure { payload, error })
        }
    }
}
