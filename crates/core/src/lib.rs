//! Overlay Engine Core Library
//!
//! Interactive placement, editing and export of page overlays (text and
//! images) on top of rendered document pages.

pub mod config;
pub mod drag;
pub mod editor;
pub mod engine;
pub mod error;
pub mod export;
pub mod flatten;
pub mod kind;
pub mod preset;
pub mod state;
pub mod store;
pub mod transform;
pub mod viewport;

pub use config::{ConfigError, EngineConfig, PendingDraftPolicy};
pub use drag::{
    generate_handles, place_draft, DragMode, DragSession, GestureEnd, GestureHost, HandleType,
    ListenerGuard, ListenerToken, ManipulationHandle,
};
pub use editor::{EditorFields, PropertyEdit, PropertyEditor};
pub use engine::OverlayEngine;
pub use error::{EngineError, Result};
pub use export::{
    group_overlays, replicate_to_all_pages, submit, CoordinateOrigin, ExportFailure, ExportOptions,
    ExportPayload, OverlayProcessor, PayloadContent, PayloadEntry, ProcessorError,
};
pub use flatten::{flatten_document, flatten_to_pdf, FlattenOptions, FlattenedPage};
pub use kind::{
    ImageHandler, ImageResolver, KindRegistry, NoImages, OverlayKindHandler, RasterContext,
    TextHandler,
};
pub use preset::{expand_placeholders, OverlayTemplate, ToolPreset};
pub use state::EditorState;
pub use store::OverlayStore;
pub use viewport::{fit_scale, ContainerSize, FitMode, RenderState, Viewport, ViewportTracker};

pub use overlay_model as model;
pub use overlay_pdf as pdf;
