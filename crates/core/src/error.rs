//! Engine error type

use overlay_pdf::PdfEngineError;

/// Errors surfaced by the overlay engine
///
/// Most interactive operations are infallible no-ops when their
/// preconditions are not met; errors are reserved for rendering,
/// navigation and the export paths.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("page {page} failed to render: {reason}")]
    RenderFailed { page: u32, reason: String },

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("draft overlay pending on page {page}")]
    DraftPending { page: u32 },

    #[error("no font available to rasterize text overlays")]
    MissingFont,

    #[error("image reference {0:?} could not be resolved")]
    UnresolvedImage(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Pdf(#[from] PdfEngineError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
