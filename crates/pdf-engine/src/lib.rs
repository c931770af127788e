//! Render surface and document assembly for the overlay engine
//!
//! The engine never decodes documents itself. It asks a [`RenderSurface`]
//! for page rasters and intrinsic sizes, and hands flattened page rasters
//! to [`assemble_pdf`] when the local export path is used.

pub mod assemble;

pub use assemble::{assemble_pdf, PageRaster};

use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Intrinsic page size in document units (PDF points)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based page number
    pub page_number: u32,
    /// Display pixels per document unit
    pub scale: f32,
}

impl RenderRequest {
    pub fn new(page_number: u32, scale: f32) -> Self {
        Self { page_number, scale }
    }

    /// Native resolution: one pixel per document unit
    pub fn native(page_number: u32) -> Self {
        Self { page_number, scale: 1.0 }
    }
}

/// Output of a successful page render
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_number: u32,
    pub surface: RgbaImage,
    pub intrinsic_width: f32,
    pub intrinsic_height: f32,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Contract the overlay engine needs from a renderer
pub trait RenderSurface {
    fn page_count(&self) -> u32;

    /// Intrinsic size of a 1-based page
    fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError>;

    fn render_page(&mut self, request: RenderRequest) -> Result<RenderedPage, PdfEngineError>;
}

/// lopdf-backed surface for fixtures and tests
///
/// Reads page geometry from each page's MediaBox. lopdf has no rasterizer,
/// so pages render as blank paper with a grey hairline border, and that
/// border ends up in any document flattened through this surface. Real
/// page content needs a host rasterizer implementing [`RenderSurface`].
#[derive(Debug, Clone)]
pub struct LopdfSurface {
    page_sizes: Vec<PageSize>,
}

impl LopdfSurface {
    pub fn open(source: impl Into<OpenSource>) -> Result<Self, PdfEngineError> {
        let bytes = match source.into() {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;
        tracing::debug!(pages = page_sizes.len(), "opened document");

        Ok(Self { page_sizes })
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(PageSize { width_pt: 612.0, height_pt: 792.0 });

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }
}

impl RenderSurface for LopdfSurface {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .copied()
            .ok_or(PdfEngineError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count(),
            })
    }

    fn render_page(&mut self, request: RenderRequest) -> Result<RenderedPage, PdfEngineError> {
        let page_size = self.page_size(request.page_number)?;
        let scale = request.scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PdfEngineError::InvalidScale(scale));
        }

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;

        let mut surface = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                surface.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                surface.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                surface.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                surface.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(RenderedPage {
            page_number: request.page_number,
            surface,
            intrinsic_width: page_size.width_pt,
            intrinsic_height: page_size.height_pt,
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_page_pdf() -> Vec<u8> {
        let pages = [
            PageRaster::blank(600.0, 800.0),
            PageRaster::blank(300.0, 200.0),
        ];
        assemble_pdf(&pages).expect("assembly should succeed")
    }

    #[test]
    fn opens_pdf_and_reads_page_sizes() {
        let surface = LopdfSurface::open(two_page_pdf()).expect("open should succeed");

        assert_eq!(surface.page_count(), 2);
        let second = surface.page_size(2).expect("page 2 exists");
        assert_eq!(second, PageSize { width_pt: 300.0, height_pt: 200.0 });
    }

    #[test]
    fn render_scales_raster_dimensions() {
        let mut surface = LopdfSurface::open(two_page_pdf()).expect("open should succeed");

        let page = surface.render_page(RenderRequest::new(1, 0.8)).expect("render should succeed");
        assert_eq!(page.surface.width(), 480);
        assert_eq!(page.surface.height(), 640);
        assert_eq!(page.intrinsic_width, 600.0);
        assert_eq!(page.scale, 0.8);
    }

    #[test]
    fn render_draws_placeholder_border() {
        let mut surface = LopdfSurface::open(two_page_pdf()).expect("open should succeed");

        let page = surface.render_page(RenderRequest::native(2)).expect("render should succeed");
        assert_eq!(page.surface.get_pixel(0, 0), &Rgba([220, 220, 220, 255]));
        assert_eq!(page.surface.get_pixel(299, 100), &Rgba([220, 220, 220, 255]));
        assert_eq!(page.surface.get_pixel(150, 100), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn page_numbers_are_one_based() {
        let surface = LopdfSurface::open(two_page_pdf()).expect("open should succeed");

        let err = surface.page_size(0).expect_err("page 0 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 0, page_count: 2 }));
        assert!(surface.page_size(3).is_err());
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut surface = LopdfSurface::open(two_page_pdf()).expect("open should succeed");

        let err = surface.render_page(RenderRequest::new(1, 0.0)).expect_err("zero scale");
        assert!(matches!(err, PdfEngineError::InvalidScale(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let result = LopdfSurface::open(b"not a pdf".to_vec());
        assert!(matches!(result, Err(PdfEngineError::Pdf(_))));
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        let result = LopdfSurface::open(b"%PDF-1.4 /Encrypt".to_vec());
        assert!(matches!(result, Err(PdfEngineError::EncryptedUnsupported)));
    }
}
