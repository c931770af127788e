//! Local flattening
//!
//! Burns saved overlays into page rasters without an external processor:
//! each page is rendered at native resolution (one pixel per document
//! unit), its overlays are painted on top in insertion order and the
//! result is assembled into a new PDF.

use crate::kind::{ImageResolver, KindRegistry, NoImages, RasterContext};
use crate::store::OverlayStore;
use ab_glyph::FontArc;
use overlay_pdf::{assemble_pdf, PageRaster, RenderRequest, RenderSurface};
use tracing::{info, warn};

static NO_IMAGES: NoImages = NoImages;

pub struct FlattenOptions<'a> {
    /// Font for text overlays; required only if the document has any
    pub font: Option<&'a FontArc>,
    pub images: &'a dyn ImageResolver,
}

impl Default for FlattenOptions<'_> {
    fn default() -> Self {
        Self { font: None, images: &NO_IMAGES }
    }
}

impl<'a> FlattenOptions<'a> {
    pub fn with_font(mut self, font: &'a FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_images(mut self, images: &'a dyn ImageResolver) -> Self {
        self.images = images;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FlattenedPage {
    pub page_number: u32,
    pub raster: PageRaster,
}

/// Render every page of `surface` with its saved overlays painted in
pub fn flatten_document(
    surface: &mut dyn RenderSurface,
    store: &OverlayStore,
    registry: &KindRegistry,
    options: &FlattenOptions<'_>,
) -> crate::Result<Vec<FlattenedPage>> {
    let page_count = surface.page_count();
    if let Some(page) = store.pages_with_overlays().find(|page| *page == 0 || *page > page_count) {
        warn!(page, page_count, "overlays on pages outside the document are skipped");
    }

    let mut pages = Vec::with_capacity(page_count as usize);
    for page_number in 1..=page_count {
        let rendered = surface.render_page(RenderRequest::native(page_number))?;
        let mut canvas = rendered.surface;

        let ctx = RasterContext {
            page_number,
            page_count,
            font: options.font,
            images: options.images,
        };
        for overlay in store.saved_on_page(page_number) {
            registry.handler(overlay.kind()).rasterize(overlay, &mut canvas, &ctx)?;
        }

        pages.push(FlattenedPage {
            page_number,
            raster: PageRaster::new(canvas, rendered.intrinsic_width, rendered.intrinsic_height),
        });
    }

    info!(pages = pages.len(), overlays = store.saved_count(), "document flattened");
    Ok(pages)
}

/// Flatten and encode the result as a PDF
pub fn flatten_to_pdf(
    surface: &mut dyn RenderSurface,
    store: &OverlayStore,
    registry: &KindRegistry,
    options: &FlattenOptions<'_>,
) -> crate::Result<Vec<u8>> {
    let pages = flatten_document(surface, store, registry, options)?;
    let rasters: Vec<PageRaster> = pages.into_iter().map(|page| page.raster).collect();
    Ok(assemble_pdf(&rasters)?)
}
