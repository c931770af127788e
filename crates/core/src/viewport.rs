//! Viewport scale tracking
//!
//! Keeps the current page's display scale in sync with the render pipeline.
//! A scale is only published once the page has actually been rendered at
//! that scale; while a render is in flight, or after one fails, no viewport
//! is available and every scale-dependent interaction becomes a no-op.

use crate::error::EngineError;
use overlay_model::{DisplayPoint, DocPoint, DocSize, PageInfo};
use overlay_pdf::{RenderRequest, RenderSurface, RenderedPage};
use serde::{Deserialize, Serialize};

/// Tolerance when matching a finished render to the requested scale
const SCALE_EPSILON: f32 = 1e-4;

/// How a page is fitted into its container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Whole page visible
    #[default]
    Page,
    /// Page width matches container width
    Width,
    /// Explicit display pixels per document unit
    Fixed(f32),
}

/// Available display area for the page, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Scale at which a page of the given intrinsic size fills the container
///
/// Returns `None` when either size is degenerate, so callers never see a
/// zero or non-finite scale.
pub fn fit_scale(page_width: f32, page_height: f32, container: ContainerSize, mode: FitMode) -> Option<f32> {
    if !positive(page_width) || !positive(page_height) {
        return None;
    }

    let scale = match mode {
        FitMode::Fixed(scale) => scale,
        FitMode::Width => {
            if !positive(container.width) {
                return None;
            }
            container.width / page_width
        }
        FitMode::Page => {
            if !positive(container.width) || !positive(container.height) {
                return None;
            }
            (container.width / page_width).min(container.height / page_height)
        }
    };

    positive(scale).then_some(scale)
}

/// Geometry of a rendered page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// 1-based page number
    pub page_number: u32,
    /// Intrinsic width in document units
    pub width: f32,
    /// Intrinsic height in document units
    pub height: f32,
    /// Display pixels per document unit
    pub scale: f32,
}

impl Viewport {
    pub fn page_info(&self) -> PageInfo {
        PageInfo::new(self.page_number, self.width, self.height)
    }

    pub fn to_display(&self, point: DocPoint) -> Option<DisplayPoint> {
        crate::transform::to_display(point, Some(self.scale))
    }

    pub fn to_document(&self, point: DisplayPoint) -> Option<DocPoint> {
        crate::transform::to_document(point, Some(self.scale))
    }

    /// Clamp a top-left position so a box of `size` stays on this page
    pub fn clamp(&self, position: DocPoint, size: DocSize) -> DocPoint {
        self.page_info().clamp_position(position, size)
    }
}

/// Render lifecycle of the current page
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Unrendered,
    Rendering { page_number: u32, scale: f32 },
    Ready(Viewport),
    Failed { page_number: u32, reason: String },
}

/// Tracks which page is rendered and at what scale
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    container: ContainerSize,
    fit_mode: FitMode,
    state: RenderState,
    /// Intrinsic size of the last page a render was started for
    last_page: Option<PageInfo>,
}

impl ViewportTracker {
    pub fn new(container: ContainerSize, fit_mode: FitMode) -> Self {
        Self {
            container,
            fit_mode,
            state: RenderState::Unrendered,
            last_page: None,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    /// Viewport of the rendered page, if a render has completed
    pub fn viewport(&self) -> Option<Viewport> {
        match &self.state {
            RenderState::Ready(viewport) => Some(*viewport),
            _ => None,
        }
    }

    /// Viewport only if `page_number` is the page currently rendered
    pub fn viewport_for(&self, page_number: u32) -> Option<Viewport> {
        self.viewport().filter(|viewport| viewport.page_number == page_number)
    }

    /// Forget the rendered page; used on navigation
    pub fn invalidate(&mut self) {
        self.state = RenderState::Unrendered;
    }

    /// Start rendering a page, returning the request to hand to the renderer
    ///
    /// Returns `None` (and leaves the tracker unrendered) when no valid
    /// scale can be derived, e.g. the container has zero size.
    pub fn begin_render(&mut self, page: PageInfo) -> Option<RenderRequest> {
        self.last_page = Some(page);

        let Some(scale) = fit_scale(page.width, page.height, self.container, self.fit_mode) else {
            tracing::warn!(
                page = page.page_number,
                container_width = self.container.width,
                container_height = self.container.height,
                "no usable scale for page"
            );
            self.state = RenderState::Unrendered;
            return None;
        };

        tracing::debug!(page = page.page_number, scale, "render started");
        self.state = RenderState::Rendering { page_number: page.page_number, scale };
        Some(RenderRequest::new(page.page_number, scale))
    }

    /// Publish the viewport of a finished render
    ///
    /// Only the render currently in flight is accepted: a completion for
    /// another page, or for the same page at a scale that has since been
    /// superseded, is stale and ignored.
    pub fn complete_render(&mut self, rendered: &RenderedPage) -> Option<Viewport> {
        match self.state {
            RenderState::Rendering { page_number, scale }
                if page_number == rendered.page_number && (scale - rendered.scale).abs() <= SCALE_EPSILON => {}
            _ => {
                tracing::debug!(page = rendered.page_number, scale = rendered.scale, "ignoring stale render completion");
                return None;
            }
        }

        if !positive(rendered.scale) {
            self.state = RenderState::Failed {
                page_number: rendered.page_number,
                reason: format!("renderer reported scale {}", rendered.scale),
            };
            return None;
        }

        let viewport = Viewport {
            page_number: rendered.page_number,
            width: rendered.intrinsic_width,
            height: rendered.intrinsic_height,
            scale: rendered.scale,
        };
        tracing::debug!(page = viewport.page_number, scale = viewport.scale, "viewport ready");
        self.state = RenderState::Ready(viewport);
        Some(viewport)
    }

    /// Record a failed render. The viewport stays unavailable.
    pub fn fail_render(&mut self, page_number: u32, reason: impl Into<String>) -> EngineError {
        let reason = reason.into();
        tracing::warn!(page = page_number, %reason, "render failed");
        self.state = RenderState::Failed { page_number, reason: reason.clone() };
        EngineError::RenderFailed { page: page_number, reason }
    }

    /// Container changed size; the current page must be re-rendered
    ///
    /// Returns the new render request when a page was rendered or in flight.
    pub fn resize_container(&mut self, container: ContainerSize) -> Option<RenderRequest> {
        self.container = container;

        let page_number = match &self.state {
            RenderState::Unrendered => return None,
            RenderState::Rendering { page_number, .. } => *page_number,
            RenderState::Ready(viewport) => viewport.page_number,
            RenderState::Failed { page_number, .. } => *page_number,
        };

        let page = self.last_page.filter(|page| page.page_number == page_number)?;
        self.begin_render(page)
    }

    /// Drive a full render through `surface`
    pub fn render_with(&mut self, surface: &mut dyn RenderSurface, page_number: u32) -> crate::Result<Viewport> {
        let size = match surface.page_size(page_number) {
            Ok(size) => size,
            Err(err) => return Err(self.fail_render(page_number, err.to_string())),
        };
        let page = PageInfo::new(page_number, size.width_pt, size.height_pt);

        let Some(request) = self.begin_render(page) else {
            return Err(self.fail_render(page_number, "container has no usable size"));
        };

        match surface.render_page(request) {
            Ok(rendered) => self
                .complete_render(&rendered)
                .ok_or_else(|| EngineError::RenderFailed {
                    page: page_number,
                    reason: "render completed with an unusable scale".to_string(),
                }),
            Err(err) => Err(self.fail_render(page_number, err.to_string())),
        }
    }
}
