//! Overlay engine facade
//!
//! Owns the store, the viewport tracker and the property editor, and routes
//! host input to them. All pointer input is in display pixels relative to
//! the rendered page; everything stored is in document units.

use crate::config::{EngineConfig, PendingDraftPolicy};
use crate::drag::{self, DragSession, GestureEnd, GestureHost};
use crate::editor::{EditorFields, PropertyEdit, PropertyEditor};
use crate::error::EngineError;
use crate::export::{self, ExportFailure, ExportOptions, ExportPayload, OverlayProcessor};
use crate::flatten::{self, FlattenOptions};
use crate::kind::{KindRegistry, OverlayKindHandler};
use crate::preset::{OverlayTemplate, ToolPreset};
use crate::state::EditorState;
use crate::store::OverlayStore;
use crate::viewport::{ContainerSize, Viewport, ViewportTracker};
use overlay_model::{DisplayPoint, DocPoint, DocSize, Overlay, OverlayId, OverlayKind};
use overlay_pdf::{RenderRequest, RenderSurface, RenderedPage};
use tracing::{debug, info};

#[derive(Debug)]
pub struct OverlayEngine {
    config: EngineConfig,
    store: OverlayStore,
    tracker: ViewportTracker,
    editor: PropertyEditor,
    registry: KindRegistry,
    page_count: u32,
    current_page: u32,
}

impl OverlayEngine {
    /// Engine for a document of `page_count` pages, starting on page 1
    pub fn new(config: EngineConfig, page_count: u32, container: ContainerSize) -> Self {
        let tracker = ViewportTracker::new(container, config.fit_mode);
        let editor = PropertyEditor::new(config.min_overlay_size);
        info!(page_count, "overlay engine created");

        Self {
            config,
            store: OverlayStore::new(),
            tracker,
            editor,
            registry: KindRegistry::default(),
            page_count,
            current_page: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &OverlayStore {
        &self.store
    }

    pub fn state(&self) -> &EditorState {
        self.store.state()
    }

    pub fn tracker(&self) -> &ViewportTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn register_kind(&mut self, handler: Box<dyn OverlayKindHandler>) {
        self.registry.register(handler);
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Viewport of the current page, once rendered
    pub fn viewport(&self) -> Option<Viewport> {
        self.tracker.viewport_for(self.current_page)
    }

    pub fn editor_fields(&self) -> &EditorFields {
        self.editor.fields()
    }

    /// The pending draft or the selected overlay
    pub fn target(&self) -> Option<&Overlay> {
        self.store.target()
    }

    fn after_change(&mut self) {
        self.editor.sync(&self.store);
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render the current page synchronously through `surface`
    pub fn render(&mut self, surface: &mut dyn RenderSurface) -> crate::Result<Viewport> {
        self.tracker.render_with(surface, self.current_page)
    }

    /// Start an asynchronous render of the current page
    pub fn begin_render(&mut self, width: f32, height: f32) -> Option<RenderRequest> {
        let page = overlay_model::PageInfo::new(self.current_page, width, height);
        self.tracker.begin_render(page)
    }

    pub fn complete_render(&mut self, rendered: &RenderedPage) -> Option<Viewport> {
        self.tracker.complete_render(rendered)
    }

    pub fn fail_render(&mut self, reason: impl Into<String>) -> EngineError {
        self.tracker.fail_render(self.current_page, reason)
    }

    pub fn resize_container(&mut self, container: ContainerSize) -> Option<RenderRequest> {
        self.tracker.resize_container(container)
    }

    /// Switch pages; the new page must be rendered before interaction resumes
    ///
    /// A pending draft is handled according to the configured
    /// [`PendingDraftPolicy`]. A selection is released.
    pub fn navigate_to(&mut self, page_number: u32) -> crate::Result<()> {
        if page_number == 0 || page_number > self.page_count {
            return Err(EngineError::PageOutOfRange { page: page_number, page_count: self.page_count });
        }
        if page_number == self.current_page {
            return Ok(());
        }

        if let Some(draft) = self.store.state().draft() {
            let page = draft.page_number();
            match self.config.pending_draft_policy {
                PendingDraftPolicy::Save => {
                    self.store.save();
                }
                PendingDraftPolicy::Discard => {
                    self.store.discard();
                }
                PendingDraftPolicy::Block => return Err(EngineError::DraftPending { page }),
            }
        }
        self.store.deselect();
        self.store.cancel_placement();

        debug!(from = self.current_page, to = page_number, "navigating");
        self.current_page = page_number;
        self.tracker.invalidate();
        self.after_change();
        Ok(())
    }

    // =========================================================================
    // Placement and selection
    // =========================================================================

    /// Arm placement of a default overlay of `kind`
    pub fn begin_placement(&mut self, kind: OverlayKind) -> bool {
        let mut template = OverlayTemplate::for_kind(kind, &self.config);
        template.size = self.registry.handler(kind).default_size(&self.config);
        self.begin_template(template)
    }

    pub fn begin_preset(&mut self, preset: &ToolPreset) -> bool {
        self.begin_template(preset.template(&self.config))
    }

    pub fn begin_template(&mut self, template: OverlayTemplate) -> bool {
        let armed = self.store.begin_placement(template);
        self.after_change();
        armed
    }

    pub fn cancel_placement(&mut self) -> bool {
        self.store.cancel_placement()
    }

    /// Handle a click on the rendered page
    ///
    /// While placing, the click creates the draft. Otherwise it selects the
    /// topmost saved overlay under the pointer or clears the selection.
    /// Returns the overlay that became the target, if any.
    pub fn click(&mut self, point: DisplayPoint) -> Option<OverlayId> {
        let viewport = self.viewport()?;

        let result = if self.store.state().is_placing() {
            drag::place_draft(&mut self.store, Some(&viewport), point)
        } else {
            let doc = viewport.to_document(point)?;
            match self.store.topmost_at(viewport.page_number, doc, self.config.hit_tolerance, &self.registry) {
                Some(id) if self.store.state().draft().is_some() => {
                    // Clicks on saved overlays are ignored while a draft is pending.
                    self.store.target_id().filter(|draft| *draft == id)
                }
                Some(id) => self.store.select(id).then_some(id),
                None => {
                    self.store.deselect();
                    None
                }
            }
        };

        self.after_change();
        result
    }

    /// Begin a pointer drag
    ///
    /// Grabbing a handle of the target resizes or rotates it; grabbing an
    /// overlay body moves it, selecting saved overlays first.
    pub fn pointer_down<'h>(&mut self, point: DisplayPoint, host: &'h dyn GestureHost) -> Option<DragSession<'h>> {
        let viewport = self.viewport()?;
        let doc = viewport.to_document(point)?;

        let (id, mode) = drag::pick_drag_target(
            &self.store,
            &self.registry,
            &viewport,
            doc,
            self.config.hit_tolerance,
            self.config.handle_size_px,
        )?;

        if self.store.target_id() != Some(id) && !self.store.select(id) {
            return None;
        }
        self.after_change();

        DragSession::begin(&self.store, id, mode, point, self.config.min_overlay_size, host)
    }

    pub fn pointer_move(&mut self, session: &DragSession<'_>, point: DisplayPoint) -> bool {
        let viewport = self.viewport();
        let moved = session.update(&mut self.store, viewport.as_ref(), point);
        if moved {
            self.after_change();
        }
        moved
    }

    pub fn pointer_up(&mut self, session: DragSession<'_>, end: GestureEnd) -> Option<DocPoint> {
        let position = session.finish(&mut self.store, end);
        self.after_change();
        position
    }

    pub fn save(&mut self) -> Option<OverlayId> {
        let id = self.store.save();
        self.after_change();
        id
    }

    pub fn discard(&mut self) -> bool {
        let discarded = self.store.discard().is_some();
        self.after_change();
        discarded
    }

    pub fn select(&mut self, id: OverlayId) -> bool {
        let selected = self.store.select(id);
        self.after_change();
        selected
    }

    pub fn deselect(&mut self) -> bool {
        let deselected = self.store.deselect();
        self.after_change();
        deselected
    }

    pub fn delete(&mut self, id: OverlayId) -> bool {
        let deleted = self.store.delete(id).is_some();
        self.after_change();
        deleted
    }

    /// Delete the draft or the selected overlay
    pub fn delete_selected(&mut self) -> bool {
        let deleted = self.store.delete_target().is_some();
        self.after_change();
        deleted
    }

    // =========================================================================
    // Geometry and properties
    // =========================================================================

    fn target_viewport(&self) -> Option<Viewport> {
        let page = self.store.target()?.page_number();
        self.tracker.viewport_for(page)
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_by(self.config.zoom_in_factor)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_by(self.config.zoom_out_factor)
    }

    fn zoom_by(&mut self, factor: f32) -> bool {
        let viewport = self.target_viewport();
        let zoomed = drag::zoom(&mut self.store, viewport.as_ref(), factor, self.config.min_overlay_size);
        self.after_change();
        zoomed
    }

    pub fn rotate(&mut self, degrees: f32) -> bool {
        let viewport = self.target_viewport();
        let rotated = drag::rotate(&mut self.store, viewport.as_ref(), degrees);
        self.after_change();
        rotated
    }

    pub fn resize_to(&mut self, size: DocSize) -> bool {
        let viewport = self.target_viewport();
        let resized = drag::resize_to(&mut self.store, viewport.as_ref(), size, self.config.min_overlay_size);
        self.after_change();
        resized
    }

    /// Write a property of the target
    ///
    /// Size and rotation go through the same page check and clamp as the
    /// on-page controls.
    pub fn edit(&mut self, edit: PropertyEdit) -> bool {
        let viewport = self.target_viewport();
        self.editor.apply(&mut self.store, viewport.as_ref(), edit)
    }

    // =========================================================================
    // Confirm and export
    // =========================================================================

    /// Copy the target to every page, saving a pending draft first
    pub fn replicate_to_all_pages(&mut self) -> Vec<OverlayId> {
        let ids = export::replicate_to_all_pages(&mut self.store, self.page_count);
        self.after_change();
        ids
    }

    /// Grouped payload of all saved overlays; a pending draft is left out
    pub fn export_payload(&self, options: ExportOptions) -> ExportPayload {
        ExportPayload::build(&self.store, &self.registry, options)
    }

    /// Default options for this document
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::new(self.page_count)
    }

    /// Build the payload and hand it to `processor`
    ///
    /// The payload is built from a snapshot, so edits made afterwards do not
    /// affect it. On failure nothing in the engine changes.
    pub fn submit_export(
        &self,
        processor: &mut dyn OverlayProcessor,
        document: &[u8],
        options: ExportOptions,
    ) -> Result<Vec<u8>, ExportFailure> {
        export::submit(processor, document, self.export_payload(options))
    }

    /// Burn saved overlays into a new PDF locally
    pub fn flatten(
        &self,
        surface: &mut dyn RenderSurface,
        options: &FlattenOptions<'_>,
    ) -> crate::Result<Vec<u8>> {
        flatten::flatten_to_pdf(surface, &self.store, &self.registry, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drag::ListenerToken;
    use overlay_pdf::{assemble_pdf, LopdfSurface, PageRaster};

    struct NullHost;

    impl GestureHost for NullHost {
        fn attach_listeners(&self) -> ListenerToken {
            ListenerToken(0)
        }

        fn detach_listeners(&self, _token: ListenerToken) {}
    }

    fn surface(pages: usize) -> LopdfSurface {
        let rasters = vec![PageRaster::blank(600.0, 800.0); pages];
        LopdfSurface::open(assemble_pdf(&rasters).unwrap()).unwrap()
    }

    fn rendered_engine(config: EngineConfig, pages: usize) -> (OverlayEngine, LopdfSurface) {
        let mut surface = surface(pages);
        let mut engine = OverlayEngine::new(config, pages as u32, ContainerSize::new(600.0, 800.0));
        engine.render(&mut surface).unwrap();
        (engine, surface)
    }

    #[test]
    fn nothing_happens_before_render() {
        let mut engine = OverlayEngine::new(EngineConfig::default(), 1, ContainerSize::new(600.0, 800.0));
        engine.begin_placement(OverlayKind::Text);

        assert!(engine.click(DisplayPoint::new(10.0, 10.0)).is_none());
        assert!(engine.state().is_placing());
    }

    #[test]
    fn editor_follows_target() {
        let (mut engine, _) = rendered_engine(EngineConfig::default(), 1);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(10.0, 10.0)).unwrap();
        assert_eq!(engine.editor_fields().text.as_deref(), Some("Text"));

        assert!(engine.edit(PropertyEdit::Text("Paid".to_string())));
        let id = engine.save().unwrap();
        assert_eq!(engine.editor_fields(), &EditorFields::default());

        assert!(engine.select(id));
        assert_eq!(engine.editor_fields().text.as_deref(), Some("Paid"));
    }

    #[test]
    fn click_selects_and_clears() {
        let (mut engine, _) = rendered_engine(EngineConfig::default(), 1);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(100.0, 100.0));
        let id = engine.save().unwrap();

        assert_eq!(engine.click(DisplayPoint::new(120.0, 110.0)), Some(id));
        assert_eq!(engine.state().active_id(), Some(id));

        assert_eq!(engine.click(DisplayPoint::new(500.0, 700.0)), None);
        assert!(engine.state().is_idle());
    }

    #[test]
    fn saved_overlays_ignore_clicks_while_draft_pending() {
        let (mut engine, _) = rendered_engine(EngineConfig::default(), 1);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(100.0, 100.0));
        engine.save();

        engine.begin_placement(OverlayKind::Text);
        let draft = engine.click(DisplayPoint::new(300.0, 300.0)).unwrap();

        assert_eq!(engine.click(DisplayPoint::new(120.0, 110.0)), None);
        assert_eq!(engine.store().target_id(), Some(draft));
        assert!(engine.pointer_down(DisplayPoint::new(120.0, 110.0), &NullHost).is_none());
    }

    #[test]
    fn navigation_policies() {
        let (mut engine, _) = rendered_engine(EngineConfig::default(), 2);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(10.0, 10.0));
        engine.navigate_to(2).unwrap();
        assert_eq!(engine.store().saved_on_page(1).len(), 1);
        assert!(engine.viewport().is_none());

        let config = EngineConfig::default().with_pending_draft_policy(PendingDraftPolicy::Block);
        let (mut engine, _) = rendered_engine(config, 2);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(10.0, 10.0));
        assert!(matches!(engine.navigate_to(2), Err(EngineError::DraftPending { page: 1 })));
        assert_eq!(engine.current_page(), 1);

        let config = EngineConfig::default().with_pending_draft_policy(PendingDraftPolicy::Discard);
        let (mut engine, _) = rendered_engine(config, 2);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(10.0, 10.0));
        engine.navigate_to(2).unwrap();
        assert_eq!(engine.store().saved_count(), 0);

        assert!(matches!(engine.navigate_to(3), Err(EngineError::PageOutOfRange { page: 3, .. })));
    }

    #[test]
    fn geometry_ops_need_the_overlays_page_rendered() {
        let (mut engine, mut surface) = rendered_engine(EngineConfig::default(), 2);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(10.0, 10.0));
        let id = engine.save().unwrap();
        engine.select(id);
        assert!(engine.zoom_in());

        engine.navigate_to(2).unwrap();
        engine.render(&mut surface).unwrap();
        // Selection was released on navigation; reselecting the page-1
        // overlay works but it cannot be resized from page 2.
        assert!(engine.select(id));
        assert!(!engine.zoom_out());
        assert!(!engine.rotate(10.0));
        assert!(!engine.edit(PropertyEdit::Rotation(10.0)));
        assert!(engine.edit(PropertyEdit::Text("Moved".to_string())));
    }

    #[test]
    fn size_edit_is_clamped_and_needs_its_page_rendered() {
        let (mut engine, mut surface) = rendered_engine(EngineConfig::default(), 2);
        engine.begin_placement(OverlayKind::Text);
        engine.click(DisplayPoint::new(440.0, 750.0));
        let id = engine.save().unwrap();

        engine.navigate_to(2).unwrap();
        engine.render(&mut surface).unwrap();
        assert!(engine.select(id));
        assert!(!engine.edit(PropertyEdit::Size(DocSize::new(400.0, 400.0))));
        assert_eq!(engine.store().get(id).unwrap().size(), DocSize::new(150.0, 40.0));

        engine.navigate_to(1).unwrap();
        engine.render(&mut surface).unwrap();
        assert!(engine.select(id));
        assert!(engine.edit(PropertyEdit::Size(DocSize::new(400.0, 400.0))));

        let overlay = engine.store().get(id).unwrap();
        assert_eq!(overlay.size(), DocSize::new(400.0, 400.0));
        assert_eq!(overlay.position(), DocPoint::new(200.0, 400.0));
        assert_eq!(engine.editor_fields().size, DocSize::new(400.0, 400.0));
    }
}
