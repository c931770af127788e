//! Placement and drag controller
//!
//! Turns pointer input in display pixels into overlay geometry in document
//! units. Every operation needs the viewport of the page the overlay lives
//! on; without it the operation does nothing.
//!
//! A drag holds its host listeners through a [`ListenerGuard`], so the
//! listeners are detached however the session ends, including when it is
//! simply dropped.

use crate::kind::KindRegistry;
use crate::store::OverlayStore;
use crate::transform;
use crate::viewport::Viewport;
use overlay_model::{rotate_about, DisplayPoint, DocPoint, DocSize, Overlay, OverlayId};
use tracing::{debug, trace};

/// Distance from the top edge to the rotation knob, in display pixels
const ROTATE_HANDLE_OFFSET_PX: f32 = 24.0;

/// Type of manipulation handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    /// Knob above the top edge
    Rotate,
}

#[derive(Debug, Clone, Copy)]
pub struct ManipulationHandle {
    pub handle_type: HandleType,
    /// Position in document units
    pub position: DocPoint,
    /// Radius of the hit area in document units
    pub size: f32,
    pub overlay_id: OverlayId,
}

impl ManipulationHandle {
    pub fn hit_test(&self, point: DocPoint, tolerance: f32) -> bool {
        point.distance_to(&self.position) <= self.size + tolerance
    }
}

/// Handles for an overlay at the given display scale
///
/// Handle sizes are fixed in display pixels, so their document-unit size
/// shrinks as the page is zoomed in.
pub fn generate_handles(overlay: &Overlay, handle_size_px: f32, scale: f32) -> Vec<ManipulationHandle> {
    let (Some(size), Some(offset)) = (
        transform::length_to_document(handle_size_px, Some(scale)),
        transform::length_to_document(ROTATE_HANDLE_OFFSET_PX, Some(scale)),
    ) else {
        return Vec::new();
    };

    let overlay_id = overlay.id();
    let [top_left, top_right, bottom_right, bottom_left] = overlay.corners();
    let position = overlay.position();
    let knob = rotate_about(
        DocPoint::new(position.x + overlay.size().width / 2.0, position.y - offset),
        overlay.center(),
        overlay.rotation(),
    );

    [
        (HandleType::TopLeft, top_left),
        (HandleType::TopRight, top_right),
        (HandleType::BottomRight, bottom_right),
        (HandleType::BottomLeft, bottom_left),
        (HandleType::Rotate, knob),
    ]
    .into_iter()
    .map(|(handle_type, position)| ManipulationHandle { handle_type, position, size, overlay_id })
    .collect()
}

/// Opaque token identifying attached pointer listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub u64);

/// Host UI that delivers global pointer move/up events during a drag
pub trait GestureHost {
    fn attach_listeners(&self) -> ListenerToken;
    fn detach_listeners(&self, token: ListenerToken);
}

/// Detaches host listeners when dropped
pub struct ListenerGuard<'h> {
    host: &'h dyn GestureHost,
    token: Option<ListenerToken>,
}

impl<'h> ListenerGuard<'h> {
    pub fn attach(host: &'h dyn GestureHost) -> Self {
        let token = host.attach_listeners();
        trace!(token = token.0, "pointer listeners attached");
        Self { host, token: Some(token) }
    }

    pub fn is_attached(&self) -> bool {
        self.token.is_some()
    }

    /// Detach now instead of at drop
    pub fn release(&mut self) {
        if let Some(token) = self.token.take() {
            self.host.detach_listeners(token);
            trace!(token = token.0, "pointer listeners detached");
        }
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("token", &self.token).finish()
    }
}

/// How a gesture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEnd {
    /// Pointer released normally
    Release,
    /// Gesture aborted; geometry returns to where the drag started
    Cancel,
    /// Window lost focus mid-drag; geometry stays where it was
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(HandleType),
    Rotate,
}

/// Geometry of an overlay at the moment a drag began
#[derive(Debug, Clone, Copy, PartialEq)]
struct StartGeometry {
    position: DocPoint,
    size: DocSize,
    rotation: f32,
}

/// In-progress pointer drag on one overlay
///
/// The session only remembers the overlay's ID and starting geometry; the
/// store is passed in on every update so nothing is borrowed across events.
#[derive(Debug)]
pub struct DragSession<'h> {
    overlay_id: OverlayId,
    page_number: u32,
    mode: DragMode,
    start_pointer: DisplayPoint,
    start: StartGeometry,
    min_size: f32,
    guard: ListenerGuard<'h>,
}

impl<'h> DragSession<'h> {
    /// Start a drag on `overlay_id`, attaching listeners on `host`
    pub fn begin(
        store: &OverlayStore,
        overlay_id: OverlayId,
        mode: DragMode,
        pointer: DisplayPoint,
        min_size: f32,
        host: &'h dyn GestureHost,
    ) -> Option<Self> {
        let overlay = store.get(overlay_id)?;
        let start = StartGeometry {
            position: overlay.position(),
            size: overlay.size(),
            rotation: overlay.rotation(),
        };

        debug!(overlay = %overlay_id, ?mode, "drag started");
        Some(Self {
            overlay_id,
            page_number: overlay.page_number(),
            mode,
            start_pointer: pointer,
            start,
            min_size,
            guard: ListenerGuard::attach(host),
        })
    }

    pub fn overlay_id(&self) -> OverlayId {
        self.overlay_id
    }

    pub fn mode(&self) -> DragMode {
        self.mode
    }

    pub fn listeners_attached(&self) -> bool {
        self.guard.is_attached()
    }

    /// Apply the pointer's current position
    ///
    /// Returns `false` (leaving the overlay untouched) when the viewport is
    /// missing or belongs to another page, or the overlay is gone.
    pub fn update(&self, store: &mut OverlayStore, viewport: Option<&Viewport>, pointer: DisplayPoint) -> bool {
        let Some(viewport) = viewport.filter(|viewport| viewport.page_number == self.page_number) else {
            trace!(overlay = %self.overlay_id, "drag update without viewport");
            return false;
        };
        let Some((dx, dy)) = transform::delta_to_document(
            pointer.x - self.start_pointer.x,
            pointer.y - self.start_pointer.y,
            Some(viewport.scale),
        ) else {
            return false;
        };
        let Some(overlay) = store.get_mut(self.overlay_id) else {
            return false;
        };

        match self.mode {
            DragMode::Move => {
                let target = self.start.position.offset(dx, dy);
                overlay.set_position(viewport.clamp(target, overlay.size()));
            }
            DragMode::Resize(handle) => {
                let (position, size) = self.resized(handle, dx, dy);
                overlay.set_size(size);
                overlay.set_position(viewport.clamp(position, size));
            }
            DragMode::Rotate => {
                let Some(pointer) = viewport.to_document(pointer) else {
                    return false;
                };
                let center = DocPoint::new(
                    self.start.position.x + self.start.size.width / 2.0,
                    self.start.position.y + self.start.size.height / 2.0,
                );
                // Knob straight above the center is 0 degrees, clockwise positive.
                let angle = (pointer.y - center.y).atan2(pointer.x - center.x).to_degrees() + 90.0;
                overlay.set_rotation(angle);
            }
        }
        true
    }

    /// Box after dragging a corner by (`dx`, `dy`)
    ///
    /// The movement is taken into the overlay's unrotated frame and the
    /// opposite corner stays put in that frame.
    fn resized(&self, handle: HandleType, dx: f32, dy: f32) -> (DocPoint, DocSize) {
        let local = rotate_about(DocPoint::new(dx, dy), DocPoint::default(), -self.start.rotation);
        let DocPoint { x, y } = self.start.position;
        let DocSize { width, height } = self.start.size;
        let min = self.min_size;

        let (left, right) = match handle {
            HandleType::TopLeft | HandleType::BottomLeft => ((x + local.x).min(x + width - min), x + width),
            HandleType::TopRight | HandleType::BottomRight => (x, (x + width + local.x).max(x + min)),
            HandleType::Rotate => (x, x + width),
        };
        let (top, bottom) = match handle {
            HandleType::TopLeft | HandleType::TopRight => ((y + local.y).min(y + height - min), y + height),
            HandleType::BottomLeft | HandleType::BottomRight => (y, (y + height + local.y).max(y + min)),
            HandleType::Rotate => (y, y + height),
        };

        (DocPoint::new(left, top), DocSize::new(right - left, bottom - top))
    }

    /// End the drag; listeners are detached whatever the outcome
    ///
    /// Returns the overlay's final position, or `None` if it no longer exists.
    pub fn finish(mut self, store: &mut OverlayStore, end: GestureEnd) -> Option<DocPoint> {
        self.guard.release();
        let overlay = store.get_mut(self.overlay_id)?;

        if end == GestureEnd::Cancel {
            overlay.set_position(self.start.position);
            overlay.set_size(self.start.size);
            overlay.set_rotation(self.start.rotation);
        }

        debug!(overlay = %self.overlay_id, ?end, "drag finished");
        Some(overlay.position())
    }
}

/// Create a draft from the armed template at a placement click
///
/// The click becomes the overlay's top-left corner, clamped so the box
/// stays on the page.
pub fn place_draft(store: &mut OverlayStore, viewport: Option<&Viewport>, click: DisplayPoint) -> Option<OverlayId> {
    let viewport = viewport?;
    let template = store.state().template()?.clone();
    let point = viewport.to_document(click)?;

    let position = viewport.clamp(point, template.size);
    let mut draft = Overlay::draft(viewport.page_number, position, template.size, template.content);
    draft.set_rotation(template.rotation);
    let id = draft.id();

    if !store.create_draft(draft) {
        return None;
    }
    debug!(overlay = %id, page = viewport.page_number, x = position.x, y = position.y, "draft placed");
    Some(id)
}

/// Multiply the target's size by `factor`, flooring at `min_size`
///
/// The top-left corner stays fixed unless the larger box would leave the
/// page, in which case it is pulled back on.
pub fn zoom(store: &mut OverlayStore, viewport: Option<&Viewport>, factor: f32, min_size: f32) -> bool {
    if !factor.is_finite() || factor <= 0.0 {
        return false;
    }
    let Some(overlay) = store.target_mut() else {
        return false;
    };
    let Some(viewport) = viewport.filter(|viewport| viewport.page_number == overlay.page_number()) else {
        return false;
    };

    let size = overlay.size().scaled(factor, min_size);
    overlay.set_size(size);
    overlay.set_position(viewport.clamp(overlay.position(), size));
    true
}

/// Add `degrees` to the target's rotation
pub fn rotate(store: &mut OverlayStore, viewport: Option<&Viewport>, degrees: f32) -> bool {
    let Some(current) = store.target().map(Overlay::rotation) else {
        return false;
    };
    set_rotation(store, viewport, current + degrees)
}

/// Set the target's rotation to `degrees`, normalized
pub fn set_rotation(store: &mut OverlayStore, viewport: Option<&Viewport>, degrees: f32) -> bool {
    let Some(overlay) = store.target_mut() else {
        return false;
    };
    if viewport.filter(|viewport| viewport.page_number == overlay.page_number()).is_none() {
        return false;
    }

    overlay.set_rotation(degrees);
    true
}

/// Resize the target to an explicit size, floored at `min_size`
pub fn resize_to(store: &mut OverlayStore, viewport: Option<&Viewport>, size: DocSize, min_size: f32) -> bool {
    if !size.width.is_finite() || !size.height.is_finite() {
        return false;
    }
    let Some(overlay) = store.target_mut() else {
        return false;
    };
    let Some(viewport) = viewport.filter(|viewport| viewport.page_number == overlay.page_number()) else {
        return false;
    };

    let size = DocSize::new(size.width.max(min_size), size.height.max(min_size));
    overlay.set_size(size);
    overlay.set_position(viewport.clamp(overlay.position(), size));
    true
}

/// Which drag a pointer-down at `point` starts
///
/// Handles of the current target win, then the topmost overlay under the
/// point. Saved overlays are only draggable when no draft is pending.
pub fn pick_drag_target(
    store: &OverlayStore,
    registry: &KindRegistry,
    viewport: &Viewport,
    point: DocPoint,
    tolerance: f32,
    handle_size_px: f32,
) -> Option<(OverlayId, DragMode)> {
    if let Some(target) = store.target().filter(|target| target.page_number() == viewport.page_number) {
        let handle = generate_handles(target, handle_size_px, viewport.scale)
            .into_iter()
            .find(|handle| handle.hit_test(point, 0.0));
        if let Some(handle) = handle {
            let mode = match handle.handle_type {
                HandleType::Rotate => DragMode::Rotate,
                corner => DragMode::Resize(corner),
            };
            return Some((target.id(), mode));
        }
    }

    let hit = store.topmost_at(viewport.page_number, point, tolerance, registry)?;
    let draft_pending = store.state().draft().is_some();
    if draft_pending && store.state().draft().map(Overlay::id) != Some(hit) {
        return None;
    }
    Some((hit, DragMode::Move))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::preset::OverlayTemplate;
    use overlay_model::OverlayKind;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingHost {
        next: Cell<u64>,
        attached: RefCell<Vec<ListenerToken>>,
    }

    impl GestureHost for RecordingHost {
        fn attach_listeners(&self) -> ListenerToken {
            let token = ListenerToken(self.next.get());
            self.next.set(token.0 + 1);
            self.attached.borrow_mut().push(token);
            token
        }

        fn detach_listeners(&self, token: ListenerToken) {
            self.attached.borrow_mut().retain(|attached| *attached != token);
        }
    }

    fn viewport(scale: f32) -> Viewport {
        Viewport { page_number: 1, width: 600.0, height: 800.0, scale }
    }

    fn placing_store() -> OverlayStore {
        let mut store = OverlayStore::new();
        store.begin_placement(OverlayTemplate::for_kind(OverlayKind::Text, &EngineConfig::default()));
        store
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn placement_converts_click_to_document_units() {
        let mut store = placing_store();
        let vp = viewport(0.8);

        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(240.0, 160.0)).unwrap();
        let draft = store.get(id).unwrap();
        assert!(draft.is_draft());
        assert!(approx(draft.position().x, 300.0));
        assert!(approx(draft.position().y, 200.0));
        assert_eq!(draft.size(), DocSize::new(150.0, 40.0));
    }

    #[test]
    fn placement_without_viewport_is_a_no_op() {
        let mut store = placing_store();
        assert!(place_draft(&mut store, None, DisplayPoint::new(10.0, 10.0)).is_none());
        assert!(store.state().is_placing());
    }

    #[test]
    fn placement_near_edge_is_clamped() {
        let mut store = placing_store();
        let id = place_draft(&mut store, Some(&viewport(1.0)), DisplayPoint::new(590.0, 795.0)).unwrap();
        assert_eq!(store.get(id).unwrap().position(), DocPoint::new(450.0, 760.0));
    }

    #[test]
    fn move_drag_scales_delta_and_detaches_on_release() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let vp = viewport(0.8);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(240.0, 160.0)).unwrap();

        let start = DisplayPoint::new(250.0, 170.0);
        let session = DragSession::begin(&store, id, DragMode::Move, start, 10.0, &host).unwrap();
        assert_eq!(host.attached.borrow().len(), 1);

        assert!(session.update(&mut store, Some(&vp), DisplayPoint::new(298.0, 186.0)));
        let position = session.finish(&mut store, GestureEnd::Release).unwrap();

        assert!(approx(position.x, 360.0));
        assert!(approx(position.y, 220.0));
        assert!(host.attached.borrow().is_empty());
    }

    #[test]
    fn dropped_session_detaches_listeners() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let id = place_draft(&mut store, Some(&viewport(1.0)), DisplayPoint::new(10.0, 10.0)).unwrap();

        {
            let _session = DragSession::begin(&store, id, DragMode::Move, DisplayPoint::new(0.0, 0.0), 10.0, &host);
            assert_eq!(host.attached.borrow().len(), 1);
        }
        assert!(host.attached.borrow().is_empty());
    }

    #[test]
    fn cancel_restores_start_geometry() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(100.0, 100.0)).unwrap();

        let session = DragSession::begin(&store, id, DragMode::Move, DisplayPoint::new(110.0, 110.0), 10.0, &host).unwrap();
        session.update(&mut store, Some(&vp), DisplayPoint::new(200.0, 300.0));
        let position = session.finish(&mut store, GestureEnd::Cancel).unwrap();

        assert_eq!(position, DocPoint::new(100.0, 100.0));
        assert!(host.attached.borrow().is_empty());
    }

    #[test]
    fn update_on_another_page_is_ignored() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let id = place_draft(&mut store, Some(&viewport(1.0)), DisplayPoint::new(100.0, 100.0)).unwrap();

        let session = DragSession::begin(&store, id, DragMode::Move, DisplayPoint::new(0.0, 0.0), 10.0, &host).unwrap();
        let other_page = Viewport { page_number: 2, ..viewport(1.0) };
        assert!(!session.update(&mut store, Some(&other_page), DisplayPoint::new(50.0, 50.0)));
        assert!(!session.update(&mut store, None, DisplayPoint::new(50.0, 50.0)));
        assert_eq!(store.get(id).unwrap().position(), DocPoint::new(100.0, 100.0));
    }

    #[test]
    fn drag_is_clamped_to_page() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(100.0, 100.0)).unwrap();

        let session = DragSession::begin(&store, id, DragMode::Move, DisplayPoint::new(0.0, 0.0), 10.0, &host).unwrap();
        session.update(&mut store, Some(&vp), DisplayPoint::new(-500.0, 5000.0));
        assert_eq!(store.get(id).unwrap().position(), DocPoint::new(0.0, 760.0));
    }

    #[test]
    fn corner_resize_keeps_opposite_corner() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(100.0, 100.0)).unwrap();

        let session = DragSession::begin(
            &store,
            id,
            DragMode::Resize(HandleType::TopLeft),
            DisplayPoint::new(100.0, 100.0),
            10.0,
            &host,
        )
        .unwrap();
        session.update(&mut store, Some(&vp), DisplayPoint::new(80.0, 90.0));

        let overlay = store.get(id).unwrap();
        assert_eq!(overlay.position(), DocPoint::new(80.0, 90.0));
        assert_eq!(overlay.size(), DocSize::new(170.0, 50.0));

        // Collapsing past the opposite corner stops at the minimum size.
        session.update(&mut store, Some(&vp), DisplayPoint::new(400.0, 400.0));
        assert_eq!(store.get(id).unwrap().size(), DocSize::new(10.0, 10.0));
    }

    #[test]
    fn rotate_drag_follows_pointer_angle() {
        let host = RecordingHost::default();
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(100.0, 100.0)).unwrap();
        // Center of the 150x40 box is (175, 120).

        let session = DragSession::begin(&store, id, DragMode::Rotate, DisplayPoint::new(175.0, 76.0), 10.0, &host).unwrap();
        session.update(&mut store, Some(&vp), DisplayPoint::new(275.0, 120.0));
        assert!(approx(store.get(id).unwrap().rotation(), 90.0));
    }

    #[test]
    fn zoom_scales_with_floor_and_needs_viewport() {
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(0.0, 0.0)).unwrap();

        assert!(!zoom(&mut store, None, 1.1, 10.0));
        assert!(zoom(&mut store, Some(&vp), 1.1, 10.0));
        let size = store.get(id).unwrap().size();
        assert!(approx(size.width, 165.0));
        assert!(approx(size.height, 44.0));

        for _ in 0..100 {
            zoom(&mut store, Some(&vp), 0.9, 10.0);
        }
        assert_eq!(store.get(id).unwrap().size(), DocSize::new(10.0, 10.0));
    }

    #[test]
    fn rotate_accumulates_and_normalizes() {
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(0.0, 0.0)).unwrap();

        assert!(rotate(&mut store, Some(&vp), 170.0));
        assert!(rotate(&mut store, Some(&vp), 20.0));
        assert_eq!(store.get(id).unwrap().rotation(), -170.0);
        assert!(!rotate(&mut store, None, 5.0));
    }

    #[test]
    fn resize_to_enforces_minimum() {
        let mut store = placing_store();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(0.0, 0.0)).unwrap();

        assert!(resize_to(&mut store, Some(&vp), DocSize::new(2.0, 300.0), 10.0));
        assert_eq!(store.get(id).unwrap().size(), DocSize::new(10.0, 300.0));
    }

    #[test]
    fn handles_scale_with_zoom() {
        let mut store = placing_store();
        let id = place_draft(&mut store, Some(&viewport(1.0)), DisplayPoint::new(100.0, 100.0)).unwrap();
        let overlay = store.get(id).unwrap();

        let handles = generate_handles(overlay, 8.0, 2.0);
        assert_eq!(handles.len(), 5);
        assert_eq!(handles[0].position, DocPoint::new(100.0, 100.0));
        assert_eq!(handles[0].size, 4.0);

        let knob = handles.iter().find(|h| h.handle_type == HandleType::Rotate).unwrap();
        assert!(approx(knob.position.x, 175.0));
        assert!(approx(knob.position.y, 88.0));
    }

    #[test]
    fn pick_prefers_handles_then_body() {
        let mut store = placing_store();
        let registry = KindRegistry::default();
        let vp = viewport(1.0);
        let id = place_draft(&mut store, Some(&vp), DisplayPoint::new(100.0, 100.0)).unwrap();

        let corner = pick_drag_target(&store, &registry, &vp, DocPoint::new(251.0, 141.0), 4.0, 8.0);
        assert_eq!(corner, Some((id, DragMode::Resize(HandleType::BottomRight))));

        let body = pick_drag_target(&store, &registry, &vp, DocPoint::new(175.0, 120.0), 4.0, 8.0);
        assert_eq!(body, Some((id, DragMode::Move)));

        assert_eq!(pick_drag_target(&store, &registry, &vp, DocPoint::new(500.0, 500.0), 4.0, 8.0), None);
    }
}
