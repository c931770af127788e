//! Overlay store
//!
//! Owns every saved overlay, grouped by page, and the editor state. The
//! pending draft lives inside [`EditorState::DraftEditing`] rather than in
//! a page collection, so saved collections only ever hold saved overlays.

use crate::kind::KindRegistry;
use crate::preset::OverlayTemplate;
use crate::state::EditorState;
use overlay_model::{DocPoint, Overlay, OverlayId};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    pages: BTreeMap<u32, Vec<Overlay>>,
    state: EditorState,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    fn transition(&mut self, next: EditorState) {
        debug!(from = self.state.name(), to = next.name(), "editor state change");
        self.state = next;
    }

    /// Arm placement mode
    ///
    /// An active selection is released. While a draft is pending the
    /// request is refused and `false` is returned.
    pub fn begin_placement(&mut self, template: OverlayTemplate) -> bool {
        if let EditorState::DraftEditing(draft) = &self.state {
            debug!(draft = %draft.id(), "placement refused while draft pending");
            return false;
        }
        self.transition(EditorState::Placing(template));
        true
    }

    pub fn cancel_placement(&mut self) -> bool {
        if !self.state.is_placing() {
            return false;
        }
        self.transition(EditorState::Idle);
        true
    }

    /// Install `draft` as the pending draft; only valid while placing
    pub fn create_draft(&mut self, draft: Overlay) -> bool {
        if !self.state.is_placing() || !draft.is_draft() {
            return false;
        }
        self.transition(EditorState::DraftEditing(draft));
        true
    }

    /// Commit the pending draft to its page, returning its ID
    pub fn save(&mut self) -> Option<OverlayId> {
        match std::mem::take(&mut self.state) {
            EditorState::DraftEditing(draft) => {
                let saved = draft.into_saved();
                let id = saved.id();
                debug!(overlay = %id, page = saved.page_number(), "draft saved");
                self.pages.entry(saved.page_number()).or_default().push(saved);
                Some(id)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop the pending draft
    pub fn discard(&mut self) -> Option<Overlay> {
        match std::mem::take(&mut self.state) {
            EditorState::DraftEditing(draft) => {
                debug!(overlay = %draft.id(), "draft discarded");
                Some(draft)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Select a saved overlay
    ///
    /// Refused while a draft is pending or when `id` is not a saved overlay.
    pub fn select(&mut self, id: OverlayId) -> bool {
        if matches!(self.state, EditorState::DraftEditing(_)) {
            return false;
        }
        if self.saved_position(id).is_none() {
            return false;
        }
        self.transition(EditorState::ActiveEditing(id));
        true
    }

    pub fn deselect(&mut self) -> bool {
        if self.state.active_id().is_none() {
            return false;
        }
        self.transition(EditorState::Idle);
        true
    }

    /// Remove an overlay, saved or draft
    ///
    /// Deleting the selected overlay or the draft returns the editor to idle.
    pub fn delete(&mut self, id: OverlayId) -> Option<Overlay> {
        if self.state.draft().is_some_and(|draft| draft.id() == id) {
            return self.discard();
        }

        let (page, index) = self.saved_position(id)?;
        let overlays = self.pages.get_mut(&page)?;
        let removed = overlays.remove(index);
        if overlays.is_empty() {
            self.pages.remove(&page);
        }

        if self.state.active_id() == Some(id) {
            self.transition(EditorState::Idle);
        }
        debug!(overlay = %id, page, "overlay deleted");
        Some(removed)
    }

    /// Delete whatever is currently being edited; no-op otherwise
    pub fn delete_target(&mut self) -> Option<Overlay> {
        let id = self.target_id()?;
        self.delete(id)
    }

    /// ID of the draft or the selected overlay
    pub fn target_id(&self) -> Option<OverlayId> {
        match &self.state {
            EditorState::DraftEditing(draft) => Some(draft.id()),
            EditorState::ActiveEditing(id) => Some(*id),
            _ => None,
        }
    }

    /// The overlay the property editor and controls act on
    pub fn target(&self) -> Option<&Overlay> {
        match &self.state {
            EditorState::DraftEditing(draft) => Some(draft),
            EditorState::ActiveEditing(id) => self.saved_get(*id),
            _ => None,
        }
    }

    pub fn target_mut(&mut self) -> Option<&mut Overlay> {
        if let Some(id) = self.state.active_id() {
            return self.saved_get_mut(id);
        }
        self.state.draft_mut()
    }

    /// Look up a saved overlay or the pending draft
    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        match self.state.draft() {
            Some(draft) if draft.id() == id => Some(draft),
            _ => self.saved_get(id),
        }
    }

    pub fn get_mut(&mut self, id: OverlayId) -> Option<&mut Overlay> {
        if self.state.draft().is_some_and(|draft| draft.id() == id) {
            return self.state.draft_mut();
        }
        self.saved_get_mut(id)
    }

    pub fn saved_on_page(&self, page_number: u32) -> &[Overlay] {
        self.pages.get(&page_number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All saved overlays in page order, then insertion order
    pub fn saved(&self) -> impl Iterator<Item = &Overlay> {
        self.pages.values().flatten()
    }

    pub fn saved_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    /// Pages holding at least one saved overlay
    pub fn pages_with_overlays(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Topmost overlay under `point`, the draft first, then saved overlays
    /// in reverse insertion order
    pub fn topmost_at(
        &self,
        page_number: u32,
        point: DocPoint,
        tolerance: f32,
        registry: &KindRegistry,
    ) -> Option<OverlayId> {
        let hit = |overlay: &Overlay| registry.handler(overlay.kind()).hit_test(overlay, point, tolerance);

        if let Some(draft) = self.state.draft() {
            if draft.page_number() == page_number && hit(draft) {
                return Some(draft.id());
            }
        }

        self.saved_on_page(page_number)
            .iter()
            .rev()
            .find(|overlay| hit(overlay))
            .map(Overlay::id)
    }

    /// Insert an already-saved overlay, e.g. a copy made for another page
    pub(crate) fn insert_saved(&mut self, overlay: Overlay) {
        debug_assert!(!overlay.is_draft());
        self.pages.entry(overlay.page_number()).or_default().push(overlay);
    }

    fn saved_position(&self, id: OverlayId) -> Option<(u32, usize)> {
        self.pages.iter().find_map(|(page, overlays)| {
            overlays
                .iter()
                .position(|overlay| overlay.id() == id)
                .map(|index| (*page, index))
        })
    }

    fn saved_get(&self, id: OverlayId) -> Option<&Overlay> {
        let (page, index) = self.saved_position(id)?;
        self.pages.get(&page)?.get(index)
    }

    fn saved_get_mut(&mut self, id: OverlayId) -> Option<&mut Overlay> {
        let (page, index) = self.saved_position(id)?;
        self.pages.get_mut(&page)?.get_mut(index)
    }
}
