//! Editor interaction state
//!
//! The four states are mutually exclusive by construction: a pending draft
//! and an active selection can never coexist because they are different
//! variants of one enum.

use crate::preset::OverlayTemplate;
use overlay_model::{Overlay, OverlayId};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditorState {
    /// Nothing in progress
    #[default]
    Idle,
    /// Waiting for a click on the page to create a draft
    Placing(OverlayTemplate),
    /// A draft exists but is not yet part of its page's collection
    DraftEditing(Overlay),
    /// A saved overlay is selected for editing
    ActiveEditing(OverlayId),
}

impl EditorState {
    pub fn is_idle(&self) -> bool {
        matches!(self, EditorState::Idle)
    }

    pub fn is_placing(&self) -> bool {
        matches!(self, EditorState::Placing(_))
    }

    pub fn template(&self) -> Option<&OverlayTemplate> {
        match self {
            EditorState::Placing(template) => Some(template),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&Overlay> {
        match self {
            EditorState::DraftEditing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut Overlay> {
        match self {
            EditorState::DraftEditing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn active_id(&self) -> Option<OverlayId> {
        match self {
            EditorState::ActiveEditing(id) => Some(*id),
            _ => None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EditorState::Idle => "idle",
            EditorState::Placing(_) => "placing",
            EditorState::DraftEditing(_) => "draft_editing",
            EditorState::ActiveEditing(_) => "active_editing",
        }
    }
}
