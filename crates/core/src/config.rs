//! Engine configuration.
//!
//! Defaults cover every tunable the interaction layer needs: default
//! overlay sizes, zoom factors, the minimum overlay dimension and what
//! happens to a pending draft on page navigation. Configuration can be
//! built programmatically, loaded from environment variables or read from
//! a JSON file.

use crate::viewport::FitMode;
use overlay_model::DocSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// What page navigation does with a draft that has not been saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingDraftPolicy {
    /// Commit the draft to its page before leaving
    #[default]
    Save,
    /// Throw the draft away
    Discard,
    /// Refuse to navigate until the draft is saved or discarded
    Block,
}

impl PendingDraftPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "save" => Some(Self::Save),
            "discard" => Some(Self::Discard),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// Configuration for the overlay engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of a freshly placed text overlay, in document units
    pub default_text_size: DocSize,
    /// Size of a freshly placed image overlay, in document units
    pub default_image_size: DocSize,
    /// Font size of a freshly placed text overlay
    pub default_font_size: f32,
    /// Floor for either overlay dimension after any resize
    pub min_overlay_size: f32,
    /// Multiplier applied by "zoom in"
    pub zoom_in_factor: f32,
    /// Multiplier applied by "zoom out"
    pub zoom_out_factor: f32,
    /// Slack around overlay bounds for hit testing, in document units
    pub hit_tolerance: f32,
    /// On-screen size of manipulation handles, in display pixels
    pub handle_size_px: f32,
    pub fit_mode: FitMode,
    pub pending_draft_policy: PendingDraftPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_text_size: DocSize::new(150.0, 40.0),
            default_image_size: DocSize::new(200.0, 100.0),
            default_font_size: 16.0,
            min_overlay_size: 10.0,
            zoom_in_factor: 1.1,
            zoom_out_factor: 0.9,
            hit_tolerance: 4.0,
            handle_size_px: 8.0,
            fit_mode: FitMode::Page,
            pending_draft_policy: PendingDraftPolicy::Save,
        }
    }
}

impl EngineConfig {
    pub fn with_default_text_size(mut self, size: DocSize) -> Self {
        self.default_text_size = size;
        self
    }

    pub fn with_default_image_size(mut self, size: DocSize) -> Self {
        self.default_image_size = size;
        self
    }

    pub fn with_default_font_size(mut self, font_size: f32) -> Self {
        self.default_font_size = font_size;
        self
    }

    pub fn with_min_overlay_size(mut self, min: f32) -> Self {
        self.min_overlay_size = min;
        self
    }

    /// Sets both zoom multipliers.
    pub fn with_zoom_factors(mut self, zoom_in: f32, zoom_out: f32) -> Self {
        self.zoom_in_factor = zoom_in;
        self.zoom_out_factor = zoom_out;
        self
    }

    pub fn with_hit_tolerance(mut self, tolerance: f32) -> Self {
        self.hit_tolerance = tolerance;
        self
    }

    pub fn with_fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.fit_mode = fit_mode;
        self
    }

    pub fn with_pending_draft_policy(mut self, policy: PendingDraftPolicy) -> Self {
        self.pending_draft_policy = policy;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OVERLAY_ENGINE_FONT_SIZE`: default font size (default: 16)
    /// - `OVERLAY_ENGINE_MIN_SIZE`: minimum overlay dimension (default: 10)
    /// - `OVERLAY_ENGINE_ZOOM_IN`: zoom-in multiplier (default: 1.1)
    /// - `OVERLAY_ENGINE_ZOOM_OUT`: zoom-out multiplier (default: 0.9)
    /// - `OVERLAY_ENGINE_HIT_TOLERANCE`: hit-test slack (default: 4)
    /// - `OVERLAY_ENGINE_PENDING_DRAFT`: `save`, `discard` or `block`
    ///
    /// # Errors
    /// Returns an error if any variable is unparseable or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = env_f32("OVERLAY_ENGINE_FONT_SIZE")? {
            config.default_font_size = value;
        }
        if let Some(value) = env_f32("OVERLAY_ENGINE_MIN_SIZE")? {
            config.min_overlay_size = value;
        }
        if let Some(value) = env_f32("OVERLAY_ENGINE_ZOOM_IN")? {
            config.zoom_in_factor = value;
        }
        if let Some(value) = env_f32("OVERLAY_ENGINE_ZOOM_OUT")? {
            config.zoom_out_factor = value;
        }
        if let Some(value) = env_f32("OVERLAY_ENGINE_HIT_TOLERANCE")? {
            config.hit_tolerance = value;
        }
        if let Ok(value) = std::env::var("OVERLAY_ENGINE_PENDING_DRAFT") {
            config.pending_draft_policy = PendingDraftPolicy::parse(&value)
                .ok_or_else(|| ConfigError::InvalidValue("OVERLAY_ENGINE_PENDING_DRAFT".to_string()))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file. Missing keys take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the interaction layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |value: f32| value.is_finite() && value > 0.0;

        if !positive(self.default_font_size) {
            return Err(ConfigError::InvalidValue("default_font_size".to_string()));
        }
        if !positive(self.min_overlay_size) {
            return Err(ConfigError::InvalidValue("min_overlay_size".to_string()));
        }
        if !positive(self.zoom_in_factor) {
            return Err(ConfigError::InvalidValue("zoom_in_factor".to_string()));
        }
        if !positive(self.zoom_out_factor) {
            return Err(ConfigError::InvalidValue("zoom_out_factor".to_string()));
        }
        if !self.hit_tolerance.is_finite() || self.hit_tolerance < 0.0 {
            return Err(ConfigError::InvalidValue("hit_tolerance".to_string()));
        }
        for (key, size) in [
            ("default_text_size", self.default_text_size),
            ("default_image_size", self.default_image_size),
        ] {
            if !positive(size.width) || !positive(size.height) {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }
        if let FitMode::Fixed(scale) = self.fit_mode {
            if !positive(scale) {
                return Err(ConfigError::InvalidValue("fit_mode".to_string()));
            }
        }

        Ok(())
    }
}

fn env_f32(key: &str) -> Result<Option<f32>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
