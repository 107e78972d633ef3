use crate::clip::{ClipStrategy, DEFAULT_CLIP_EPSILON};
use crate::error::{MirrorError, Result};

/// Tuning knobs for mirror tree building and drawing.
///
/// # Example
///
/// ```
/// use speculum::{ClipStrategy, MirrorConfig};
///
/// let config = MirrorConfig::new()
///     .max_depth(3)
///     .clip_strategy(ClipStrategy::Wide);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MirrorConfig {
    /// Deepest reflection level. 1 draws direct reflections only.
    pub max_depth: u32,
    /// Camera nodes reserved per frame, root included.
    pub max_nodes: usize,
    /// Vertices closer than this to a clip plane count as on it.
    pub clip_epsilon: f32,
    pub clip_strategy: ClipStrategy,
    /// Distance at which draw sort keys saturate.
    pub sort_max_distance: f32,
    /// Keep a copy of each frame's tree and visible lists.
    pub capture_debug: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_nodes: 256,
            clip_epsilon: DEFAULT_CLIP_EPSILON,
            clip_strategy: ClipStrategy::Scalar,
            sort_max_distance: 1000.0,
            capture_debug: false,
        }
    }
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn clip_epsilon(mut self, clip_epsilon: f32) -> Self {
        self.clip_epsilon = clip_epsilon;
        self
    }

    pub fn clip_strategy(mut self, clip_strategy: ClipStrategy) -> Self {
        self.clip_strategy = clip_strategy;
        self
    }

    pub fn sort_max_distance(mut self, sort_max_distance: f32) -> Self {
        self.sort_max_distance = sort_max_distance;
        self
    }

    pub fn capture_debug(mut self, capture_debug: bool) -> Self {
        self.capture_debug = capture_debug;
        self
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(MirrorError::InvalidConfig("max_depth must be at least 1".into()));
        }
        if self.max_nodes == 0 {
            return Err(MirrorError::InvalidConfig("max_nodes must be at least 1".into()));
        }
        if self.clip_epsilon.is_nan() || self.clip_epsilon < 0.0 {
            return Err(MirrorError::InvalidConfig(format!(
                "clip_epsilon must be non-negative, got {}",
                self.clip_epsilon
            )));
        }
        if self.sort_max_distance.is_nan() || self.sort_max_distance <= 0.0 {
            return Err(MirrorError::InvalidConfig(format!(
                "sort_max_distance must be positive, got {}",
                self.sort_max_distance
            )));
        }
        Ok(())
    }
}
