//! Error types for mirror tree construction and GPU replay.
//!
//! Most of the mirror pipeline never fails: a fully clipped or backfacing
//! mirror simply contributes no node, and hitting the recursion cap is a normal
//! way for a branch to end. The conditions below are the ones a caller has to
//! hear about.

use thiserror::Error;

/// Errors reported by the mirror pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The camera tree needed more nodes than were reserved for the frame.
    ///
    /// The tree is discarded rather than truncated: a partial tree would leave
    /// unbalanced stencil brackets.
    #[error("mirror tree exceeded its capacity of {capacity} nodes")]
    NodeCapacityExceeded { capacity: usize },

    /// A catalog polygon cannot be used as a mirror.
    #[error("mirror {id} is invalid: {reason}")]
    InvalidMirror { id: usize, reason: String },

    /// A [`MirrorConfig`](crate::MirrorConfig) value is out of range.
    #[error("invalid mirror configuration: {0}")]
    InvalidConfig(String),

    /// The window surface could not be created.
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    /// No adapter matched the surface.
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    /// The logical device could not be created.
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Shorthand result type for this crate.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_names_limit() {
        let err = MirrorError::NodeCapacityExceeded { capacity: 64 };
        assert_eq!(
            err.to_string(),
            "mirror tree exceeded its capacity of 64 nodes"
        );
    }

    #[test]
    fn test_invalid_mirror_message() {
        let err = MirrorError::InvalidMirror {
            id: 3,
            reason: "2 vertices".to_string(),
        };
        assert_eq!(err.to_string(), "mirror 3 is invalid: 2 vertices");
    }
}
