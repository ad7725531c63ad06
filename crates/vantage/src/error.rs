//! # Context Error Types

use thiserror::Error;
use vantage_core::SceneError;
use vantage_rendering::RenderError;
use vantage_shared::{ConfigError, NodeId, SurfaceId};
use vantage_ui::ListenerError;

/// Errors returned by [`crate::Context`].
#[derive(Error, Debug)]
pub enum VantageError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A scene edit was rejected.
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    /// A draw pass failed.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// A listener could not run.
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    /// No surface with this id is attached.
    #[error("unknown surface: {0}")]
    UnknownSurface(SurfaceId),

    /// The node already roots a surface.
    #[error("{root} already roots surface {surface}")]
    RootInUse {
        /// Requested root.
        root: NodeId,
        /// Surface it roots.
        surface: SurfaceId,
    },

    /// The node has no events adapter, usually because it is not under an
    /// attached root.
    #[error("{0} has no events adapter")]
    NoEventAdapter(NodeId),
}

/// Result type for context operations.
pub type VantageResult<T> = Result<T, VantageError>;
