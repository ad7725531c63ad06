//! # Identifiers
//!
//! Lightweight copyable handles. None of them own anything; the store that
//! issued an id is the only place it can be resolved.

use std::fmt;

/// Identifier of a scene-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Creates a node id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identifier of an adapter attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AdapterId(pub u64);

impl AdapterId {
    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter#{}", self.0)
    }
}

/// Identifier of a display surface.
///
/// `SurfaceId::GLOBAL` is reserved for resources shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SurfaceId(pub u32);

impl SurfaceId {
    /// Reserved id for shared resources.
    pub const GLOBAL: Self = Self(0);

    /// Returns true for the reserved global id.
    #[must_use]
    pub const fn is_global(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            f.write_str("surface#global")
        } else {
            write!(f, "surface#{}", self.0)
        }
    }
}

/// Identifier of a registered listener (update, frame-drawn, load or event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ListenerId(pub u64);
