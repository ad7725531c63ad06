//! # Adapter Notification Graph
//!
//! Every scene node can carry one adapter per [`Concern`]. Adapters hold the
//! derived state for their node (render objects, data outputs, listeners)
//! and are kept in sync with the scene through synchronous [`ChangeEvent`]s.
//!
//! ## Rules
//!
//! 1. Lifecycle only moves forward: `Uninitialized -> Configured -> Disposed`.
//! 2. Disposed adapters are swept at the start of the next pass, never while
//!    their siblings are being notified.
//! 3. Adapters never draw. They queue redraw requests.

mod behavior;
mod graph;

pub use behavior::{AdapterBehavior, AdapterCx, AdapterFactory, AdapterSite};
pub use graph::{AdapterGraph, ChangeHandler, GraphStats};

use std::fmt;
use std::ops::BitOr;

use vantage_shared::NodeId;

use crate::scene::Mutation;

/// The aspect of a node an adapter derives state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Concern {
    /// Render objects, draw state.
    Render,
    /// Data flow outputs (images, buffers).
    Data,
    /// Interaction listeners.
    Events,
}

impl Concern {
    /// All concerns in initialization order.
    pub const ALL: [Self; 3] = [Self::Render, Self::Data, Self::Events];
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Render => "render",
            Self::Data => "data",
            Self::Events => "events",
        })
    }
}

/// What an adapter can do, as a bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Produces render state.
    pub const RENDER: Self = Self(1 << 0);
    /// Produces data outputs.
    pub const DATA: Self = Self(1 << 1);
    /// Receives interaction events.
    pub const EVENTS: Self = Self(1 << 2);

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Adapter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lifecycle {
    /// Created, not yet configured.
    Uninitialized,
    /// Configured and receiving notifications.
    Configured,
    /// Disposed; waiting to be swept.
    Disposed,
}

impl Lifecycle {
    /// Moves to `next` if that is forward. Returns false otherwise.
    pub fn advance(&mut self, next: Self) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }

    /// Returns true unless disposed.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Disposed)
    }
}

/// Discriminant of a [`ChangeEvent`], used to key the handler map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// See [`ChangeEvent::AdapterHandleChanged`].
    AdapterHandleChanged,
    /// See [`ChangeEvent::NodeInserted`].
    NodeInserted,
    /// See [`ChangeEvent::NodeRemoved`].
    NodeRemoved,
    /// See [`ChangeEvent::ThisRemoved`].
    ThisRemoved,
}

/// A change delivered to one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The adapter a named handle points at may have changed.
    AdapterHandleChanged {
        /// Handle name.
        key: String,
    },
    /// A child subtree was inserted under the adapter's node.
    NodeInserted {
        /// Root of the inserted subtree.
        affected: NodeId,
        /// The originating mutation.
        mutation: Mutation,
        /// True when delivered through a distribution endpoint.
        forwarded: bool,
    },
    /// A child subtree was removed from the adapter's node.
    NodeRemoved {
        /// Root of the removed subtree.
        node: NodeId,
    },
    /// The adapter's own node left the scene.
    ThisRemoved,
}

impl ChangeEvent {
    /// The event's discriminant.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::AdapterHandleChanged { .. } => ChangeKind::AdapterHandleChanged,
            Self::NodeInserted { .. } => ChangeKind::NodeInserted,
            Self::NodeRemoved { .. } => ChangeKind::NodeRemoved,
            Self::ThisRemoved => ChangeKind::ThisRemoved,
        }
    }
}
