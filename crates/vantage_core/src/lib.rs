//! # VANTAGE Core
//!
//! Keeps derived render state in sync with a live scene graph.
//!
//! ## Architecture Rules
//!
//! 1. **Single scheduling thread** - scene, adapters and counters are only
//!    touched from the thread that drives frames
//! 2. **No nested passes** - notification, picking and drawing never run
//!    inside one another
//! 3. **Channels at the edges** - redraw requests and load reports may come
//!    from any thread and are drained on the scheduling thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use vantage_core::{AdapterGraph, RedrawQueue, SceneGraph};
//!
//! let queue = RedrawQueue::new();
//! let mut graph = AdapterGraph::new(queue.sender());
//! // register factories, attach surface roots, then on every edit:
//! graph.process(&scene, scene.take_mutations());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod adapter;
pub mod redraw;
pub mod resource;
pub mod scene;

pub use adapter::{
    AdapterBehavior, AdapterCx, AdapterFactory, AdapterGraph, AdapterSite, Capabilities,
    ChangeEvent, ChangeHandler, ChangeKind, Concern, GraphStats, Lifecycle,
};
pub use redraw::{RedrawQueue, RedrawRequest, RedrawSender};
pub use resource::{LoadMessage, LoadStats, LoadTracker, ResourceLoadGate};
pub use scene::{Mutation, SceneError, SceneGraph, VisualNode};
