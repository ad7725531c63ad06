//! # VANTAGE
//!
//! Renders a live, mutable scene graph to one or more surfaces and routes
//! pointer and touch input back onto scene objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Context                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  SceneGraph ──mutations──► AdapterGraph ──redraws──► RedrawQueue    │
//! │                               │    ▲                     │          │
//! │                  load reports │    │ deliver_event        │          │
//! │                               ▼    │                     ▼          │
//! │                      ResourceLoadGate          ┌──────────────────┐ │
//! │                               │                │ Surface          │ │
//! │                               └──ready latch──►│  FrameScheduler  │ │
//! │                                                │  Picker          │ │
//! │  host frame / pointer / touch ────────────────►│  Dispatcher      │ │
//! │                                                │  RenderDevice    │ │
//! │                                                └──────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use vantage::{Context, VantageConfig};
//! use vantage::rendering::{HeadlessDevice, SystemClock};
//!
//! let mut ctx = Context::new(VantageConfig::default())?;
//! let root = ctx.scene_mut().create_node("xml3d");
//! let surface = ctx.attach_surface(root, Box::new(HeadlessDevice::new(800, 600)), Box::new(SystemClock))?;
//! // from the host's frame callback:
//! ctx.tick(surface, &mut frames)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod context;
pub mod error;
pub mod surface;

pub use vantage_core as core;
pub use vantage_rendering as rendering;
pub use vantage_shared as shared;
pub use vantage_ui as ui;

pub use context::{Context, FrameReport};
pub use error::{VantageError, VantageResult};
pub use surface::Surface;
pub use vantage_shared::{EventKind, NodeId, PointerInput, SurfaceId, UiEvent, VantageConfig};
