//! # VANTAGE Rendering
//!
//! Frame-level rendering on top of the adapter graph.
//!
//! ## Components
//!
//! - [`device::RenderDevice`] - the backend boundary, with
//!   [`headless::HeadlessDevice`] for tests and offline tools
//! - [`scheduler::FrameScheduler`] - redraw bookkeeping and the tick/draw step
//! - [`picking::Picker`] - id-buffer picks, rays and world hit queries
//! - [`postprocess::PostProcessChain`] - ping-pong full-screen passes and
//!   render-to-texture
//! - [`adapters`] - render and data adapters registered with the graph
//!
//! ## Frame Step
//!
//! ```text
//! tick -> update listeners -> draw? -> scene pass -> post-process -> FrameDrawn
//!      -> request_frame (always)
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod adapters;
pub mod device;
pub mod headless;
pub mod picking;
pub mod postprocess;
pub mod scheduler;

pub use adapters::{
    DataAdapterFactory, ImageDataAdapter, ImageState, NodeRenderAdapter, ReadyLatch,
    RenderAdapterFactory, SurfaceRenderAdapter,
};
pub use device::{
    BufferSlot, DrawStats, PickPixel, RenderDevice, RenderError, RenderTarget, ShaderPass, ShaderRef,
};
pub use headless::{HeadlessDevice, HeadlessObject, PassRecord, ScreenRect};
pub use picking::{PickQuery, PickResult, Picker};
pub use postprocess::{
    PostProcessChain, RenderTextureCache, TextureHandle, TextureSource, TextureSourceResolver,
};
pub use scheduler::{
    Clock, FallbackTimer, FrameFlags, FrameScheduler, FrameSource, ManualClock, SchedulerStats,
    SystemClock, TickOutcome,
};
