//! # VANTAGE Shared Types
//!
//! Types every VANTAGE crate agrees on:
//! - Identifiers for scene nodes, adapters, surfaces and listeners
//! - Ray and viewport math on top of `glam`
//! - The synthesized interaction event shape and the frame-drawn payload
//! - Runtime configuration loaded from TOML
//!
//! Nothing in here talks to a render device.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod math;

pub use config::VantageConfig;
pub use error::ConfigError;
pub use events::{
    EventDetail, EventKind, FrameDrawnEvent, Modifiers, PointerInput, TouchDetail, TouchInput,
    TouchPoint, UiEvent,
};
pub use ids::{AdapterId, ListenerId, NodeId, SurfaceId};
pub use math::{unproject, Ray, Viewport, NAN_VEC3};

pub use glam::{Mat4, Vec3, Vec4};
