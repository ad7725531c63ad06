//! # VANTAGE UI
//!
//! Turns host pointer and touch input into [`UiEvent`]s delivered to scene
//! nodes.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  host input → InteractionDispatcher → pick → UiEvent      │
//! │                       ↓                        ↓          │
//! │               InteractionState         target + root      │
//! │                                              ↓            │
//! │                                   EventAdapter listeners  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The dispatcher never touches the device or the adapter graph directly;
//! everything goes through an [`InteractionHost`].
//!
//! [`UiEvent`]: vantage_shared::UiEvent

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod interaction;
pub mod listeners;
pub mod touch;

pub use interaction::{InteractionDispatcher, InteractionHost, InteractionState};
pub use listeners::{
    parse_listener_string, Callback, EventAdapter, EventAdapterFactory, HandlerTable, Listener,
    ListenerError,
};
pub use touch::translate_touch;
