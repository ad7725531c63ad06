//! # Redraw Requests
//!
//! Adapters never draw. They queue a [`RedrawRequest`] and the scheduling
//! thread routes it to the owning surface's frame scheduler on the next tick.
//! The queue is a crossbeam channel so loaders on other threads can request
//! redraws too.

use crossbeam_channel::{Receiver, Sender};
use vantage_shared::SurfaceId;

/// A request to redraw a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrawRequest {
    /// Surface to redraw. [`SurfaceId::GLOBAL`] means every surface.
    pub surface: SurfaceId,
    /// Human-readable cause, for logs.
    pub cause: String,
    /// Whether the id buffer must be re-rendered as well.
    pub picking: bool,
}

/// Cloneable handle for queueing redraw requests.
#[derive(Debug, Clone)]
pub struct RedrawSender {
    sender: Sender<RedrawRequest>,
}

impl RedrawSender {
    /// Queues a scene-affecting redraw (invalidates the pick buffer).
    pub fn request(&self, surface: SurfaceId, cause: impl Into<String>) {
        self.send(RedrawRequest {
            surface,
            cause: cause.into(),
            picking: true,
        });
    }

    /// Queues a redraw that leaves the pick buffer valid (texture updates).
    pub fn request_without_picking(&self, surface: SurfaceId, cause: impl Into<String>) {
        self.send(RedrawRequest {
            surface,
            cause: cause.into(),
            picking: false,
        });
    }

    fn send(&self, request: RedrawRequest) {
        tracing::trace!(surface = %request.surface, cause = %request.cause, "redraw requested");
        if self.sender.send(request).is_err() {
            tracing::debug!("redraw queue dropped, request discarded");
        }
    }
}

/// Unbounded redraw queue owned by the scheduling thread.
pub struct RedrawQueue {
    sender: Sender<RedrawRequest>,
    receiver: Receiver<RedrawRequest>,
}

impl RedrawQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Returns a sender for adapters and loaders.
    #[must_use]
    pub fn sender(&self) -> RedrawSender {
        RedrawSender {
            sender: self.sender.clone(),
        }
    }

    /// Takes every queued request, oldest first.
    pub fn drain(&self) -> Vec<RedrawRequest> {
        self.receiver.try_iter().collect()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for RedrawQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = RedrawQueue::new();
        let sender = queue.sender();
        sender.request(SurfaceId(1), "first");
        sender.request_without_picking(SurfaceId(2), "texture");
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].cause, "first");
        assert!(drained[0].picking);
        assert_eq!(drained[1].surface, SurfaceId(2));
        assert!(!drained[1].picking);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sender_from_other_thread() {
        let queue = RedrawQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || sender.request(SurfaceId::GLOBAL, "loaded"))
            .join()
            .unwrap();
        assert_eq!(queue.drain()[0].surface, SurfaceId::GLOBAL);
    }
}
