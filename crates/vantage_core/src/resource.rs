//! # Resource Load Gate
//!
//! Per-surface counters of outstanding asynchronous loads. Shared resources
//! count against [`SurfaceId::GLOBAL`].
//!
//! ```text
//! loader thread ──LoadTracker──► channel ──pump()──► pending[surface]
//!                                                      │ reaches 0
//!                                                      ▼
//!                                           every registered listener
//! ```
//!
//! A listener fires whenever *any* counter reaches zero; the listener decides
//! which counters it cares about.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crossbeam_channel::{Receiver, Sender};
use vantage_shared::{ListenerId, SurfaceId};

/// Message sent by a [`LoadTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMessage {
    /// A load started on the surface.
    Started(SurfaceId),
    /// A load finished (successfully or not) on the surface.
    Finished(SurfaceId),
}

/// Cloneable, `Send` handle for reporting loads from any thread.
#[derive(Debug, Clone)]
pub struct LoadTracker {
    sender: Sender<LoadMessage>,
}

impl LoadTracker {
    /// Reports a started load.
    pub fn begin(&self, surface: SurfaceId) {
        self.send(LoadMessage::Started(surface));
    }

    /// Reports a finished load.
    pub fn finish(&self, surface: SurfaceId) {
        self.send(LoadMessage::Finished(surface));
    }

    fn send(&self, message: LoadMessage) {
        if self.sender.send(message).is_err() {
            tracing::debug!(?message, "load gate dropped, message discarded");
        }
    }
}

/// Counters kept by the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Loads started.
    pub started: u64,
    /// Loads finished.
    pub finished: u64,
    /// Finish reports that arrived with the counter already at zero.
    pub saturated: u64,
}

/// Tracks pending loads and notifies listeners when a counter drains.
pub struct ResourceLoadGate {
    pending: HashMap<SurfaceId, u32>,
    listeners: BTreeMap<ListenerId, SurfaceId>,
    next_listener: u64,
    sender: Sender<LoadMessage>,
    receiver: Receiver<LoadMessage>,
    stats: LoadStats,
}

impl ResourceLoadGate {
    /// Creates a gate with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            pending: HashMap::new(),
            listeners: BTreeMap::new(),
            next_listener: 1,
            sender,
            receiver,
            stats: LoadStats::default(),
        }
    }

    /// Returns a tracker feeding this gate.
    #[must_use]
    pub fn tracker(&self) -> LoadTracker {
        LoadTracker {
            sender: self.sender.clone(),
        }
    }

    /// Increments the surface's counter.
    pub fn begin_load(&mut self, surface: SurfaceId) {
        *self.pending.entry(surface).or_insert(0) += 1;
        self.stats.started += 1;
    }

    /// Decrements the surface's counter, saturating at zero.
    ///
    /// Returns the subscriber surfaces of every registered listener if the
    /// counter just reached zero, otherwise an empty list.
    pub fn finish_load(&mut self, surface: SurfaceId) -> Vec<SurfaceId> {
        let count = self.pending.entry(surface).or_insert(0);
        match *count {
            0 => {
                self.stats.saturated += 1;
                tracing::warn!(%surface, "load finished with no pending loads");
                Vec::new()
            }
            1 => {
                *count = 0;
                self.stats.finished += 1;
                tracing::debug!(%surface, "all pending loads finished");
                self.subscribers()
            }
            _ => {
                *count -= 1;
                self.stats.finished += 1;
                Vec::new()
            }
        }
    }

    fn subscribers(&self) -> Vec<SurfaceId> {
        self.listeners
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Applies reports queued through [`LoadTracker`]s.
    ///
    /// Returns the deduplicated subscriber surfaces whose listeners fired.
    pub fn pump(&mut self) -> Vec<SurfaceId> {
        let mut fired = BTreeSet::new();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                LoadMessage::Started(surface) => self.begin_load(surface),
                LoadMessage::Finished(surface) => fired.extend(self.finish_load(surface)),
            }
        }
        fired.into_iter().collect()
    }

    /// Returns true if the surface has no pending loads.
    #[must_use]
    pub fn is_load_complete(&self, surface: SurfaceId) -> bool {
        self.pending(surface) == 0
    }

    /// Pending loads on the surface.
    #[must_use]
    pub fn pending(&self, surface: SurfaceId) -> u32 {
        self.pending.get(&surface).copied().unwrap_or(0)
    }

    /// Registers a listener on behalf of `surface`.
    pub fn add_listener(&mut self, surface: SurfaceId) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, surface);
        id
    }

    /// Unregisters a listener. Returns false if it was unknown.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Gate counters.
    #[must_use]
    pub const fn stats(&self) -> LoadStats {
        self.stats
    }
}

impl Default for ResourceLoadGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_only_on_reaching_zero() {
        let mut gate = ResourceLoadGate::new();
        let surface = SurfaceId(1);
        gate.add_listener(surface);

        gate.begin_load(SurfaceId::GLOBAL);
        gate.begin_load(SurfaceId::GLOBAL);
        assert!(gate.finish_load(SurfaceId::GLOBAL).is_empty());
        assert_eq!(gate.finish_load(SurfaceId::GLOBAL), vec![surface]);
        assert!(gate.is_load_complete(SurfaceId::GLOBAL));
    }

    #[test]
    fn test_any_counter_fires_every_listener() {
        let mut gate = ResourceLoadGate::new();
        gate.add_listener(SurfaceId(1));
        gate.add_listener(SurfaceId(2));
        gate.add_listener(SurfaceId(2));

        gate.begin_load(SurfaceId(7));
        assert_eq!(gate.finish_load(SurfaceId(7)), vec![SurfaceId(1), SurfaceId(2)]);
    }

    #[test]
    fn test_saturates_at_zero() {
        let mut gate = ResourceLoadGate::new();
        gate.add_listener(SurfaceId(1));
        assert!(gate.finish_load(SurfaceId(1)).is_empty());
        assert_eq!(gate.pending(SurfaceId(1)), 0);
        assert_eq!(gate.stats().saturated, 1);

        // Re-armed by a later increment.
        gate.begin_load(SurfaceId(1));
        assert!(!gate.is_load_complete(SurfaceId(1)));
        assert_eq!(gate.finish_load(SurfaceId(1)), vec![SurfaceId(1)]);
    }

    #[test]
    fn test_removed_listener_not_reported() {
        let mut gate = ResourceLoadGate::new();
        let id = gate.add_listener(SurfaceId(1));
        assert!(gate.remove_listener(id));
        assert!(!gate.remove_listener(id));
        gate.begin_load(SurfaceId(1));
        assert!(gate.finish_load(SurfaceId(1)).is_empty());
    }

    #[test]
    fn test_tracker_from_worker_thread() {
        let mut gate = ResourceLoadGate::new();
        gate.add_listener(SurfaceId(3));
        let tracker = gate.tracker();
        std::thread::spawn(move || {
            tracker.begin(SurfaceId(3));
            tracker.begin(SurfaceId::GLOBAL);
            tracker.finish(SurfaceId(3));
            tracker.finish(SurfaceId::GLOBAL);
        })
        .join()
        .unwrap();

        assert_eq!(gate.pump(), vec![SurfaceId(3)]);
        assert!(gate.is_load_complete(SurfaceId(3)));
        assert_eq!(gate.stats().started, 2);
        assert_eq!(gate.stats().finished, 2);
    }
}
