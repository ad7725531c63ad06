//! The adapter graph: owns every adapter and routes scene mutations to them.

use std::collections::{BTreeMap, HashMap};

use vantage_shared::{AdapterId, NodeId, SurfaceId, UiEvent};

use super::behavior::{AdapterBehavior, AdapterCx, AdapterFactory, AdapterSite};
use super::{Capabilities, ChangeEvent, ChangeKind, Concern, Lifecycle};
use crate::redraw::RedrawSender;
use crate::scene::{Mutation, SceneGraph, VisualNode};

/// Handler for one [`ChangeKind`].
pub type ChangeHandler = fn(&mut AdapterGraph, &SceneGraph, AdapterId, &ChangeEvent);

/// A named indirection to another adapter.
#[derive(Debug, Clone)]
pub(super) struct HandleBinding {
    pub(super) reference: String,
    pub(super) connected: Option<AdapterId>,
}

/// Work a behavior asks for; applied after its callback returns.
pub(super) enum Command {
    InitSubtree {
        root: NodeId,
        concern: Concern,
        surface: SurfaceId,
    },
}

struct AdapterSlot {
    node: NodeId,
    concern: Concern,
    surface: SurfaceId,
    lifecycle: Lifecycle,
    capabilities: Capabilities,
    handles: BTreeMap<String, HandleBinding>,
    behavior: Option<Box<dyn AdapterBehavior>>,
}

/// Adapter storage, readable from inside behavior callbacks.
pub(super) struct AdapterIndex {
    slots: BTreeMap<AdapterId, AdapterSlot>,
    by_node: HashMap<NodeId, Vec<AdapterId>>,
}

impl AdapterIndex {
    fn live_on(&self, node: NodeId) -> impl Iterator<Item = AdapterId> + '_ {
        self.by_node
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|id| self.slots.get(id).is_some_and(|s| s.lifecycle.is_live()))
    }

    fn live_ids_on(&self, node: NodeId) -> Vec<AdapterId> {
        self.live_on(node).collect()
    }

    fn live_with_concern(&self, node: NodeId, concern: Concern) -> Option<AdapterId> {
        self.live_on(node)
            .find(|id| self.slots.get(id).is_some_and(|s| s.concern == concern))
    }

    /// Resolves a `#id` reference to the live adapter of `concern` on the
    /// referenced node.
    pub(super) fn resolve(&self, scene: &SceneGraph, concern: Concern, reference: &str) -> Option<AdapterId> {
        let id = reference.trim().strip_prefix('#')?;
        let node = scene.element_by_id(id)?;
        self.live_with_concern(node, concern)
    }

    pub(super) fn node_of(&self, id: AdapterId) -> Option<NodeId> {
        self.slots.get(&id).map(|s| s.node)
    }

    pub(super) fn capabilities_of(&self, id: AdapterId) -> Option<Capabilities> {
        self.slots.get(&id).map(|s| s.capabilities)
    }
}

/// Counters kept by the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Adapters created.
    pub created: u64,
    /// Adapters disposed.
    pub disposed: u64,
    /// Disposed adapters removed from storage.
    pub swept: u64,
    /// Change events delivered.
    pub notifications: u64,
    /// Change events with no registered handler.
    pub unhandled: u64,
    /// Interaction listeners run.
    pub events_delivered: u64,
}

/// Owns every adapter and keeps them in sync with a [`SceneGraph`].
pub struct AdapterGraph {
    index: AdapterIndex,
    factories: BTreeMap<Concern, Box<dyn AdapterFactory>>,
    handlers: HashMap<ChangeKind, ChangeHandler>,
    endpoints: HashMap<NodeId, Vec<AdapterId>>,
    surface_roots: HashMap<NodeId, SurfaceId>,
    graveyard: Vec<AdapterId>,
    redraws: RedrawSender,
    next_id: u64,
    stats: GraphStats,
}

impl AdapterGraph {
    /// Creates an empty graph with the default handler for every kind.
    #[must_use]
    pub fn new(redraws: RedrawSender) -> Self {
        let handlers = [
            ChangeKind::AdapterHandleChanged,
            ChangeKind::NodeInserted,
            ChangeKind::NodeRemoved,
            ChangeKind::ThisRemoved,
        ]
        .into_iter()
        .map(|kind| (kind, Self::default_handler(kind)))
        .collect();

        Self {
            index: AdapterIndex {
                slots: BTreeMap::new(),
                by_node: HashMap::with_capacity(256),
            },
            factories: BTreeMap::new(),
            handlers,
            endpoints: HashMap::new(),
            surface_roots: HashMap::new(),
            graveyard: Vec::new(),
            redraws,
            next_id: 1,
            stats: GraphStats::default(),
        }
    }

    /// The built-in handler for a kind.
    #[must_use]
    pub fn default_handler(kind: ChangeKind) -> ChangeHandler {
        match kind {
            ChangeKind::AdapterHandleChanged => on_handle_changed,
            ChangeKind::NodeInserted => on_node_inserted,
            ChangeKind::NodeRemoved => on_node_removed,
            ChangeKind::ThisRemoved => on_this_removed,
        }
    }

    /// Replaces the handler for a kind, returning the previous one.
    pub fn set_handler(&mut self, kind: ChangeKind, handler: ChangeHandler) -> Option<ChangeHandler> {
        self.handlers.insert(kind, handler)
    }

    /// Removes the handler for a kind; events of that kind are then ignored.
    pub fn clear_handler(&mut self, kind: ChangeKind) -> Option<ChangeHandler> {
        self.handlers.remove(&kind)
    }

    /// Registers the factory for its concern, replacing any previous one.
    pub fn register_factory(&mut self, factory: Box<dyn AdapterFactory>) {
        self.factories.insert(factory.concern(), factory);
    }

    /// Makes `root` a surface root and creates adapters for its subtree.
    ///
    /// Returns the number of adapters created.
    pub fn attach_root(&mut self, scene: &SceneGraph, root: NodeId, surface: SurfaceId) -> usize {
        self.sweep();
        self.surface_roots.insert(root, surface);
        let concerns: Vec<Concern> = self.factories.keys().copied().collect();
        let created: usize = concerns
            .into_iter()
            .map(|concern| self.init_subtree(scene, root, concern, surface))
            .sum();
        self.refresh_endpoints(scene);
        self.refresh_handles(scene);
        tracing::info!(%root, %surface, created, "surface root attached");
        created
    }

    /// Disposes every adapter under `root` and forgets the surface root.
    pub fn detach_root(&mut self, scene: &SceneGraph, root: NodeId) {
        let nodes: Vec<NodeId> = scene.descendants(root).collect();
        for node in nodes {
            for id in self.index.live_ids_on(node) {
                self.notify(scene, id, &ChangeEvent::ThisRemoved);
            }
        }
        if let Some(surface) = self.surface_roots.remove(&root) {
            tracing::info!(%root, %surface, "surface root detached");
        }
    }

    /// Surface a node belongs to, found through its nearest surface root.
    #[must_use]
    pub fn surface_of(&self, scene: &SceneGraph, node: NodeId) -> Option<SurfaceId> {
        std::iter::once(node)
            .chain(scene.ancestors(node))
            .find_map(|n| self.surface_roots.get(&n).copied())
    }

    fn init_subtree(&mut self, scene: &SceneGraph, root: NodeId, concern: Concern, surface: SurfaceId) -> usize {
        let Some(factory) = self.factories.get(&concern) else {
            return 0;
        };
        let mut fresh = Vec::new();
        for node in scene.descendants(root) {
            if self.index.live_with_concern(node, concern).is_some() {
                continue;
            }
            let Some(visual) = scene.node(node) else {
                continue;
            };
            let site = AdapterSite {
                surface,
                is_surface_root: self.surface_roots.get(&node) == Some(&surface),
            };
            if let Some(behavior) = factory.create(visual, site) {
                fresh.push((node, behavior));
            }
        }

        let ids: Vec<AdapterId> = fresh
            .into_iter()
            .map(|(node, behavior)| self.insert_slot(node, concern, surface, behavior))
            .collect();
        for &id in &ids {
            self.configure(scene, id);
        }
        ids.len()
    }

    fn insert_slot(
        &mut self,
        node: NodeId,
        concern: Concern,
        surface: SurfaceId,
        behavior: Box<dyn AdapterBehavior>,
    ) -> AdapterId {
        let id = AdapterId(self.next_id);
        self.next_id += 1;
        let slot = AdapterSlot {
            node,
            concern,
            surface,
            lifecycle: Lifecycle::Uninitialized,
            capabilities: behavior.capabilities(),
            handles: BTreeMap::new(),
            behavior: Some(behavior),
        };
        self.index.slots.insert(id, slot);
        self.index.by_node.entry(node).or_default().push(id);
        self.stats.created += 1;
        tracing::trace!(adapter = %id, %node, %concern, "adapter created");
        id
    }

    fn configure(&mut self, scene: &SceneGraph, id: AdapterId) {
        let advanced = self
            .index
            .slots
            .get_mut(&id)
            .is_some_and(|slot| slot.lifecycle.advance(Lifecycle::Configured));
        if advanced {
            self.with_behavior(scene, id, |behavior, cx| behavior.on_configured(cx));
        }
    }

    /// Runs `f` against a live adapter's behavior with a scoped context.
    ///
    /// Returns `None` if the adapter is unknown, disposed, or already inside
    /// a callback.
    pub fn with_behavior<R>(
        &mut self,
        scene: &SceneGraph,
        id: AdapterId,
        f: impl FnOnce(&mut dyn AdapterBehavior, &mut AdapterCx<'_>) -> R,
    ) -> Option<R> {
        let slot = self.index.slots.get_mut(&id)?;
        if !slot.lifecycle.is_live() {
            return None;
        }
        let mut behavior = slot.behavior.take()?;
        let mut handles = std::mem::take(&mut slot.handles);
        let (node, surface, concern) = (slot.node, slot.surface, slot.concern);

        let mut commands = Vec::new();
        let result = {
            let mut cx = AdapterCx {
                id,
                node,
                surface,
                concern,
                scene,
                handles: &mut handles,
                index: &self.index,
                redraws: &self.redraws,
                commands: &mut commands,
            };
            f(behavior.as_mut(), &mut cx)
        };

        if let Some(slot) = self.index.slots.get_mut(&id) {
            slot.behavior = Some(behavior);
            slot.handles = handles;
        }
        for command in commands {
            match command {
                Command::InitSubtree { root, concern, surface } => {
                    self.init_subtree(scene, root, concern, surface);
                }
            }
        }
        Some(result)
    }

    /// Delivers one change event through the handler map.
    pub fn notify(&mut self, scene: &SceneGraph, adapter: AdapterId, event: &ChangeEvent) {
        self.stats.notifications += 1;
        let kind = event.kind();
        if let Some(handler) = self.handlers.get(&kind).copied() {
            handler(self, scene, adapter, event);
        } else {
            self.stats.unhandled += 1;
            tracing::debug!(%adapter, ?kind, "no handler for change event");
        }
    }

    /// Disposes an adapter explicitly.
    pub fn dispose(&mut self, scene: &SceneGraph, adapter: AdapterId) {
        self.notify(scene, adapter, &ChangeEvent::ThisRemoved);
    }

    /// Applies a batch of scene mutations.
    pub fn process(&mut self, scene: &SceneGraph, mutations: Vec<Mutation>) {
        self.sweep();
        self.refresh_endpoints(scene);

        for mutation in mutations {
            let mut rebind = mutation.is_structural();
            match &mutation {
                Mutation::Inserted { parent, node } => {
                    let event = ChangeEvent::NodeInserted {
                        affected: *node,
                        mutation: mutation.clone(),
                        forwarded: false,
                    };
                    for id in self.index.live_ids_on(*parent) {
                        self.notify(scene, id, &event);
                    }
                    self.init_unowned_concerns(scene, *parent, *node);
                }
                Mutation::Removed { parent, node } => {
                    let parents = self.index.live_ids_on(*parent);
                    for &id in &parents {
                        self.notify(scene, id, &ChangeEvent::NodeRemoved { node: *node });
                    }
                    let subtree: Vec<NodeId> = scene.descendants(*node).collect();
                    for removed in subtree {
                        for id in self.index.live_ids_on(removed) {
                            self.notify(scene, id, &ChangeEvent::ThisRemoved);
                        }
                    }
                    let surface = parents
                        .first()
                        .and_then(|id| self.index.slots.get(id))
                        .map(|slot| slot.surface);
                    if let Some(surface) = surface {
                        self.redraws.request(surface, "Node removed.");
                    }
                }
                Mutation::AttributeChanged { node, name, old, new } => {
                    rebind = name == "id";
                    for id in self.index.live_ids_on(*node) {
                        self.with_behavior(scene, id, |behavior, cx| {
                            behavior.on_attribute_changed(name, old.as_deref(), new.as_deref(), cx);
                        });
                    }
                }
            }
            if rebind {
                self.refresh_endpoints(scene);
                self.refresh_handles(scene);
            }
        }
    }

    // Concerns without an adapter on the parent are initialized directly,
    // on the endpoints' surfaces when the node is distributed.
    fn init_unowned_concerns(&mut self, scene: &SceneGraph, parent: NodeId, node: NodeId) {
        let surfaces: Vec<SurfaceId> = match self.endpoint_targets(scene, node) {
            Some(targets) => {
                let mut surfaces: Vec<SurfaceId> = targets
                    .iter()
                    .filter_map(|id| self.index.slots.get(id).map(|slot| slot.surface))
                    .collect();
                surfaces.sort_unstable();
                surfaces.dedup();
                surfaces
            }
            None => self.surface_of(scene, parent).into_iter().collect(),
        };
        let concerns: Vec<Concern> = self
            .factories
            .keys()
            .copied()
            .filter(|&concern| self.index.live_with_concern(parent, concern).is_none())
            .collect();
        for concern in concerns {
            for &surface in &surfaces {
                self.init_subtree(scene, node, concern, surface);
            }
        }
    }

    /// Live adapters on the distribution endpoints of `node`, or `None` if
    /// the node is not distributed.
    fn endpoint_targets(&self, scene: &SceneGraph, node: NodeId) -> Option<Vec<AdapterId>> {
        let endpoints = scene.node(node).and_then(VisualNode::endpoints)?;
        let mut targets: Vec<AdapterId> = endpoints
            .iter()
            .filter_map(|endpoint| self.endpoints.get(endpoint))
            .flatten()
            .copied()
            .collect();
        targets.sort_unstable();
        targets.dedup();
        Some(targets)
    }

    fn sweep(&mut self) {
        for id in std::mem::take(&mut self.graveyard) {
            let Some(slot) = self.index.slots.remove(&id) else {
                continue;
            };
            if let Some(ids) = self.index.by_node.get_mut(&slot.node) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    self.index.by_node.remove(&slot.node);
                }
            }
            self.stats.swept += 1;
        }
    }

    fn refresh_endpoints(&mut self, scene: &SceneGraph) {
        self.endpoints.clear();
        for host in scene.endpoint_hosts() {
            for &endpoint in host.endpoints().unwrap_or(&[]) {
                let live = self.index.live_ids_on(endpoint);
                self.endpoints.insert(endpoint, live);
            }
        }
    }

    fn refresh_handles(&mut self, scene: &SceneGraph) {
        let mut stale = Vec::new();
        for (&id, slot) in &self.index.slots {
            if slot.lifecycle != Lifecycle::Configured {
                continue;
            }
            for (key, binding) in &slot.handles {
                let target = self.index.resolve(scene, slot.concern, &binding.reference);
                if target != binding.connected {
                    stale.push((id, key.clone()));
                }
            }
        }
        for (id, key) in stale {
            self.notify(scene, id, &ChangeEvent::AdapterHandleChanged { key });
        }
    }

    /// Delivers an interaction event to every live, event-capable adapter on
    /// `node`. Returns the number of listeners run.
    pub fn deliver_event(&mut self, node: NodeId, event: &UiEvent) -> usize {
        let mut delivered = 0;
        for id in self.index.live_ids_on(node) {
            let Some(slot) = self.index.slots.get_mut(&id) else {
                continue;
            };
            if !slot.capabilities.contains(Capabilities::EVENTS) {
                continue;
            }
            if let Some(behavior) = slot.behavior.as_mut() {
                delivered += behavior.deliver(event);
            }
        }
        self.stats.events_delivered += delivered as u64;
        delivered
    }

    /// Live adapter of a concern on a node.
    #[must_use]
    pub fn adapter_for(&self, node: NodeId, concern: Concern) -> Option<AdapterId> {
        self.index.live_with_concern(node, concern)
    }

    /// Live adapters on a node, in creation order.
    #[must_use]
    pub fn adapters_on(&self, node: NodeId) -> Vec<AdapterId> {
        self.index.live_ids_on(node)
    }

    /// Lifecycle of an adapter that has not been swept yet.
    #[must_use]
    pub fn lifecycle(&self, id: AdapterId) -> Option<Lifecycle> {
        self.index.slots.get(&id).map(|slot| slot.lifecycle)
    }

    /// Node an adapter is attached to.
    #[must_use]
    pub fn node_of(&self, id: AdapterId) -> Option<NodeId> {
        self.index.node_of(id)
    }

    /// Surface an adapter renders into.
    #[must_use]
    pub fn surface_of_adapter(&self, id: AdapterId) -> Option<SurfaceId> {
        self.index.slots.get(&id).map(|slot| slot.surface)
    }

    /// Adapter connected through a named handle.
    #[must_use]
    pub fn connected_handle(&self, id: AdapterId, key: &str) -> Option<AdapterId> {
        self.index
            .slots
            .get(&id)?
            .handles
            .get(key)
            .and_then(|binding| binding.connected)
    }

    /// Downcasts an adapter's behavior.
    #[must_use]
    pub fn behavior<T: AdapterBehavior>(&self, id: AdapterId) -> Option<&T> {
        self.index
            .slots
            .get(&id)?
            .behavior
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Downcasts an adapter's behavior mutably.
    #[must_use]
    pub fn behavior_mut<T: AdapterBehavior>(&mut self, id: AdapterId) -> Option<&mut T> {
        self.index
            .slots
            .get_mut(&id)?
            .behavior
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Number of live adapters.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.index
            .slots
            .values()
            .filter(|slot| slot.lifecycle.is_live())
            .count()
    }

    /// Graph counters.
    #[must_use]
    pub const fn stats(&self) -> GraphStats {
        self.stats
    }
}

fn on_handle_changed(graph: &mut AdapterGraph, scene: &SceneGraph, id: AdapterId, event: &ChangeEvent) {
    let ChangeEvent::AdapterHandleChanged { key } = event else {
        return;
    };
    let Some(slot) = graph.index.slots.get(&id).filter(|s| s.lifecycle.is_live()) else {
        return;
    };
    let surface = slot.surface;
    let target = match slot.handles.get(key) {
        Some(binding) => graph.index.resolve(scene, slot.concern, &binding.reference),
        None => return,
    };
    if let Some(binding) = graph
        .index
        .slots
        .get_mut(&id)
        .and_then(|slot| slot.handles.get_mut(key))
    {
        binding.connected = target;
    }
    tracing::debug!(adapter = %id, key = %key, ?target, "handle re-resolved");
    if target.is_some() {
        graph.redraws.request(surface, format!("{key} reference changed"));
    }
    graph.with_behavior(scene, id, |behavior, cx| behavior.on_handle_changed(key, target, cx));
}

fn on_node_inserted(graph: &mut AdapterGraph, scene: &SceneGraph, id: AdapterId, event: &ChangeEvent) {
    let ChangeEvent::NodeInserted { affected, mutation, forwarded } = event else {
        return;
    };
    let Some((concern, surface)) = graph
        .index
        .slots
        .get(&id)
        .filter(|slot| slot.lifecycle.is_live())
        .map(|slot| (slot.concern, slot.surface))
    else {
        return;
    };

    if !*forwarded {
        if let Some(targets) = graph.endpoint_targets(scene, *affected) {
            tracing::trace!(adapter = %id, node = %affected, targets = targets.len(), "insertion forwarded to endpoints");
            let forward = ChangeEvent::NodeInserted {
                affected: *affected,
                mutation: mutation.clone(),
                forwarded: true,
            };
            for target in targets {
                graph.notify(scene, target, &forward);
            }
            return;
        }
    }
    graph.init_subtree(scene, *affected, concern, surface);
}

fn on_node_removed(_graph: &mut AdapterGraph, _scene: &SceneGraph, id: AdapterId, event: &ChangeEvent) {
    if let ChangeEvent::NodeRemoved { node } = event {
        tracing::trace!(adapter = %id, %node, "child removed");
    }
}

fn on_this_removed(graph: &mut AdapterGraph, _scene: &SceneGraph, id: AdapterId, _event: &ChangeEvent) {
    let Some(slot) = graph.index.slots.get_mut(&id) else {
        return;
    };
    if !slot.lifecycle.advance(Lifecycle::Disposed) {
        return;
    }
    slot.handles.clear();
    if let Some(behavior) = slot.behavior.as_mut() {
        behavior.on_dispose();
    }
    graph.graveyard.push(id);
    graph.stats.disposed += 1;
    tracing::trace!(adapter = %id, "adapter disposed");
}
