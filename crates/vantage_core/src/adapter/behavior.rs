//! Adapter behaviors, their factories and the scoped context they run in.

use std::any::Any;
use std::collections::BTreeMap;

use vantage_shared::{AdapterId, NodeId, SurfaceId, UiEvent};

use super::graph::{AdapterIndex, Command, HandleBinding};
use super::{Capabilities, Concern};
use crate::redraw::RedrawSender;
use crate::scene::{SceneGraph, VisualNode};

/// Concern-specific adapter logic.
///
/// Every callback runs synchronously on the scheduling thread. Callbacks
/// cannot reach other behaviors; anything structural goes through the
/// [`AdapterCx`].
pub trait AdapterBehavior: Any {
    /// Capability set, read once when the adapter is created.
    fn capabilities(&self) -> Capabilities;

    /// Called once after creation.
    fn on_configured(&mut self, _cx: &mut AdapterCx<'_>) {}

    /// A handle was re-resolved. `target` is the newly connected adapter.
    fn on_handle_changed(&mut self, _key: &str, _target: Option<AdapterId>, _cx: &mut AdapterCx<'_>) {}

    /// An attribute of the adapter's node changed.
    fn on_attribute_changed(
        &mut self,
        _name: &str,
        _old: Option<&str>,
        _new: Option<&str>,
        _cx: &mut AdapterCx<'_>,
    ) {
    }

    /// Called once when the adapter is disposed.
    fn on_dispose(&mut self) {}

    /// Delivers an interaction event. Returns the number of listeners run.
    fn deliver(&mut self, _event: &UiEvent) -> usize {
        0
    }

    /// Upcast for downcasting by embedders.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting by embedders.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Where a new adapter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSite {
    /// Surface the node belongs to.
    pub surface: SurfaceId,
    /// True if the node is the surface root.
    pub is_surface_root: bool,
}

/// Creates behaviors of one concern.
pub trait AdapterFactory {
    /// Concern served by this factory.
    fn concern(&self) -> Concern;

    /// Creates a behavior for `node`, or `None` if the node needs none.
    fn create(&self, node: &VisualNode, site: AdapterSite) -> Option<Box<dyn AdapterBehavior>>;
}

/// Scoped access handed to a behavior callback.
pub struct AdapterCx<'a> {
    pub(super) id: AdapterId,
    pub(super) node: NodeId,
    pub(super) surface: SurfaceId,
    pub(super) concern: Concern,
    pub(super) scene: &'a SceneGraph,
    pub(super) handles: &'a mut BTreeMap<String, HandleBinding>,
    pub(super) index: &'a AdapterIndex,
    pub(super) redraws: &'a RedrawSender,
    pub(super) commands: &'a mut Vec<Command>,
}

impl AdapterCx<'_> {
    /// This adapter's id.
    #[must_use]
    pub const fn id(&self) -> AdapterId {
        self.id
    }

    /// This adapter's node.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Surface the node belongs to.
    #[must_use]
    pub const fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// This adapter's concern.
    #[must_use]
    pub const fn concern(&self) -> Concern {
        self.concern
    }

    /// Read-only scene access.
    #[must_use]
    pub fn scene(&self) -> &SceneGraph {
        self.scene
    }

    /// Binds a named handle to a `#id` reference and resolves it now.
    ///
    /// A later change of the referenced target is reported through
    /// [`AdapterBehavior::on_handle_changed`].
    pub fn connect_handle(&mut self, key: &str, reference: &str) -> Option<AdapterId> {
        let connected = self.index.resolve(self.scene, self.concern, reference);
        tracing::trace!(adapter = %self.id, key, reference, ?connected, "handle connected");
        self.handles.insert(
            key.to_owned(),
            HandleBinding {
                reference: reference.to_owned(),
                connected,
            },
        );
        connected
    }

    /// Drops a named handle.
    pub fn disconnect_handle(&mut self, key: &str) {
        self.handles.remove(key);
    }

    /// Adapter currently connected through a handle.
    #[must_use]
    pub fn connected(&self, key: &str) -> Option<AdapterId> {
        self.handles.get(key).and_then(|binding| binding.connected)
    }

    /// Queues a scene-affecting redraw of this adapter's surface.
    pub fn request_redraw(&self, cause: &str) {
        self.redraws.request(self.surface, cause);
    }

    /// Queues a redraw that keeps the pick buffer valid.
    pub fn request_redraw_without_picking(&self, cause: &str) {
        self.redraws.request_without_picking(self.surface, cause);
    }

    /// Creates adapters of this concern for `root` and its descendants once
    /// the current callback returns.
    pub fn init_subtree(&mut self, root: NodeId) {
        self.commands.push(Command::InitSubtree {
            root,
            concern: self.concern,
            surface: self.surface,
        });
    }

    /// Node of another adapter.
    #[must_use]
    pub fn adapter_node(&self, id: AdapterId) -> Option<NodeId> {
        self.index.node_of(id)
    }

    /// Capabilities of another adapter.
    #[must_use]
    pub fn adapter_capabilities(&self, id: AdapterId) -> Option<Capabilities> {
        self.index.capabilities_of(id)
    }
}
