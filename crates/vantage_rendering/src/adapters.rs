//! Render and data adapters shipped with the core.
//!
//! - [`SurfaceRenderAdapter`] sits on a surface root. It tracks the active
//!   view and owns the surface's [`ReadyLatch`].
//! - [`NodeRenderAdapter`] sits on every other render node and turns
//!   material and attribute changes into redraw requests.
//! - [`ImageDataAdapter`] loads `<img>` sources lazily and counts the load
//!   against the global resource counter.

use std::any::Any;

use vantage_core::{
    AdapterBehavior, AdapterCx, AdapterFactory, AdapterSite, Capabilities, Concern, LoadTracker,
    RedrawSender, ResourceLoadGate, VisualNode,
};
use vantage_shared::{AdapterId, NodeId, SurfaceId};

/// Handle key of the root's view reference.
pub const ACTIVE_VIEW_KEY: &str = "activeView";
/// Handle key of a node's material reference.
pub const MATERIAL_KEY: &str = "material";
/// Tag of view nodes.
pub const VIEW_TAG: &str = "view";

/// Emits a surface's `load` signal once all its resources are in and a
/// frame has been drawn with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyLatch {
    surface: SurfaceId,
    ready_pending: bool,
    first_ready: bool,
    rearm: bool,
}

impl ReadyLatch {
    /// Creates a latch. With `rearm` the signal can fire again after later
    /// loads complete.
    #[must_use]
    pub const fn new(surface: SurfaceId, rearm: bool) -> Self {
        Self {
            surface,
            ready_pending: false,
            first_ready: false,
            rearm,
        }
    }

    fn loads_done(&self, gate: &ResourceLoadGate) -> bool {
        gate.is_load_complete(SurfaceId::GLOBAL) && gate.is_load_complete(self.surface)
    }

    /// A load counter reached zero. Arms the latch if both the global and
    /// the surface counter are clear.
    pub fn on_load_complete(&mut self, gate: &ResourceLoadGate) {
        if self.first_ready && !self.rearm {
            return;
        }
        if self.loads_done(gate) {
            self.ready_pending = true;
        }
    }

    /// A frame was drawn. Returns true if the `load` signal must fire now.
    pub fn on_frame_drawn(&mut self, gate: &ResourceLoadGate) -> bool {
        if !std::mem::take(&mut self.ready_pending) {
            return false;
        }
        if !self.loads_done(gate) {
            return false;
        }
        self.first_ready = true;
        tracing::debug!(surface = %self.surface, "surface ready");
        true
    }

    /// True once the signal fired, nothing is pending, and both counters are
    /// clear.
    #[must_use]
    pub fn is_complete(&self, gate: &ResourceLoadGate) -> bool {
        !self.ready_pending && self.first_ready && self.loads_done(gate)
    }

    /// Returns true if a fire is waiting for the next frame.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.ready_pending
    }
}

/// Render adapter of a surface root.
pub struct SurfaceRenderAdapter {
    latch: ReadyLatch,
    active_view: Option<NodeId>,
    view_changed: bool,
}

impl SurfaceRenderAdapter {
    /// Creates the adapter for `surface`.
    #[must_use]
    pub const fn new(surface: SurfaceId, rearm: bool) -> Self {
        Self {
            latch: ReadyLatch::new(surface, rearm),
            active_view: None,
            view_changed: false,
        }
    }

    /// View node the surface renders from.
    #[must_use]
    pub const fn active_view(&self) -> Option<NodeId> {
        self.active_view
    }

    /// Returns the new view if it changed since the last call.
    pub fn take_view_change(&mut self) -> Option<Option<NodeId>> {
        std::mem::take(&mut self.view_changed).then_some(self.active_view)
    }

    /// The surface's ready latch.
    #[must_use]
    pub const fn latch(&self) -> &ReadyLatch {
        &self.latch
    }

    /// Mutable ready latch.
    pub fn latch_mut(&mut self) -> &mut ReadyLatch {
        &mut self.latch
    }

    fn update_view_handle(cx: &mut AdapterCx<'_>) {
        let reference = cx
            .scene()
            .node(cx.node())
            .and_then(|n| view_reference(n).map(str::to_owned));
        match reference {
            Some(reference) => {
                cx.connect_handle(ACTIVE_VIEW_KEY, &reference);
            }
            None => cx.disconnect_handle(ACTIVE_VIEW_KEY),
        }
    }

    fn select_view(&mut self, cx: &AdapterCx<'_>) {
        let view = cx
            .connected(ACTIVE_VIEW_KEY)
            .and_then(|adapter| cx.adapter_node(adapter))
            .or_else(|| cx.scene().first_descendant_with_tag(cx.node(), VIEW_TAG));
        if view.is_none() {
            tracing::warn!(root = %cx.node(), "surface has no view defined");
        }
        if view != self.active_view {
            tracing::debug!(root = %cx.node(), ?view, "active view changed");
            self.active_view = view;
            self.view_changed = true;
        }
    }
}

fn view_reference(node: &VisualNode) -> Option<&str> {
    node.attributes()
        .find(|(name, _)| name.eq_ignore_ascii_case(ACTIVE_VIEW_KEY))
        .map(|(_, value)| value)
        .filter(|value| !value.trim().is_empty())
}

impl AdapterBehavior for SurfaceRenderAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RENDER
    }

    fn on_configured(&mut self, cx: &mut AdapterCx<'_>) {
        Self::update_view_handle(cx);
        self.select_view(cx);
    }

    fn on_handle_changed(&mut self, key: &str, _target: Option<AdapterId>, cx: &mut AdapterCx<'_>) {
        if key == ACTIVE_VIEW_KEY {
            self.select_view(cx);
        }
    }

    fn on_attribute_changed(&mut self, name: &str, _old: Option<&str>, _new: Option<&str>, cx: &mut AdapterCx<'_>) {
        if name.eq_ignore_ascii_case(ACTIVE_VIEW_KEY) {
            Self::update_view_handle(cx);
            self.select_view(cx);
            cx.request_redraw("Active view changed.");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Render adapter of a non-root node.
#[derive(Debug, Default)]
pub struct NodeRenderAdapter {
    material: Option<AdapterId>,
}

impl NodeRenderAdapter {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self { material: None }
    }

    /// Render adapter of the connected material, if any.
    #[must_use]
    pub const fn material(&self) -> Option<AdapterId> {
        self.material
    }

    fn update_material_handle(&mut self, cx: &mut AdapterCx<'_>) {
        let reference = cx
            .scene()
            .node(cx.node())
            .and_then(|n| n.attribute(MATERIAL_KEY))
            .map(str::to_owned);
        self.material = match reference {
            Some(reference) => cx.connect_handle(MATERIAL_KEY, &reference),
            None => {
                cx.disconnect_handle(MATERIAL_KEY);
                None
            }
        };
    }
}

impl AdapterBehavior for NodeRenderAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RENDER
    }

    fn on_configured(&mut self, cx: &mut AdapterCx<'_>) {
        self.update_material_handle(cx);
        cx.request_redraw("Render node added.");
    }

    fn on_handle_changed(&mut self, key: &str, target: Option<AdapterId>, cx: &mut AdapterCx<'_>) {
        if key == MATERIAL_KEY {
            self.material = target;
            cx.request_redraw("Material reference changed.");
        }
    }

    fn on_attribute_changed(&mut self, name: &str, _old: Option<&str>, _new: Option<&str>, cx: &mut AdapterCx<'_>) {
        if name == MATERIAL_KEY {
            self.update_material_handle(cx);
        }
        cx.request_redraw("Attribute changed.");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Creates surface-root and node render adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderAdapterFactory {
    rearm_ready_signal: bool,
}

impl RenderAdapterFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new(rearm_ready_signal: bool) -> Self {
        Self { rearm_ready_signal }
    }
}

impl AdapterFactory for RenderAdapterFactory {
    fn concern(&self) -> Concern {
        Concern::Render
    }

    fn create(&self, _node: &VisualNode, site: AdapterSite) -> Option<Box<dyn AdapterBehavior>> {
        if site.is_surface_root {
            Some(Box::new(SurfaceRenderAdapter::new(site.surface, self.rearm_ready_signal)))
        } else {
            Some(Box::new(NodeRenderAdapter::new()))
        }
    }
}

/// Load state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Nothing requested yet.
    Unloaded,
    /// Load in flight, counted against the global counter.
    Loading,
    /// Decoded and ready.
    Loaded,
    /// The load failed.
    Failed,
}

/// Data adapter of an `<img>` node.
pub struct ImageDataAdapter {
    surface: SurfaceId,
    src: Option<String>,
    state: ImageState,
    tracker: LoadTracker,
    redraws: RedrawSender,
}

impl ImageDataAdapter {
    /// Output names of an image node.
    pub const OUTPUTS: &'static [&'static str] = &["image"];

    /// Creates the adapter.
    #[must_use]
    pub fn new(surface: SurfaceId, src: Option<String>, tracker: LoadTracker, redraws: RedrawSender) -> Self {
        Self {
            surface,
            src,
            state: ImageState::Unloaded,
            tracker,
            redraws,
        }
    }

    /// Image source.
    #[must_use]
    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    /// Load state.
    #[must_use]
    pub const fn state(&self) -> ImageState {
        self.state
    }

    /// Output names.
    #[must_use]
    pub const fn outputs(&self) -> &'static [&'static str] {
        Self::OUTPUTS
    }

    /// Requests the image, starting the load on first use.
    pub fn value(&mut self) -> ImageState {
        if self.state == ImageState::Unloaded && self.src.is_some() {
            self.tracker.begin(SurfaceId::GLOBAL);
            self.state = ImageState::Loading;
            tracing::debug!(src = ?self.src, "image load started");
        }
        self.state
    }

    /// Reports the outcome of the load in flight. Returns false if none was.
    pub fn finish(&mut self, ok: bool) -> bool {
        if self.state != ImageState::Loading {
            return false;
        }
        self.tracker.finish(SurfaceId::GLOBAL);
        if ok {
            self.state = ImageState::Loaded;
            self.redraws.request_without_picking(self.surface, "Image loaded.");
        } else {
            self.state = ImageState::Failed;
            tracing::warn!(src = ?self.src, "image load failed");
        }
        true
    }

    fn abandon(&mut self) {
        if self.state == ImageState::Loading {
            self.tracker.finish(SurfaceId::GLOBAL);
        }
        self.state = ImageState::Unloaded;
    }
}

impl AdapterBehavior for ImageDataAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::DATA
    }

    fn on_attribute_changed(&mut self, name: &str, _old: Option<&str>, new: Option<&str>, cx: &mut AdapterCx<'_>) {
        if name == "src" {
            self.abandon();
            self.src = new.map(str::to_owned);
            cx.request_redraw_without_picking("Image source changed.");
        }
    }

    fn on_dispose(&mut self) {
        self.abandon();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Creates data adapters.
pub struct DataAdapterFactory {
    tracker: LoadTracker,
    redraws: RedrawSender,
}

impl DataAdapterFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new(tracker: LoadTracker, redraws: RedrawSender) -> Self {
        Self { tracker, redraws }
    }
}

impl AdapterFactory for DataAdapterFactory {
    fn concern(&self) -> Concern {
        Concern::Data
    }

    fn create(&self, node: &VisualNode, site: AdapterSite) -> Option<Box<dyn AdapterBehavior>> {
        if node.tag() != "img" {
            return None;
        }
        Some(Box::new(ImageDataAdapter::new(
            site.surface,
            node.attribute("src").map(str::to_owned),
            self.tracker.clone(),
            self.redraws.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::{AdapterGraph, RedrawQueue, SceneGraph};

    struct Fixture {
        scene: SceneGraph,
        graph: AdapterGraph,
        redraws: RedrawQueue,
        gate: ResourceLoadGate,
        root: NodeId,
    }

    fn fixture() -> Fixture {
        let redraws = RedrawQueue::new();
        let gate = ResourceLoadGate::new();
        let mut graph = AdapterGraph::new(redraws.sender());
        graph.register_factory(Box::new(RenderAdapterFactory::new(false)));
        graph.register_factory(Box::new(DataAdapterFactory::new(gate.tracker(), redraws.sender())));
        let mut scene = SceneGraph::new();
        let root = scene.create_node("xml3d");
        Fixture {
            scene,
            graph,
            redraws,
            gate,
            root,
        }
    }

    impl Fixture {
        fn add(&mut self, parent: NodeId, tag: &str) -> NodeId {
            let node = self.scene.create_node(tag);
            self.scene.append_child(parent, node).unwrap();
            node
        }

        fn flush(&mut self) {
            let mutations = self.scene.take_mutations();
            self.graph.process(&self.scene, mutations);
        }

        fn root_adapter(&mut self) -> &mut SurfaceRenderAdapter {
            let id = self.graph.adapter_for(self.root, Concern::Render).unwrap();
            self.graph.behavior_mut::<SurfaceRenderAdapter>(id).unwrap()
        }
    }

    #[test]
    fn test_latch_fires_once_after_draw() {
        let gate = ResourceLoadGate::new();
        let mut latch = ReadyLatch::new(SurfaceId(1), false);
        assert!(!latch.on_frame_drawn(&gate));

        latch.on_load_complete(&gate);
        assert!(latch.is_pending());
        assert!(!latch.is_complete(&gate));
        assert!(latch.on_frame_drawn(&gate));
        assert!(latch.is_complete(&gate));
        assert!(!latch.on_frame_drawn(&gate));

        latch.on_load_complete(&gate);
        assert!(!latch.is_pending());
    }

    #[test]
    fn test_latch_waits_for_both_counters() {
        let mut gate = ResourceLoadGate::new();
        let mut latch = ReadyLatch::new(SurfaceId(1), false);
        gate.begin_load(SurfaceId::GLOBAL);
        latch.on_load_complete(&gate);
        assert!(!latch.is_pending());

        gate.finish_load(SurfaceId::GLOBAL);
        latch.on_load_complete(&gate);
        gate.begin_load(SurfaceId(1));
        assert!(!latch.on_frame_drawn(&gate));
        assert!(!latch.is_complete(&gate));
    }

    #[test]
    fn test_latch_rearm() {
        let gate = ResourceLoadGate::new();
        let mut latch = ReadyLatch::new(SurfaceId(1), true);
        latch.on_load_complete(&gate);
        assert!(latch.on_frame_drawn(&gate));
        latch.on_load_complete(&gate);
        assert!(latch.on_frame_drawn(&gate));
    }

    #[test]
    fn test_root_falls_back_to_first_view() {
        let mut fx = fixture();
        let group = fx.add(fx.root, "group");
        let view = fx.add(group, "view");
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));

        let root = fx.root_adapter();
        assert_eq!(root.active_view(), Some(view));
        assert_eq!(root.take_view_change(), Some(Some(view)));
        assert_eq!(root.take_view_change(), None);
    }

    #[test]
    fn test_active_view_attribute_selects_view() {
        let mut fx = fixture();
        let first = fx.add(fx.root, "view");
        let second = fx.add(fx.root, "view");
        fx.scene.set_attribute(second, "id", "cam2").unwrap();
        fx.scene.take_mutations();
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));
        assert_eq!(fx.root_adapter().active_view(), Some(first));

        fx.scene.set_attribute(fx.root, "activeview", "#cam2").unwrap();
        fx.flush();
        assert_eq!(fx.root_adapter().active_view(), Some(second));
    }

    #[test]
    fn test_missing_view_leaves_none() {
        let mut fx = fixture();
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));
        assert_eq!(fx.root_adapter().active_view(), None);
        assert_eq!(fx.root_adapter().take_view_change(), None);
    }

    #[test]
    fn test_material_change_requests_redraw() {
        let mut fx = fixture();
        let mesh = fx.add(fx.root, "mesh");
        fx.scene.set_attribute(mesh, "material", "#metal").unwrap();
        fx.scene.take_mutations();
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));
        fx.redraws.drain();

        let shader = fx.add(fx.root, "shader");
        fx.scene.set_attribute(shader, "id", "metal").unwrap();
        fx.flush();

        let causes: Vec<String> = fx.redraws.drain().into_iter().map(|r| r.cause).collect();
        assert!(causes.iter().any(|c| c == "Material reference changed."));

        let mesh_adapter = fx.graph.adapter_for(mesh, Concern::Render).unwrap();
        let shader_adapter = fx.graph.adapter_for(shader, Concern::Render);
        assert_eq!(fx.graph.behavior::<NodeRenderAdapter>(mesh_adapter).unwrap().material(), shader_adapter);
    }

    #[test]
    fn test_image_load_is_lazy_and_counted() {
        let mut fx = fixture();
        let img = fx.add(fx.root, "img");
        fx.scene.set_attribute(img, "src", "brick.png").unwrap();
        fx.scene.take_mutations();
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));
        fx.gate.pump();
        assert!(fx.gate.is_load_complete(SurfaceId::GLOBAL));

        let id = fx.graph.adapter_for(img, Concern::Data).unwrap();
        let image = fx.graph.behavior_mut::<ImageDataAdapter>(id).unwrap();
        assert_eq!(image.outputs(), &["image"]);
        assert_eq!(image.value(), ImageState::Loading);
        assert_eq!(image.value(), ImageState::Loading);
        fx.gate.pump();
        assert_eq!(fx.gate.pending(SurfaceId::GLOBAL), 1);

        fx.redraws.drain();
        let image = fx.graph.behavior_mut::<ImageDataAdapter>(id).unwrap();
        assert!(image.finish(true));
        assert!(!image.finish(true));
        assert_eq!(fx.gate.pump(), vec![]);
        assert!(fx.gate.is_load_complete(SurfaceId::GLOBAL));

        let requests = fx.redraws.drain();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].picking);
    }

    #[test]
    fn test_removed_image_releases_pending_load() {
        let mut fx = fixture();
        let img = fx.add(fx.root, "img");
        fx.scene.set_attribute(img, "src", "brick.png").unwrap();
        fx.scene.take_mutations();
        fx.graph.attach_root(&fx.scene, fx.root, SurfaceId(1));

        let id = fx.graph.adapter_for(img, Concern::Data).unwrap();
        fx.graph.behavior_mut::<ImageDataAdapter>(id).unwrap().value();
        fx.gate.pump();
        assert_eq!(fx.gate.pending(SurfaceId::GLOBAL), 1);

        fx.scene.remove_child(fx.root, img).unwrap();
        fx.flush();
        fx.gate.pump();
        assert!(fx.gate.is_load_complete(SurfaceId::GLOBAL));
    }
}
