//! # Context
//!
//! The composition root. One context owns the scene graph, the adapter
//! graph, the resource load gate, the redraw queue and every attached
//! surface. Host callbacks (frame, pointer, touch, resize) enter through it.
//!
//! ```text
//! Context::tick(surface):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. SYNC                                                      │
//! │    ├─ apply pending scene mutations to the adapter graph     │
//! │    ├─ pump load reports, arm ready latches                   │
//! │    └─ route redraw requests to schedulers                    │
//! │                                                              │
//! │ 2. PREPARE                                                   │
//! │    ├─ hand a changed active view to the device               │
//! │    └─ read post-process visibility                           │
//! │                                                              │
//! │ 3. FRAME                                                     │
//! │    └─ FrameScheduler::tick (update listeners, draw, re-arm)  │
//! │                                                              │
//! │ 4. READY                                                     │
//! │    └─ drawn + latch armed → `load` event on the root         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::rc::Rc;

use vantage_core::{
    AdapterGraph, Concern, LoadTracker, RedrawQueue, RedrawRequest, ResourceLoadGate, SceneError, SceneGraph,
};
use vantage_rendering::adapters::VIEW_TAG;
use vantage_rendering::postprocess::POSTPROCESS_TAG;
use vantage_rendering::{
    Clock, DataAdapterFactory, FrameScheduler, FrameSource, ImageDataAdapter, ImageState, PickQuery, PickResult,
    Picker, PostProcessChain, RenderAdapterFactory, RenderDevice, SurfaceRenderAdapter, TextureHandle,
};
use vantage_shared::{
    EventKind, ListenerId, NodeId, PointerInput, Ray, SurfaceId, TouchInput, UiEvent, Vec3, VantageConfig,
};
use vantage_ui::{EventAdapter, EventAdapterFactory, HandlerTable, InteractionDispatcher, Listener};

use crate::error::{VantageError, VantageResult};
use crate::surface::{root_adapter, Surface, SurfaceHost};

/// Result of one [`Context::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// A frame was drawn.
    pub drawn: bool,
    /// An update listener asked for the draw.
    pub update_changed: bool,
    /// The surface's `load` signal fired after this frame.
    pub ready: bool,
}

/// Owner of the scene and every surface drawing it.
pub struct Context {
    config: VantageConfig,
    scene: SceneGraph,
    adapters: AdapterGraph,
    loads: ResourceLoadGate,
    redraws: RedrawQueue,
    handlers: Rc<HandlerTable>,
    surfaces: BTreeMap<SurfaceId, Surface>,
    next_surface: u32,
}

impl Context {
    /// Creates a context with an empty scene.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::Config`] if `config` fails validation.
    pub fn new(config: VantageConfig) -> VantageResult<Self> {
        config.validate()?;

        let redraws = RedrawQueue::new();
        let loads = ResourceLoadGate::new();
        let handlers = Rc::new(HandlerTable::new());

        let mut adapters = AdapterGraph::new(redraws.sender());
        adapters.register_factory(Box::new(RenderAdapterFactory::new(config.rearm_ready_signal)));
        adapters.register_factory(Box::new(DataAdapterFactory::new(loads.tracker(), redraws.sender())));
        adapters.register_factory(Box::new(EventAdapterFactory::new(Rc::clone(&handlers))));

        Ok(Self {
            config,
            scene: SceneGraph::new(),
            adapters,
            loads,
            redraws,
            handlers,
            surfaces: BTreeMap::new(),
            next_surface: 1,
        })
    }

    /// Creates a context from TOML configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::Config`] for malformed or invalid text.
    pub fn from_toml_str(text: &str) -> VantageResult<Self> {
        Self::new(VantageConfig::from_toml_str(text)?)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &VantageConfig {
        &self.config
    }

    /// Scene graph.
    #[must_use]
    pub const fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// Mutable scene graph. Edits reach the adapters on the next tick, pick
    /// or explicit [`Context::flush`].
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    /// Adapter graph.
    #[must_use]
    pub const fn adapters(&self) -> &AdapterGraph {
        &self.adapters
    }

    /// Mutable adapter graph, for custom factories and handlers.
    pub fn adapters_mut(&mut self) -> &mut AdapterGraph {
        &mut self.adapters
    }

    /// Resource load gate.
    #[must_use]
    pub const fn loads(&self) -> &ResourceLoadGate {
        &self.loads
    }

    /// Tracker for reporting loads, from any thread.
    #[must_use]
    pub fn load_tracker(&self) -> LoadTracker {
        self.loads.tracker()
    }

    /// Named handlers resolved by `on<type>` attributes.
    #[must_use]
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Attached surface.
    #[must_use]
    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Mutable attached surface.
    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Attached surface ids, in attach order.
    pub fn surface_ids(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.surfaces.keys().copied()
    }

    fn surface_entry(&mut self, id: SurfaceId) -> VantageResult<&mut Surface> {
        self.surfaces.get_mut(&id).ok_or(VantageError::UnknownSurface(id))
    }

    /// Attaches `root` as a new surface drawn by `device`.
    ///
    /// A `<view>` child is created if the subtree has none. The post-process
    /// chain is read from the root's `<postprocess>` child once, here.
    ///
    /// # Errors
    ///
    /// Fails if `root` does not exist or already roots a surface.
    pub fn attach_surface(
        &mut self,
        root: NodeId,
        mut device: Box<dyn RenderDevice>,
        clock: Box<dyn Clock>,
    ) -> VantageResult<SurfaceId> {
        if !self.scene.contains(root) {
            return Err(SceneError::NodeNotFound(root).into());
        }
        if let Some(surface) = self.surfaces.values().find(|s| s.root() == root) {
            return Err(VantageError::RootInUse {
                root,
                surface: surface.id(),
            });
        }

        if self.scene.first_descendant_with_tag(root, VIEW_TAG).is_none() {
            tracing::warn!(%root, "no view defined, creating a default view");
            let view = self.scene.create_node(VIEW_TAG);
            self.scene.append_child(root, view)?;
        }
        self.flush();

        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        let created = self.adapters.attach_root(&self.scene, root, id);

        let mut scheduler = FrameScheduler::new(id, clock, self.config.render_texture_size);
        scheduler.set_postprocess(PostProcessChain::from_scene(&self.scene, root));

        let load_listener = self.loads.add_listener(id);
        if let Some(adapter) = root_adapter(&mut self.adapters, root) {
            adapter.latch_mut().on_load_complete(&self.loads);
            if let Some(view) = adapter.take_view_change() {
                device.set_active_view(view);
            }
        }

        let surface = Surface::new(
            id,
            root,
            device,
            scheduler,
            Picker::new(self.config.picking),
            InteractionDispatcher::new(root, self.config.click_slop_px, self.config.move_picking),
            load_listener,
        );
        self.surfaces.insert(id, surface);
        tracing::info!(surface = %id, %root, adapters = created, "surface attached");
        Ok(id)
    }

    /// Detaches a surface and disposes its adapters.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`] if it is not attached.
    pub fn detach_surface(&mut self, id: SurfaceId) -> VantageResult<()> {
        let surface = self.surfaces.remove(&id).ok_or(VantageError::UnknownSurface(id))?;
        self.adapters.detach_root(&self.scene, surface.root());
        self.loads.remove_listener(surface.load_listener());
        tracing::info!(surface = %id, root = %surface.root(), "surface detached");
        Ok(())
    }

    /// Applies pending scene mutations to the adapter graph.
    pub fn flush(&mut self) {
        if !self.scene.has_pending_mutations() {
            return;
        }
        let mutations = self.scene.take_mutations();
        self.adapters.process(&self.scene, mutations);
    }

    /// Flushes mutations, applies load reports and routes redraw requests.
    pub fn sync(&mut self) {
        self.flush();
        self.pump_loads();
        self.route_redraws();
    }

    fn pump_loads(&mut self) {
        for id in self.loads.pump() {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            if let Some(adapter) = root_adapter(&mut self.adapters, surface.root()) {
                adapter.latch_mut().on_load_complete(&self.loads);
            }
            surface.scheduler_mut().redraw(&RedrawRequest {
                surface: id,
                cause: "Resources loaded.".into(),
                picking: false,
            });
        }
    }

    fn route_redraws(&mut self) {
        for request in self.redraws.drain() {
            if request.surface.is_global() {
                for surface in self.surfaces.values_mut() {
                    surface.scheduler_mut().redraw(&request);
                }
            } else if let Some(surface) = self.surfaces.get_mut(&request.surface) {
                surface.scheduler_mut().redraw(&request);
            } else {
                tracing::debug!(surface = %request.surface, cause = %request.cause, "redraw for detached surface dropped");
            }
        }
    }

    /// Host frame callback for one surface.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`] or the draw failure. The
    /// frame source is re-armed either way.
    pub fn tick<F: FrameSource + ?Sized>(&mut self, id: SurfaceId, frames: &mut F) -> VantageResult<FrameReport> {
        // === SYNC ===
        self.sync();

        // === PREPARE ===
        let surface = self.surfaces.get_mut(&id).ok_or(VantageError::UnknownSurface(id))?;
        let root = surface.root();
        if let Some(view) = root_adapter(&mut self.adapters, root).and_then(|a| a.take_view_change()) {
            surface.device_mut().set_active_view(view);
        }
        let host = self.scene.first_child_with_tag(root, POSTPROCESS_TAG);
        if let (Some(host), Some(chain)) = (host, surface.scheduler_mut().postprocess_mut()) {
            chain.sync_visibility(&self.scene, host);
        }

        // === FRAME ===
        let (device, scheduler, _) = surface.parts();
        let outcome = scheduler.tick(device, frames)?;

        // === READY ===
        let mut ready = false;
        if outcome.drawn {
            if let Some(adapter) = root_adapter(&mut self.adapters, root) {
                ready = adapter.latch_mut().on_frame_drawn(&self.loads);
            }
        }
        if ready {
            let now = surface.scheduler().now_ms();
            let event = UiEvent::custom(EventKind::Load, now, false, true);
            self.adapters.deliver_event(root, &event);
            tracing::info!(surface = %id, "surface loaded");
        }

        Ok(FrameReport {
            drawn: outcome.drawn,
            update_changed: outcome.update_changed,
            ready,
        })
    }

    /// Returns true once the surface's `load` signal fired and nothing is
    /// loading.
    #[must_use]
    pub fn is_complete(&self, id: SurfaceId) -> bool {
        let Some(surface) = self.surfaces.get(&id) else {
            return false;
        };
        self.adapters
            .adapter_for(surface.root(), Concern::Render)
            .and_then(|adapter| self.adapters.behavior::<SurfaceRenderAdapter>(adapter))
            .is_some_and(|a| a.latch().is_complete(&self.loads))
    }

    /// Resizes a surface's device. Sizes below one pixel are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn resize(&mut self, id: SurfaceId, width: u32, height: u32) -> VantageResult<bool> {
        let surface = self.surface_entry(id)?;
        if width < 1 || height < 1 {
            tracing::debug!(surface = %id, width, height, "resize to empty size ignored");
            return Ok(false);
        }
        surface.device_mut().resize(width, height);
        surface.scheduler_mut().redraw(&RedrawRequest {
            surface: id,
            cause: "Surface resized.".into(),
            picking: true,
        });
        Ok(true)
    }

    /// Enables or disables hover picking on a surface.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn set_move_picking(&mut self, id: SurfaceId, enabled: bool) -> VantageResult<()> {
        self.surface_entry(id)?.set_move_picking(enabled);
        Ok(())
    }

    fn with_host<R>(
        &mut self,
        id: SurfaceId,
        f: impl FnOnce(&mut InteractionDispatcher, &mut SurfaceHost<'_>) -> R,
    ) -> VantageResult<R> {
        self.sync();
        let surface = self.surfaces.get_mut(&id).ok_or(VantageError::UnknownSurface(id))?;
        let (dispatcher, mut host) = surface.split(&mut self.adapters);
        Ok(f(dispatcher, &mut host))
    }

    /// Host pointer-down callback. Returns listeners run.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn pointer_down(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.pointer_down(host, input))
    }

    /// Host pointer-move callback.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn pointer_move(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.pointer_move(host, input))
    }

    /// Host pointer-up callback.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn pointer_up(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.pointer_up(host, input))
    }

    /// Host click callback.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn click(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.click(host, input))
    }

    /// Host wheel callback.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn wheel(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.wheel(host, input))
    }

    /// Host pointer-leave callback.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn pointer_leave(&mut self, id: SurfaceId, input: &PointerInput) -> VantageResult<usize> {
        self.with_host(id, |d, host| d.pointer_leave(host, input))
    }

    /// Host touch callback. The event is stamped with the surface clock.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn touch(&mut self, id: SurfaceId, kind: EventKind, input: &TouchInput) -> VantageResult<usize> {
        let now = self.surface_entry(id)?.scheduler().now_ms();
        self.with_host(id, |d, host| d.touch(host, kind, input, now))
    }

    /// Object, position and normal under a top-left-origin pixel.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn element_by_point(&mut self, id: SurfaceId, x: f32, y: f32, query: PickQuery) -> VantageResult<PickResult> {
        self.sync();
        let (device, scheduler, picker) = self.surface_entry(id)?.parts();
        Ok(picker.element_by_point(device, scheduler.flags_mut(), x, y, query))
    }

    /// Object, position and normal hit by a world-space ray.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn element_by_ray(&mut self, id: SurfaceId, ray: &Ray, query: PickQuery) -> VantageResult<PickResult> {
        self.sync();
        let (device, _, _) = self.surface_entry(id)?.parts();
        Ok(Picker::element_by_ray(device, ray, query))
    }

    /// World-space ray through a top-left-origin pixel.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn generate_ray(&self, id: SurfaceId, x: f32, y: f32) -> VantageResult<Ray> {
        let surface = self.surfaces.get(&id).ok_or(VantageError::UnknownSurface(id))?;
        Ok(Picker::generate_ray(surface.device(), x, y))
    }

    /// Normal of the last picked object under a pixel.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn picked_normal(&mut self, id: SurfaceId, x: f32, y: f32) -> VantageResult<Option<Vec3>> {
        let (device, _, picker) = self.surface_entry(id)?.parts();
        Ok(picker.picked_normal(device, x, y))
    }

    /// Render texture for a `#id` source, drawn on surface `id`.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::UnknownSurface`].
    pub fn rendered_texture(&mut self, id: SurfaceId, src: &str) -> VantageResult<Option<TextureHandle>> {
        let surface = self.surfaces.get_mut(&id).ok_or(VantageError::UnknownSurface(id))?;
        let (device, scheduler, _) = surface.parts();
        Ok(scheduler.rendered_texture(device, &self.scene, src))
    }

    /// Adds an event listener on a node.
    ///
    /// # Errors
    ///
    /// Returns [`VantageError::NoEventAdapter`] if the node is not under an
    /// attached root.
    pub fn add_event_listener(&mut self, node: NodeId, kind: EventKind, listener: Listener) -> VantageResult<ListenerId> {
        self.flush();
        let adapter = self.event_adapter(node).ok_or(VantageError::NoEventAdapter(node))?;
        Ok(adapter.add_listener(kind, listener))
    }

    /// Removes an event listener. Returns false if it was unknown.
    pub fn remove_event_listener(&mut self, node: NodeId, id: ListenerId) -> bool {
        self.event_adapter(node).is_some_and(|a| a.remove_listener(id))
    }

    fn event_adapter(&mut self, node: NodeId) -> Option<&mut EventAdapter> {
        let id = self.adapters.adapter_for(node, Concern::Events)?;
        self.adapters.behavior_mut::<EventAdapter>(id)
    }

    fn image_adapter(&mut self, node: NodeId) -> Option<&mut ImageDataAdapter> {
        self.flush();
        let id = self.adapters.adapter_for(node, Concern::Data)?;
        self.adapters.behavior_mut::<ImageDataAdapter>(id)
    }

    /// Requests an `<img>` node's image, starting its load on first use.
    /// Returns `None` for nodes without an image adapter.
    pub fn request_image(&mut self, node: NodeId) -> Option<ImageState> {
        self.image_adapter(node).map(ImageDataAdapter::value)
    }

    /// Reports the outcome of an `<img>` node's load. Returns false if no
    /// load was in flight.
    pub fn complete_image(&mut self, node: NodeId, ok: bool) -> bool {
        self.image_adapter(node).is_some_and(|a| a.finish(ok))
    }
}
