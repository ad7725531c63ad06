//! # Surfaces
//!
//! One attached render target: the device, its frame scheduler, its picker
//! and its pointer state machine. Surfaces are owned by the
//! [`crate::Context`]; the adapter graph they deliver into is shared.

use vantage_core::{AdapterGraph, Concern};
use vantage_rendering::{FrameFlags, FrameScheduler, Picker, RenderDevice, SurfaceRenderAdapter};
use vantage_shared::{ListenerId, NodeId, SurfaceId, UiEvent};
use vantage_ui::{InteractionDispatcher, InteractionHost};

/// An attached surface.
pub struct Surface {
    id: SurfaceId,
    root: NodeId,
    device: Box<dyn RenderDevice>,
    scheduler: FrameScheduler,
    picker: Picker,
    dispatcher: InteractionDispatcher,
    load_listener: ListenerId,
    touch_events: bool,
}

impl Surface {
    pub(crate) fn new(
        id: SurfaceId,
        root: NodeId,
        device: Box<dyn RenderDevice>,
        scheduler: FrameScheduler,
        picker: Picker,
        dispatcher: InteractionDispatcher,
        load_listener: ListenerId,
    ) -> Self {
        Self {
            id,
            root,
            device,
            scheduler,
            picker,
            dispatcher,
            load_listener,
            touch_events: true,
        }
    }

    /// Surface id.
    #[must_use]
    pub const fn id(&self) -> SurfaceId {
        self.id
    }

    /// Root node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Render device.
    #[must_use]
    pub fn device(&self) -> &dyn RenderDevice {
        self.device.as_ref()
    }

    /// Mutable render device.
    pub fn device_mut(&mut self) -> &mut dyn RenderDevice {
        self.device.as_mut()
    }

    /// Render device downcast to its concrete type.
    #[must_use]
    pub fn device_as<T: RenderDevice + 'static>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    /// Mutable render device downcast to its concrete type.
    pub fn device_as_mut<T: RenderDevice + 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }

    /// Frame scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Mutable frame scheduler, for listeners and the post-process chain.
    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler {
        &mut self.scheduler
    }

    /// Picker.
    #[must_use]
    pub const fn picker(&self) -> &Picker {
        &self.picker
    }

    /// Pointer state machine.
    #[must_use]
    pub const fn dispatcher(&self) -> &InteractionDispatcher {
        &self.dispatcher
    }

    /// Declares whether the host can build touch events.
    pub fn set_touch_events_supported(&mut self, supported: bool) {
        self.touch_events = supported;
    }

    pub(crate) const fn load_listener(&self) -> ListenerId {
        self.load_listener
    }

    pub(crate) fn set_move_picking(&mut self, enabled: bool) {
        self.dispatcher.set_move_picking(enabled);
    }

    pub(crate) fn parts(&mut self) -> (&mut dyn RenderDevice, &mut FrameScheduler, &mut Picker) {
        (self.device.as_mut(), &mut self.scheduler, &mut self.picker)
    }

    /// Splits the surface into its dispatcher and a host over everything
    /// else.
    pub(crate) fn split<'a>(
        &'a mut self,
        adapters: &'a mut AdapterGraph,
    ) -> (&'a mut InteractionDispatcher, SurfaceHost<'a>) {
        let host = SurfaceHost {
            device: self.device.as_mut(),
            flags: self.scheduler.flags_mut(),
            picker: &mut self.picker,
            adapters,
            touch_events: self.touch_events,
        };
        (&mut self.dispatcher, host)
    }
}

/// Borrowed view of a surface handed to the dispatcher.
pub(crate) struct SurfaceHost<'a> {
    device: &'a mut dyn RenderDevice,
    flags: &'a mut FrameFlags,
    picker: &'a mut Picker,
    adapters: &'a mut AdapterGraph,
    touch_events: bool,
}

impl InteractionHost for SurfaceHost<'_> {
    fn pick(&mut self, x: f32, y: f32) -> Option<NodeId> {
        self.picker.render_pick(&mut *self.device, self.flags, x, y)
    }

    fn invalidate_picking(&mut self) {
        Picker::invalidate(self.flags);
    }

    fn deliver(&mut self, target: NodeId, event: &UiEvent) -> usize {
        self.adapters.deliver_event(target, event)
    }

    fn supports_touch_events(&self) -> bool {
        self.touch_events
    }
}

/// Render adapter of a surface root.
pub(crate) fn root_adapter(adapters: &mut AdapterGraph, root: NodeId) -> Option<&mut SurfaceRenderAdapter> {
    let id = adapters.adapter_for(root, Concern::Render)?;
    adapters.behavior_mut::<SurfaceRenderAdapter>(id)
}
