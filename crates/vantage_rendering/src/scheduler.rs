//! # Frame Scheduler
//!
//! One scheduler per surface. Redraws are requested, never executed on the
//! spot; the host's frame callback calls [`FrameScheduler::tick`], which
//! draws only when something changed.
//!
//! ```text
//! tick ──┬── update listeners (all of them)
//!        ├── draw() if changed || need_draw
//!        │     ├── textures marked dirty
//!        │     ├── scene -> Original -> post-process -> surface
//!        │     └── FrameDrawn listeners
//!        └── frames.request_frame()   (always)
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use vantage_core::RedrawRequest;
use vantage_shared::{FrameDrawnEvent, ListenerId, SurfaceId};

use crate::device::{BufferSlot, RenderDevice, RenderError, RenderTarget};
use crate::postprocess::{PostProcessChain, RenderTextureCache, TextureHandle, TextureSourceResolver};

/// Dirty flags of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags {
    /// The surface must be redrawn.
    pub need_draw: bool,
    /// The id buffer must be re-rendered before the next pick.
    pub need_picking_draw: bool,
}

impl Default for FrameFlags {
    fn default() -> Self {
        Self {
            need_draw: true,
            need_picking_draw: true,
        }
    }
}

/// Millisecond time source.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> f64;
}

/// Wall clock, milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    /// Creates a clock at `start` ms.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    /// Sets the clock.
    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Something that can schedule the next tick.
pub trait FrameSource {
    /// Asks for another tick.
    fn request_frame(&mut self);
}

/// Timer-driven frame source for hosts without a native frame callback.
///
/// Each `request_frame` arms a deadline one frame interval ahead.
#[derive(Debug)]
pub struct FallbackTimer<C: Clock> {
    clock: C,
    interval_ms: f64,
    deadline: Option<f64>,
    requested: u64,
}

impl<C: Clock> FallbackTimer<C> {
    /// Creates a timer targeting `max_fps` (clamped to at least 1).
    #[must_use]
    pub fn new(clock: C, max_fps: u32) -> Self {
        Self {
            clock,
            interval_ms: 1000.0 / f64::from(max_fps.max(1)),
            deadline: None,
            requested: 0,
        }
    }

    /// Frame interval in ms.
    #[must_use]
    pub const fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Armed deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    /// Number of frames requested so far.
    #[must_use]
    pub const fn requested(&self) -> u64 {
        self.requested
    }

    /// Returns true if the armed deadline has passed.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.deadline.is_some_and(|d| self.clock.now_ms() >= d)
    }

    /// Disarms and returns true if the deadline has passed.
    pub fn take_due(&mut self) -> bool {
        if self.is_due() {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

impl<C: Clock> FrameSource for FallbackTimer<C> {
    fn request_frame(&mut self) {
        self.requested += 1;
        self.deadline = Some(self.clock.now_ms() + self.interval_ms);
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// A frame was drawn.
    pub drawn: bool,
    /// An update listener reported a change.
    pub update_changed: bool,
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    /// Frames drawn successfully.
    pub frames_drawn: u64,
    /// Draws that failed.
    pub frames_failed: u64,
    /// Render time of the last drawn frame (ms).
    pub last_render_ms: f64,
}

type UpdateListener = Box<dyn FnMut() -> bool>;
type FrameDrawnListener = Box<dyn FnMut(&FrameDrawnEvent)>;

/// Per-surface frame scheduler.
pub struct FrameScheduler {
    surface: SurfaceId,
    flags: FrameFlags,
    update_listeners: BTreeMap<ListenerId, UpdateListener>,
    frame_drawn_listeners: BTreeMap<ListenerId, FrameDrawnListener>,
    next_listener: u64,
    chain: Option<PostProcessChain>,
    textures: RenderTextureCache,
    clock: Box<dyn Clock>,
    stats: SchedulerStats,
}

impl FrameScheduler {
    /// Creates a scheduler. The first tick always draws.
    #[must_use]
    pub fn new(surface: SurfaceId, clock: Box<dyn Clock>, render_texture_size: u32) -> Self {
        Self {
            surface,
            flags: FrameFlags::default(),
            update_listeners: BTreeMap::new(),
            frame_drawn_listeners: BTreeMap::new(),
            next_listener: 1,
            chain: None,
            textures: RenderTextureCache::new(render_texture_size),
            clock,
            stats: SchedulerStats::default(),
        }
    }

    /// Surface this scheduler draws.
    #[must_use]
    pub const fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Current dirty flags.
    #[must_use]
    pub const fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Mutable dirty flags, for the picker.
    pub fn flags_mut(&mut self) -> &mut FrameFlags {
        &mut self.flags
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Current time from the scheduler's clock.
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn next_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        id
    }

    /// Adds a per-tick update listener. Returning true forces a draw.
    pub fn add_update_listener(&mut self, listener: impl FnMut() -> bool + 'static) -> ListenerId {
        let id = self.next_id();
        self.update_listeners.insert(id, Box::new(listener));
        id
    }

    /// Adds a listener for [`FrameDrawnEvent`]s.
    pub fn add_frame_drawn_listener(&mut self, listener: impl FnMut(&FrameDrawnEvent) + 'static) -> ListenerId {
        let id = self.next_id();
        self.frame_drawn_listeners.insert(id, Box::new(listener));
        id
    }

    /// Removes a listener of either kind.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.update_listeners.remove(&id).is_some() || self.frame_drawn_listeners.remove(&id).is_some()
    }

    /// Installs or clears the post-process chain.
    pub fn set_postprocess(&mut self, chain: Option<PostProcessChain>) {
        self.chain = chain;
    }

    /// Post-process chain, if any.
    #[must_use]
    pub fn postprocess(&self) -> Option<&PostProcessChain> {
        self.chain.as_ref()
    }

    /// Mutable post-process chain, if any.
    pub fn postprocess_mut(&mut self) -> Option<&mut PostProcessChain> {
        self.chain.as_mut()
    }

    /// Marks the surface for redraw.
    pub fn redraw(&mut self, request: &RedrawRequest) {
        tracing::trace!(surface = %self.surface, cause = %request.cause, picking = request.picking, "redraw");
        self.flags.need_draw = true;
        if request.picking {
            self.flags.need_picking_draw = true;
        }
    }

    /// Runs one frame step.
    ///
    /// The frame source is re-armed even when the draw fails.
    ///
    /// # Errors
    ///
    /// Returns the draw failure.
    pub fn tick<D, F>(&mut self, device: &mut D, frames: &mut F) -> Result<TickOutcome, RenderError>
    where
        D: RenderDevice + ?Sized,
        F: FrameSource + ?Sized,
    {
        let mut update_changed = false;
        for listener in self.update_listeners.values_mut() {
            update_changed |= listener();
        }

        let result = if update_changed || self.flags.need_draw {
            self.draw(device).map(|()| true)
        } else {
            Ok(false)
        };

        frames.request_frame();
        result.map(|drawn| TickOutcome { drawn, update_changed })
    }

    /// Draws one frame.
    ///
    /// # Errors
    ///
    /// Returns the failing pass; `need_draw` stays set.
    pub fn draw<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), RenderError> {
        self.textures.invalidate_all();

        let start = self.clock.now_ms();
        let result = match self.chain.as_ref().filter(|c| c.is_active()) {
            Some(chain) => device
                .render_scene(&RenderTarget::Buffer(BufferSlot::Original))
                .and_then(|stats| chain.run(device, &RenderTarget::Surface).map(|_| stats)),
            None => device.render_scene(&RenderTarget::Surface),
        };
        let end = self.clock.now_ms();

        let stats = match result {
            Ok(stats) => stats,
            Err(err) => {
                self.stats.frames_failed += 1;
                tracing::error!(surface = %self.surface, error = %err, "draw failed");
                return Err(err);
            }
        };

        let event = FrameDrawnEvent::new(start, end, stats.objects, stats.triangles);
        for listener in self.frame_drawn_listeners.values_mut() {
            listener(&event);
        }
        self.stats.frames_drawn += 1;
        self.stats.last_render_ms = event.render_time_ms;
        self.flags.need_draw = false;
        Ok(())
    }

    /// Render texture for `src`, re-rendered if dirty.
    pub fn rendered_texture<D, R>(&mut self, device: &mut D, resolver: &R, src: &str) -> Option<TextureHandle>
    where
        D: RenderDevice + ?Sized,
        R: TextureSourceResolver + ?Sized,
    {
        self.textures.rendered_texture(device, resolver, src)
    }
}
