//! # Interaction Dispatch
//!
//! Per-surface pointer state machine. Host callbacks come in, picks and
//! deliveries go out through an [`InteractionHost`].
//!
//! ## Gesture Rules
//!
//! 1. A gesture that ends within `click_slop_px` of where it started on both
//!    axes produces a `click` and no `mouseup`
//! 2. A gesture that ends further away produces a `mouseup` and the host's
//!    trailing `click` is swallowed
//! 3. Moving with the primary button held is a drag; the pick buffer is
//!    invalidated when it ends

use vantage_shared::{EventKind, NodeId, PointerInput, TouchInput, UiEvent};

use crate::touch::translate_touch;

/// What the dispatcher needs from the surface it runs on.
pub trait InteractionHost {
    /// Picks the object under a top-left-origin pixel.
    fn pick(&mut self, x: f32, y: f32) -> Option<NodeId>;

    /// Marks the pick buffer stale.
    fn invalidate_picking(&mut self);

    /// Delivers an event to a node's adapters. Returns listeners run.
    fn deliver(&mut self, target: NodeId, event: &UiEvent) -> usize;

    /// Returns false if the host cannot build touch events.
    fn supports_touch_events(&self) -> bool {
        true
    }
}

/// Pointer state of one surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    buttons_down: u8,
    /// Last pointer position seen.
    pub last_position: (f32, f32),
    /// Position of the last button press.
    pub down_position: (f32, f32),
    /// The primary button moved while held.
    pub dragging: bool,
    /// A drag-sized gesture dispatched `mouseup`; the next click is dropped.
    pub drag_released: bool,
    /// Object picked by the last hover check.
    pub last_picked: Option<NodeId>,
    /// Hover (`mouseover`/`mouseout`) picking on move.
    pub move_picking: bool,
}

impl InteractionState {
    const fn button_mask(button: u8) -> u8 {
        1 << (if button > 7 { 7 } else { button })
    }

    /// Returns true if `button` is held.
    #[must_use]
    pub const fn is_button_down(&self, button: u8) -> bool {
        (self.buttons_down & Self::button_mask(button)) != 0
    }

    fn press(&mut self, button: u8) {
        self.buttons_down |= Self::button_mask(button);
    }

    fn release(&mut self, button: u8) {
        self.buttons_down &= !Self::button_mask(button);
    }
}

/// Pointer state machine for one surface.
#[derive(Debug, Clone)]
pub struct InteractionDispatcher {
    root: NodeId,
    state: InteractionState,
    click_slop: f32,
}

impl InteractionDispatcher {
    /// Creates a dispatcher for the surface rooted at `root`.
    #[must_use]
    pub fn new(root: NodeId, click_slop_px: f32, move_picking: bool) -> Self {
        Self {
            root,
            state: InteractionState {
                move_picking,
                ..InteractionState::default()
            },
            click_slop: click_slop_px,
        }
    }

    /// Surface root.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Current pointer state.
    #[must_use]
    pub const fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Enables or disables hover picking.
    pub fn set_move_picking(&mut self, enabled: bool) {
        self.state.move_picking = enabled;
        if !enabled {
            self.state.last_picked = None;
        }
    }

    /// Button press.
    pub fn pointer_down<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        self.state.press(input.button);
        self.state.last_position = (input.x, input.y);
        self.state.down_position = (input.x, input.y);
        self.state.drag_released = false;

        let target = host.pick(input.x, input.y);
        self.dispatch(host, EventKind::MouseDown, input, target)
    }

    /// Pointer motion.
    pub fn pointer_move<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        if self.state.is_button_down(0) {
            self.state.dragging = true;
        }
        self.state.last_position = (input.x, input.y);

        let mut delivered = self.dispatch(host, EventKind::MouseMove, input, Some(self.root));
        if !self.state.move_picking {
            return delivered;
        }

        let current = host.pick(input.x, input.y);
        if current != self.state.last_picked {
            let hover = input.with_button(0);
            if let Some(previous) = self.state.last_picked {
                delivered += self.dispatch(host, EventKind::MouseOut, &hover, Some(previous));
            }
            if current.is_some() {
                delivered += self.dispatch(host, EventKind::MouseOver, &hover, current);
            }
            self.state.last_picked = current;
        }
        delivered
    }

    /// Button release.
    pub fn pointer_up<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        self.state.release(input.button);
        self.state.last_position = (input.x, input.y);
        self.state.dragging = false;
        host.invalidate_picking();

        let (down_x, down_y) = self.state.down_position;
        if (input.x - down_x).abs() <= self.click_slop && (input.y - down_y).abs() <= self.click_slop {
            tracing::trace!(x = input.x, y = input.y, "mouseup suppressed, click follows");
            return 0;
        }

        self.state.drag_released = true;
        let target = host.pick(input.x, input.y);
        self.dispatch(host, EventKind::MouseUp, input, target)
    }

    /// Host click.
    pub fn click<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        self.state.last_position = (input.x, input.y);
        let released = std::mem::take(&mut self.state.drag_released);
        if self.state.dragging || released {
            host.invalidate_picking();
            return 0;
        }
        let target = host.pick(input.x, input.y);
        self.dispatch(host, EventKind::Click, input, target)
    }

    /// Wheel scroll. Goes to the root without picking.
    pub fn wheel<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        self.dispatch(host, EventKind::MouseWheel, input, Some(self.root))
    }

    /// Pointer left the surface. Goes to the root without picking.
    pub fn pointer_leave<H: InteractionHost + ?Sized>(&mut self, host: &mut H, input: &PointerInput) -> usize {
        self.dispatch(host, EventKind::MouseOut, &input.with_button(0), Some(self.root))
    }

    /// Touch input. Delivered once, to the root.
    pub fn touch<H: InteractionHost + ?Sized>(
        &mut self,
        host: &mut H,
        kind: EventKind,
        input: &TouchInput,
        now_ms: f64,
    ) -> usize {
        let event = translate_touch(kind, input, now_ms, host.supports_touch_events());
        host.deliver(self.root, &event)
    }

    fn dispatch<H: InteractionHost + ?Sized>(
        &self,
        host: &mut H,
        kind: EventKind,
        input: &PointerInput,
        target: Option<NodeId>,
    ) -> usize {
        let event = UiEvent::mouse(kind, input);
        let target = target.unwrap_or(self.root);
        tracing::trace!(kind = kind.as_str(), %target, "dispatch");
        host.deliver(target, &event) + host.deliver(self.root, &event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHost {
        under_pointer: Box<dyn Fn(f32, f32) -> Option<NodeId>>,
        delivered: Vec<(EventKind, NodeId)>,
        invalidations: usize,
        picks: usize,
    }

    impl RecordingHost {
        fn new(under_pointer: impl Fn(f32, f32) -> Option<NodeId> + 'static) -> Self {
            Self {
                under_pointer: Box::new(under_pointer),
                delivered: Vec::new(),
                invalidations: 0,
                picks: 0,
            }
        }

        fn kinds(&self) -> Vec<EventKind> {
            self.delivered.iter().map(|(kind, _)| *kind).collect()
        }
    }

    impl InteractionHost for RecordingHost {
        fn pick(&mut self, x: f32, y: f32) -> Option<NodeId> {
            self.picks += 1;
            (self.under_pointer)(x, y)
        }

        fn invalidate_picking(&mut self) {
            self.invalidations += 1;
        }

        fn deliver(&mut self, target: NodeId, event: &UiEvent) -> usize {
            self.delivered.push((event.kind, target));
            1
        }
    }

    const ROOT: NodeId = NodeId(0);
    const A: NodeId = NodeId(1);
    const B: NodeId = NodeId(2);

    fn dispatcher() -> InteractionDispatcher {
        InteractionDispatcher::new(ROOT, 1.0, false)
    }

    #[test]
    fn test_small_gesture_clicks_without_mouseup() {
        let mut host = RecordingHost::new(|_, _| Some(A));
        let mut d = dispatcher();

        d.pointer_down(&mut host, &PointerInput::at(100.0, 100.0));
        d.pointer_move(&mut host, &PointerInput::at(100.5, 100.0));
        assert!(d.state().dragging);
        assert_eq!(d.pointer_up(&mut host, &PointerInput::at(100.5, 100.0)), 0);
        assert!(!d.state().dragging);
        d.click(&mut host, &PointerInput::at(100.5, 100.0));

        let kinds = host.kinds();
        assert!(!kinds.contains(&EventKind::MouseUp));
        assert_eq!(kinds.iter().filter(|&&k| k == EventKind::Click).count(), 2);
        assert!(host.delivered.contains(&(EventKind::Click, A)));
        assert!(host.delivered.contains(&(EventKind::Click, ROOT)));
    }

    #[test]
    fn test_drag_dispatches_mouseup_and_swallows_click() {
        let mut host = RecordingHost::new(|_, _| Some(A));
        let mut d = dispatcher();

        d.pointer_down(&mut host, &PointerInput::at(100.0, 100.0));
        d.pointer_move(&mut host, &PointerInput::at(110.0, 100.0));
        d.pointer_up(&mut host, &PointerInput::at(110.0, 100.0));
        assert!(!d.state().dragging);
        assert!(host.delivered.contains(&(EventKind::MouseUp, A)));

        assert_eq!(d.click(&mut host, &PointerInput::at(110.0, 100.0)), 0);
        assert!(!host.kinds().contains(&EventKind::Click));
        assert!(!d.state().drag_released);
        assert_eq!(host.invalidations, 2);
    }

    #[test]
    fn test_one_axis_within_slop_still_dispatches_mouseup() {
        let mut host = RecordingHost::new(|_, _| None);
        let mut d = dispatcher();
        d.pointer_down(&mut host, &PointerInput::at(100.0, 100.0));
        d.pointer_up(&mut host, &PointerInput::at(100.0, 140.0));
        assert!(host.delivered.contains(&(EventKind::MouseUp, ROOT)));
    }

    #[test]
    fn test_hover_sequence() {
        let mut host = RecordingHost::new(|x, _| match x as i32 {
            0..=9 => Some(A),
            10..=19 => Some(B),
            _ => None,
        });
        let mut d = dispatcher();
        d.set_move_picking(true);

        d.pointer_move(&mut host, &PointerInput::at(5.0, 0.0));
        d.pointer_move(&mut host, &PointerInput::at(15.0, 0.0));
        d.pointer_move(&mut host, &PointerInput::at(25.0, 0.0));

        let hover: Vec<(EventKind, NodeId)> = host
            .delivered
            .iter()
            .copied()
            .filter(|(kind, target)| *kind != EventKind::MouseMove && *target != ROOT)
            .collect();
        assert_eq!(
            hover,
            [(EventKind::MouseOver, A), (EventKind::MouseOut, A), (EventKind::MouseOver, B), (EventKind::MouseOut, B)]
        );
        assert_eq!(d.state().last_picked, None);
    }

    #[test]
    fn test_move_without_hover_picking_does_not_pick() {
        let mut host = RecordingHost::new(|_, _| Some(A));
        let mut d = dispatcher();
        d.pointer_move(&mut host, &PointerInput::at(5.0, 5.0));
        assert_eq!(host.picks, 0);
        assert_eq!(host.delivered, [(EventKind::MouseMove, ROOT), (EventKind::MouseMove, ROOT)]);
        assert!(!d.state().dragging);
    }

    #[test]
    fn test_wheel_and_leave_go_to_root() {
        let mut host = RecordingHost::new(|_, _| Some(A));
        let mut d = dispatcher();
        d.wheel(&mut host, &PointerInput::at(1.0, 1.0).with_wheel(0.0, -3.0));
        d.pointer_leave(&mut host, &PointerInput::at(1.0, 1.0));
        assert_eq!(host.picks, 0);
        assert!(host.delivered.iter().all(|(_, target)| *target == ROOT));
        assert_eq!(host.delivered[0].0, EventKind::MouseWheel);
        assert_eq!(host.delivered[2].0, EventKind::MouseOut);
    }

    #[test]
    fn test_miss_targets_root() {
        let mut host = RecordingHost::new(|_, _| None);
        let mut d = dispatcher();
        d.pointer_down(&mut host, &PointerInput::at(3.0, 3.0).with_button(2));
        assert!(d.state().is_button_down(2));
        assert!(!d.state().is_button_down(0));
        assert_eq!(host.delivered, [(EventKind::MouseDown, ROOT), (EventKind::MouseDown, ROOT)]);
    }
}
