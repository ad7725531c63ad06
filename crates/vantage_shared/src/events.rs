//! # Interaction and Frame Events
//!
//! The synthesized event shape delivered to adapters. The shape is the same
//! for every kind; kind-specific data lives in [`EventDetail`].
//!
//! ```text
//! host input ──► PointerInput / TouchInput ──► UiEvent ──► target adapters
//! ```

/// Kind of a synthesized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A pointer button went down.
    MouseDown,
    /// A pointer button went up after a drag-sized gesture.
    MouseUp,
    /// Click-sized gesture.
    Click,
    /// Pointer moved over the surface.
    MouseMove,
    /// Pointer entered a scene object.
    MouseOver,
    /// Pointer left a scene object, or left the surface.
    MouseOut,
    /// Wheel scrolled.
    MouseWheel,
    /// Touch began.
    TouchStart,
    /// Touch moved.
    TouchMove,
    /// Touch ended.
    TouchEnd,
    /// Touch cancelled by the host.
    TouchCancel,
    /// Surface finished loading its resources and drew a frame.
    Load,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::MouseDown,
        Self::MouseUp,
        Self::Click,
        Self::MouseMove,
        Self::MouseOver,
        Self::MouseOut,
        Self::MouseWheel,
        Self::TouchStart,
        Self::TouchMove,
        Self::TouchEnd,
        Self::TouchCancel,
        Self::Load,
    ];

    /// Event type name as used by listener registration and `on<type>`
    /// attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MouseDown => "mousedown",
            Self::MouseUp => "mouseup",
            Self::Click => "click",
            Self::MouseMove => "mousemove",
            Self::MouseOver => "mouseover",
            Self::MouseOut => "mouseout",
            Self::MouseWheel => "mousewheel",
            Self::TouchStart => "touchstart",
            Self::TouchMove => "touchmove",
            Self::TouchEnd => "touchend",
            Self::TouchCancel => "touchcancel",
            Self::Load => "load",
        }
    }

    /// Parses an event type name (case-insensitive).
    ///
    /// `wheel` and `DOMMouseScroll` are accepted as aliases of `mousewheel`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "wheel" | "dommousescroll" => Some(Self::MouseWheel),
            other => Self::ALL.into_iter().find(|kind| kind.as_str() == other),
        }
    }

    /// Returns true for the touch family.
    #[must_use]
    pub const fn is_touch(self) -> bool {
        matches!(
            self,
            Self::TouchStart | Self::TouchMove | Self::TouchEnd | Self::TouchCancel
        )
    }
}

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Control key.
    pub ctrl: bool,
    /// Alt key.
    pub alt: bool,
    /// Shift key.
    pub shift: bool,
    /// Meta / Command / Super key.
    pub meta: bool,
}

/// Raw pointer input as reported by the host, already made relative to the
/// surface (`x`, `y`, top-left origin).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerInput {
    /// Surface-relative x.
    pub x: f32,
    /// Surface-relative y (top-left origin).
    pub y: f32,
    /// Screen x.
    pub screen_x: f32,
    /// Screen y.
    pub screen_y: f32,
    /// Client (viewport) x.
    pub client_x: f32,
    /// Client (viewport) y.
    pub client_y: f32,
    /// Button index (0 = primary).
    pub button: u8,
    /// Modifier keys.
    pub modifiers: Modifiers,
    /// Host timestamp in milliseconds.
    pub time_stamp: f64,
    /// Wheel delta, for wheel input.
    pub wheel_delta: (f32, f32),
}

impl PointerInput {
    /// Pointer input at a surface position, with client and screen
    /// coordinates equal to it.
    #[must_use]
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            screen_x: x,
            screen_y: y,
            client_x: x,
            client_y: y,
            ..Self::default()
        }
    }

    /// Sets the button index.
    #[must_use]
    pub fn with_button(mut self, button: u8) -> Self {
        self.button = button;
        self
    }

    /// Sets the modifier keys.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Sets the host timestamp.
    #[must_use]
    pub fn with_time(mut self, time_stamp: f64) -> Self {
        self.time_stamp = time_stamp;
        self
    }

    /// Sets the wheel delta.
    #[must_use]
    pub fn with_wheel(mut self, delta_x: f32, delta_y: f32) -> Self {
        self.wheel_delta = (delta_x, delta_y);
        self
    }
}

/// One contact point of a touch event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TouchPoint {
    /// Host identifier of the contact.
    pub identifier: u32,
    /// Screen x.
    pub screen_x: f32,
    /// Screen y.
    pub screen_y: f32,
    /// Client x.
    pub client_x: f32,
    /// Client y.
    pub client_y: f32,
}

/// Raw touch input as reported by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchInput {
    /// Surface-relative x of the primary contact.
    pub x: f32,
    /// Surface-relative y of the primary contact.
    pub y: f32,
    /// Host event bubbles.
    pub bubbles: bool,
    /// Host event is cancelable.
    pub cancelable: bool,
    /// Screen x.
    pub screen_x: f32,
    /// Screen y.
    pub screen_y: f32,
    /// Client x.
    pub client_x: f32,
    /// Client y.
    pub client_y: f32,
    /// Modifier keys.
    pub modifiers: Modifiers,
    /// Pinch scale.
    pub scale: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Surface the touch happened on.
    pub view: Option<crate::SurfaceId>,
    /// All current contacts.
    pub touches: Vec<TouchPoint>,
    /// Contacts that started on the same target.
    pub target_touches: Vec<TouchPoint>,
    /// Contacts that changed in this event.
    pub changed_touches: Vec<TouchPoint>,
}

/// Touch-specific payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchDetail {
    /// Pinch scale.
    pub scale: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Surface the touch happened on.
    pub view: Option<crate::SurfaceId>,
    /// All current contacts.
    pub touches: Vec<TouchPoint>,
    /// Contacts that started on the same target.
    pub target_touches: Vec<TouchPoint>,
    /// Contacts that changed in this event.
    pub changed_touches: Vec<TouchPoint>,
}

/// Kind-specific event payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EventDetail {
    /// Plain mouse event.
    #[default]
    Mouse,
    /// Wheel event.
    Wheel {
        /// Horizontal delta.
        delta_x: f32,
        /// Vertical delta.
        delta_y: f32,
    },
    /// Touch event.
    Touch(TouchDetail),
    /// Generic UI event, used when the host cannot build touch events.
    Ui,
}

/// A synthesized interaction event.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Timestamp in milliseconds.
    pub time_stamp: f64,
    /// Whether the event bubbles.
    pub bubbles: bool,
    /// Whether the event is cancelable.
    pub cancelable: bool,
    /// Screen x.
    pub screen_x: f32,
    /// Screen y.
    pub screen_y: f32,
    /// Client x.
    pub client_x: f32,
    /// Client y.
    pub client_y: f32,
    /// Button index.
    pub button: u8,
    /// Modifier keys.
    pub modifiers: Modifiers,
    /// Kind-specific payload.
    pub detail: EventDetail,
}

impl UiEvent {
    /// Builds a bubbling, cancelable mouse-family event from pointer input.
    #[must_use]
    pub fn mouse(kind: EventKind, input: &PointerInput) -> Self {
        let detail = if kind == EventKind::MouseWheel {
            EventDetail::Wheel {
                delta_x: input.wheel_delta.0,
                delta_y: input.wheel_delta.1,
            }
        } else {
            EventDetail::Mouse
        };
        Self {
            kind,
            time_stamp: input.time_stamp,
            bubbles: true,
            cancelable: true,
            screen_x: input.screen_x,
            screen_y: input.screen_y,
            client_x: input.client_x,
            client_y: input.client_y,
            button: input.button,
            modifiers: input.modifiers,
            detail,
        }
    }

    /// Builds a coordinate-less custom event (used for `load`).
    #[must_use]
    pub fn custom(kind: EventKind, time_stamp: f64, bubbles: bool, cancelable: bool) -> Self {
        Self {
            kind,
            time_stamp,
            bubbles,
            cancelable,
            screen_x: 0.0,
            screen_y: 0.0,
            client_x: 0.0,
            client_y: 0.0,
            button: 0,
            modifiers: Modifiers::default(),
            detail: EventDetail::Ui,
        }
    }

    /// Returns the touch payload, if this is a touch event.
    #[must_use]
    pub fn touch(&self) -> Option<&TouchDetail> {
        match &self.detail {
            EventDetail::Touch(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Payload dispatched after every drawn frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameDrawnEvent {
    /// Wall-clock start in milliseconds.
    pub time_start: f64,
    /// Wall-clock end in milliseconds.
    pub time_end: f64,
    /// `time_end - time_start`.
    pub render_time_ms: f64,
    /// Objects drawn by the main pass.
    pub objects_drawn: u32,
    /// Triangles drawn by the main pass (floored).
    pub triangles_drawn: u32,
}

impl FrameDrawnEvent {
    /// Builds the payload from timings and device counts.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(time_start: f64, time_end: f64, objects_drawn: u32, triangles: f64) -> Self {
        Self {
            time_start,
            time_end,
            render_time_ms: time_end - time_start,
            objects_drawn,
            triangles_drawn: triangles.max(0.0).floor() as u32,
        }
    }
}
