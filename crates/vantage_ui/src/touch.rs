//! Touch event translation.

use vantage_shared::{EventDetail, EventKind, TouchDetail, TouchInput, UiEvent};

/// Copies host touch input into a [`UiEvent`] stamped with `now_ms`.
///
/// When the host cannot build touch events the result is a generic UI event
/// with the same coordinates and no touch payload.
#[must_use]
pub fn translate_touch(kind: EventKind, input: &TouchInput, now_ms: f64, touch_supported: bool) -> UiEvent {
    let detail = if touch_supported {
        EventDetail::Touch(TouchDetail {
            scale: input.scale,
            rotation: input.rotation,
            view: input.view,
            touches: input.touches.clone(),
            target_touches: input.target_touches.clone(),
            changed_touches: input.changed_touches.clone(),
        })
    } else {
        tracing::warn!(kind = kind.as_str(), "touch events unavailable, delivering a UI event instead");
        EventDetail::Ui
    };

    UiEvent {
        kind,
        time_stamp: now_ms,
        bubbles: input.bubbles,
        cancelable: input.cancelable,
        screen_x: input.screen_x,
        screen_y: input.screen_y,
        client_x: input.client_x,
        client_y: input.client_y,
        button: 0,
        modifiers: input.modifiers,
        detail,
    }
}
