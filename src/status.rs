//! Desired and last-sent light states.

use serde::{Deserialize, Serialize};

use crate::types::{Brightness, Xy};

/// Brightness changes up to this many steps are not worth a request.
pub const BRIGHTNESS_TOLERANCE: u8 = 5;

/// Chromaticity changes up to this much per coordinate are not worth a request.
pub const XY_TOLERANCE: f64 = 0.01;

/// The state of a single light as computed by the engine.
///
/// Used both for the per-tick target and for the record of what was last
/// sent to the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct LightState {
    pub on: bool,
    pub brightness: Brightness,
    pub xy: Option<Xy>,
}

impl LightState {
    pub fn on(brightness: Brightness, xy: Option<Xy>) -> Self {
        Self {
            on: true,
            brightness,
            xy,
        }
    }

    /// The record kept after a light was switched off by the engine.
    pub fn off() -> Self {
        Self {
            on: false,
            brightness: Brightness::saturating(0),
            xy: None,
        }
    }
}

/// Decide whether `target` differs enough from `current` to send it.
///
/// ```
/// use hue_timeline_rs::{should_update, Brightness, LightState};
///
/// let a = LightState::on(Brightness::saturating(100), None);
/// let b = LightState::on(Brightness::saturating(104), None);
/// assert!(!should_update(Some(&a), &b));
/// assert!(should_update(None, &b));
/// ```
pub fn should_update(current: Option<&LightState>, target: &LightState) -> bool {
    let Some(current) = current else {
        return true;
    };

    if current.on != target.on {
        return true;
    }
    if current.brightness.delta(&target.brightness) > BRIGHTNESS_TOLERANCE {
        return true;
    }
    match (&current.xy, &target.xy) {
        (Some(current), Some(target)) => current.differs_from(target, XY_TOLERANCE),
        (None, Some(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(bri: u16, xy: Option<(f64, f64)>) -> LightState {
        LightState::on(Brightness::saturating(bri), xy.map(|(x, y)| Xy::new(x, y)))
    }

    #[test]
    fn test_identical_state_is_suppressed() {
        let s = state(200, Some((0.7, 0.3)));
        assert!(!should_update(Some(&s), &s));
    }

    #[test]
    fn test_brightness_tolerance() {
        let current = state(100, None);
        assert!(should_update(Some(&current), &state(106, None)));
        assert!(should_update(Some(&current), &state(94, None)));
        assert!(!should_update(Some(&current), &state(104, None)));
        assert!(!should_update(Some(&current), &state(105, None)));
    }

    #[test]
    fn test_xy_tolerance() {
        let current = state(100, Some((0.5, 0.5)));
        assert!(should_update(Some(&current), &state(100, Some((0.511, 0.5)))));
        assert!(should_update(Some(&current), &state(100, Some((0.5, 0.489)))));
        assert!(!should_update(Some(&current), &state(100, Some((0.509, 0.5)))));
        assert!(!should_update(Some(&current), &state(100, Some((0.5, 0.491)))));
    }

    #[test]
    fn test_power_change() {
        assert!(should_update(Some(&LightState::off()), &state(0, None)));
        assert!(should_update(Some(&state(0, None)), &LightState::off()));
    }

    #[test]
    fn test_gaining_color_triggers_update() {
        assert!(should_update(Some(&state(100, None)), &state(100, Some((0.3, 0.3)))));
        assert!(!should_update(Some(&state(100, Some((0.3, 0.3)))), &state(100, None)));
    }
}
