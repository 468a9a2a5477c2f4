//! Light state update payload.

use serde::{Deserialize, Serialize};

use crate::status::LightState;
use crate::types::{Brightness, Xy};

/// Body of a `PUT /api/<credential>/lights/<id>/state` request.
///
/// Only the attributes that are set are serialized; the bridge leaves the
/// others untouched.
///
/// ```
/// use hue_timeline_rs::StateUpdate;
///
/// let off = StateUpdate::off();
/// assert_eq!(serde_json::to_string(&off).unwrap(), r#"{"on":false}"#);
/// ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateUpdate {
    pub(crate) on: Option<bool>,
    pub(crate) bri: Option<Brightness>,
    pub(crate) xy: Option<Xy>,
}

impl StateUpdate {
    /// Create a new empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// The single-attribute "turn off" update.
    pub fn off() -> Self {
        Self {
            on: Some(false),
            ..Self::default()
        }
    }

    /// Check if this update carries at least one attribute.
    pub fn is_valid(&self) -> bool {
        self.on.is_some() || self.bri.is_some() || self.xy.is_some()
    }

    pub fn power(&mut self, on: bool) -> &mut Self {
        self.on = Some(on);
        self
    }

    pub fn brightness(&mut self, brightness: Brightness) -> &mut Self {
        self.bri = Some(brightness);
        self
    }

    pub fn xy(&mut self, xy: Xy) -> &mut Self {
        self.xy = Some(xy);
        self
    }

    pub fn get_on(&self) -> Option<bool> {
        self.on
    }

    pub fn get_brightness(&self) -> Option<Brightness> {
        self.bri
    }

    pub fn get_xy(&self) -> Option<Xy> {
        self.xy
    }
}

impl From<&LightState> for StateUpdate {
    /// An "on" state sends every attribute; an "off" state sends only
    /// `on: false`.
    fn from(state: &LightState) -> Self {
        if !state.on {
            return Self::off();
        }
        Self {
            on: Some(true),
            bri: Some(state.brightness),
            xy: state.xy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_update_is_invalid() {
        assert!(!StateUpdate::new().is_valid());
        assert!(StateUpdate::off().is_valid());
    }

    #[test]
    fn test_on_state_serializes_all_attributes() {
        let state = LightState::on(Brightness::saturating(200), Some(Xy::new(0.7, 0.3)));
        let value = serde_json::to_value(StateUpdate::from(&state)).unwrap();
        assert_eq!(value, json!({"on": true, "bri": 200, "xy": [0.7, 0.3]}));
    }

    #[test]
    fn test_missing_xy_is_omitted() {
        let mut update = StateUpdate::new();
        update.power(true).brightness(Brightness::saturating(10));
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"on": true, "bri": 10}));
    }
}
