//! Controllable lights reported by a bridge.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnError, serde_as};

use crate::client::BridgeClient;
use crate::errors::Error;
use crate::runtime::Instant;
use crate::types::Brightness;

type Result<T> = std::result::Result<T, Error>;

/// What a light can do, derived from the state fields it reports.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_color: bool,
    pub supports_color_temperature: bool,
    /// Always true for the lights the bridge exposes; the engine gates
    /// dimming commands on this flag rather than the registry dropping lights.
    pub supports_brightness: bool,
}

/// A light as last reported by the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: Option<String>,
    pub reachable: bool,
    pub on: bool,
    pub brightness: Brightness,
    pub capabilities: Capabilities,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct RawLight {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    state: RawLightState,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct RawLightState {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    reachable: Option<bool>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    on: Option<bool>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    bri: Option<u16>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    colormode: Option<String>,
    #[serde(default)]
    ct: Option<Value>,
}

impl Device {
    fn from_raw(id: String, raw: RawLight) -> Self {
        let state = raw.state;
        let capabilities = Capabilities {
            supports_color: state.colormode.as_deref().is_some_and(|m| m != "none"),
            supports_color_temperature: state.ct.is_some(),
            supports_brightness: true,
        };

        Device {
            id,
            name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
            kind: raw.kind,
            reachable: state.reachable.unwrap_or(false),
            on: state.on.unwrap_or(false),
            brightness: state
                .bri
                .map(Brightness::saturating)
                .unwrap_or_default(),
            capabilities,
        }
    }
}

/// Map a `GET /api/<credential>/lights` body to devices, sorted by name.
///
/// Entries that are not objects are skipped; missing or mistyped fields
/// fall back to conservative defaults.
pub(crate) fn parse_lights(body: Value) -> Result<Vec<Device>> {
    let Value::Object(map) = body else {
        return Err(Error::UnexpectedResponse(format!(
            "expected an object of lights, got {body}"
        )));
    };

    let mut devices: Vec<Device> = map
        .into_iter()
        .filter_map(|(id, value)| {
            if !value.is_object() {
                debug!("Skipping light {id}: not an object");
                return None;
            }
            let raw: RawLight = serde_json::from_value(value).unwrap_or_default();
            Some(Device::from_raw(id, raw))
        })
        .collect();

    devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(devices)
}

/// Fetch all lights from an authenticated bridge.
pub async fn fetch_devices(client: &BridgeClient) -> Result<Vec<Device>> {
    client.get_lights().await
}

/// Cached view of the bridge's lights.
///
/// Every successful refresh replaces the cache wholesale; a failed refresh
/// leaves it untouched.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
    refreshed_at: Option<Instant>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// When the cache was last replaced.
    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    /// Replace the cache with `devices`.
    pub fn replace(&mut self, devices: Vec<Device>) {
        self.index = devices
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        self.devices = devices;
        self.refreshed_at = Some(Instant::now());
    }

    /// Re-fetch the lights from the bridge.
    ///
    /// On failure the previous devices are kept and [`Error::StaleData`] is
    /// returned wrapping the cause.
    pub async fn refresh(&mut self, client: &BridgeClient) -> Result<&[Device]> {
        match fetch_devices(client).await {
            Ok(devices) => {
                debug!("Fetched {} light(s) from {}", devices.len(), client.address());
                self.replace(devices);
                Ok(&self.devices)
            }
            Err(e) => {
                warn!(
                    "Failed to refresh lights from {}, keeping {} cached: {}",
                    client.address(),
                    self.devices.len(),
                    e
                );
                Err(Error::StaleData(Box::new(e)))
            }
        }
    }
}
