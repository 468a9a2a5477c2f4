//! Bridge configuration as served by the unauthenticated config endpoint.

use serde::{Deserialize, Serialize};

/// Model ids of the square (v2) and round (v1) bridges.
pub const KNOWN_MODEL_IDS: [&str; 2] = ["BSB002", "BSB001"];

/// Public subset of `GET /api/config`.
///
/// Every field is optional; the bridge only exposes a handful of them
/// without a credential.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bridgeid: Option<String>,
    #[serde(default)]
    pub modelid: Option<String>,
    #[serde(default)]
    pub swversion: Option<String>,
    #[serde(default)]
    pub apiversion: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub factorynew: Option<bool>,
}

impl BridgeConfig {
    /// A config document identifies a bridge when it carries a name, a model
    /// id or a software version.
    pub fn identifies_bridge(&self) -> bool {
        self.name.is_some() || self.modelid.is_some() || self.swversion.is_some()
    }

    /// Whether the model id is one of the known bridge models.
    pub fn is_known_model(&self) -> bool {
        self.modelid
            .as_deref()
            .is_some_and(|m| KNOWN_MODEL_IDS.contains(&m))
    }
}
