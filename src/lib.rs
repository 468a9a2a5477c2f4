//! # hue_timeline_rs
//!
//! An async Rust library that drives Philips Hue lights from a playback
//! timeline.
//!
//! The crate covers the whole path from an unknown network to lights that
//! follow playback: finding a bridge, pairing with it through its link
//! button, listing its lights, and turning timeline cues into throttled,
//! de-duplicated light commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hue_timeline_rs::{
//!     BridgeClient, ConnectionStore, DiscoveryOptions, PairingOptions, PairingSession,
//!     SyncEngine, SyncOptions, TimelineElement, Track, TrackKind, discover_bridges,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bridges = discover_bridges(&DiscoveryOptions::default()).await;
//! let bridge = bridges.first().ok_or("no bridge found")?;
//!
//! // Press the link button on the bridge while this runs.
//! let client = BridgeClient::new(&bridge.address)?;
//! let credential = PairingSession::new(PairingOptions::default())
//!     .pair(&client, "hue-light-show-creator#demo")
//!     .await?;
//!
//! let mut engine = SyncEngine::new(client.with_credential(&credential), SyncOptions::default());
//! let tracks = vec![Track::new(
//!     "lights",
//!     TrackKind::Light,
//!     vec![TimelineElement::light("cue", "1", "#FF0000", 200, 0.0, 2.0)],
//! )];
//! engine.on_seek(0.5, &tracks);
//! engine.flush().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Discovery**: SSDP search with cloud and subnet-scan fallbacks, see
//!   [`discover_bridges`]
//! - **Pairing**: link-button credential handshake with [`PairingSession`]
//! - **Devices**: light listing and capability detection with
//!   [`DeviceRegistry`]
//! - **Colors**: RGB to CIE xy conversion with [`Color`] and [`Xy`]
//! - **Sync**: timeline-driven light state with [`SyncEngine`]
//! - **Persistence**: the bridge in use survives restarts via
//!   [`ConnectionStore`]
//!
//! ## Communication
//!
//! Bridges are found over SSDP (UDP multicast on 239.255.255.250:1900) and
//! controlled over their HTTP JSON API. The engine never waits for the
//! network on the tick path: commands are queued per light and applied by
//! background tasks on the tokio runtime.

mod client;
mod config;
mod connection;
mod discovery;
mod dispatch;
mod engine;
mod errors;
mod history;
mod pairing;
mod payload;
mod registry;
mod response;
pub mod runtime;
mod status;
mod timeline;
mod types;

// Re-export public API
pub use client::{BridgeClient, CredentialIssuer, LightTransport};
pub use config::{BridgeConfig, KNOWN_MODEL_IDS};
pub use connection::{BridgeConnection, ConnectionStore};
pub use discovery::{
    BridgeCandidate, DiscoveryOptions, contains_bridge_token, discover_bridges, location_header,
    probe_bridge,
};
pub use engine::{IssuedCommand, SyncEngine, SyncOptions, SyncOutcome, target_states};
pub use errors::{Error, ErrorCategory};
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use pairing::{
    DEFAULT_APP_IDENTIFIER, PairingOptions, PairingSession, PairingState, pair_with_bridge,
};
pub use payload::StateUpdate;
pub use registry::{Capabilities, Device, DeviceRegistry, fetch_devices};
pub use response::{BridgeError, ResponseItem};
pub use status::{BRIGHTNESS_TOLERANCE, LightState, XY_TOLERANCE, should_update};
pub use timeline::{ElementKind, LightCue, TimelineElement, Track, TrackKind};
pub use types::{Brightness, Color, Xy};
