//! Playback-driven light synchronization.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::client::{BridgeClient, LightTransport};
use crate::connection::BridgeConnection;
use crate::dispatch::{self, Command, Dispatcher, Record, StateTable};
use crate::errors::Error;
use crate::payload::StateUpdate;
use crate::registry::{Capabilities, Device};
use crate::runtime::{Instant, RuntimeHandle};
use crate::status::{LightState, should_update};
use crate::timeline::Track;
use crate::types::Color;

type Result<T> = std::result::Result<T, Error>;

/// Tunables of the sync engine.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Minimum spacing between accepted non-forced ticks.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "min_interval_ms")]
    pub min_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
        }
    }
}

/// A state change the engine queued for a light.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCommand {
    pub light_id: String,
    pub update: StateUpdate,
}

/// What a call to [`SyncEngine::sync`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The call came too soon after the previous one and was dropped.
    Throttled,
    /// The call was accepted; `commands` may be empty when nothing changed.
    Dispatched { commands: Vec<IssuedCommand> },
}

impl SyncOutcome {
    pub fn commands(&self) -> &[IssuedCommand] {
        match self {
            SyncOutcome::Throttled => &[],
            SyncOutcome::Dispatched { commands } => commands,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, SyncOutcome::Throttled)
    }
}

/// Compute the state every light should have at `timestamp`.
///
/// Each light track contributes the first element active at `timestamp`.
/// When several tracks target the same light, the later track wins. A
/// light element whose color cannot be parsed still turns its light on, at
/// the authored brightness, without changing the color.
pub fn target_states(timestamp: f64, tracks: &[Track]) -> HashMap<String, LightState> {
    let mut targets = HashMap::new();

    for track in tracks.iter().filter(|t| t.is_light()) {
        let Some(cue) = track
            .active_element(timestamp)
            .and_then(|element| element.light_cue())
        else {
            continue;
        };

        let xy = match Color::from_str(cue.color) {
            Ok(color) => Some(color.to_xy()),
            Err(e) => {
                warn!("Light cue on track {} has no usable color: {e}", track.id);
                None
            }
        };
        targets.insert(cue.light_id.to_string(), LightState::on(cue.brightness, xy));
    }

    targets
}

/// Drives lights from timeline playback.
///
/// One engine serves one bridge connection. The host calls
/// [`on_tick`](SyncEngine::on_tick) while playback advances and
/// [`on_seek`](SyncEngine::on_seek) after a jump. Neither call waits for the
/// network: commands are queued on per-light lanes and applied in the
/// background. Failed commands are logged and forgotten, so the next tick
/// sends them again.
///
/// # Example
///
/// ```no_run
/// use hue_timeline_rs::{BridgeClient, SyncEngine, SyncOptions, Track};
///
/// # async fn run(tracks: Vec<Track>) -> Result<(), hue_timeline_rs::Error> {
/// let client = BridgeClient::new("192.168.1.2")?.with_credential("abc123");
/// let mut engine = SyncEngine::new(client, SyncOptions::default());
///
/// engine.on_seek(0.0, &tracks);
/// engine.on_tick(0.1, &tracks);
/// engine.flush().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine<T: LightTransport> {
    options: SyncOptions,
    last_accepted: Option<Instant>,
    table: StateTable,
    next_generation: u64,
    capabilities: HashMap<String, Capabilities>,
    dispatcher: Dispatcher<T>,
}

impl SyncEngine<BridgeClient> {
    /// Engine for an authenticated stored connection.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn for_connection(connection: &BridgeConnection, options: SyncOptions) -> Result<Self> {
        Ok(Self::new(BridgeClient::from_connection(connection)?, options))
    }
}

impl<T: LightTransport> SyncEngine<T> {
    /// Create an engine that spawns its command lanes on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(transport: T, options: SyncOptions) -> Self {
        Self::with_runtime(transport, options, RuntimeHandle::current())
    }

    /// Create an engine that spawns its command lanes on `runtime`.
    pub fn with_runtime(transport: T, options: SyncOptions, runtime: RuntimeHandle) -> Self {
        let table = StateTable::default();
        SyncEngine {
            options,
            last_accepted: None,
            dispatcher: Dispatcher::new(Arc::new(transport), Arc::clone(&table), runtime),
            table,
            next_generation: 0,
            capabilities: HashMap::new(),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    /// Tell the engine what each light supports. Lights without color
    /// support receive no `xy`, lights without dimming no `bri`. Unknown
    /// lights receive everything.
    pub fn set_devices(&mut self, devices: &[Device]) {
        self.capabilities = devices
            .iter()
            .map(|d| (d.id.clone(), d.capabilities))
            .collect();
    }

    /// Playback advanced to `timestamp`; subject to throttling.
    pub fn on_tick(&mut self, timestamp: f64, tracks: &[Track]) -> SyncOutcome {
        self.sync(timestamp, tracks, false)
    }

    /// Playback jumped to `timestamp`; always processed.
    pub fn on_seek(&mut self, timestamp: f64, tracks: &[Track]) -> SyncOutcome {
        self.sync(timestamp, tracks, true)
    }

    /// Bring the lights in line with the timeline at `timestamp`.
    ///
    /// Unless `force` is set, calls closer together than
    /// [`SyncOptions::min_interval`] are dropped.
    pub fn sync(&mut self, timestamp: f64, tracks: &[Track], force: bool) -> SyncOutcome {
        let now = Instant::now();
        if !force
            && let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) < self.options.min_interval
        {
            return SyncOutcome::Throttled;
        }
        self.last_accepted = Some(now);

        let targets = target_states(timestamp, tracks);
        let commands = self.diff(targets);

        let issued = commands
            .iter()
            .map(|c| IssuedCommand {
                light_id: c.light_id.clone(),
                update: c.update.clone(),
            })
            .collect();
        if !commands.is_empty() {
            debug!("t={timestamp:.3}: {} light command(s)", commands.len());
        }
        for command in commands {
            self.dispatcher.dispatch(command);
        }

        SyncOutcome::Dispatched { commands: issued }
    }

    /// The state last sent to a light and not rolled back.
    pub fn last_known(&self, light_id: &str) -> Option<LightState> {
        dispatch::lock(&self.table).get(light_id).map(|r| r.state)
    }

    /// Wait until every command queued so far has been applied or has
    /// failed. Ticks never need this.
    pub async fn flush(&self) {
        self.dispatcher.flush().await
    }

    /// Forget every last-sent state and the throttle, so the next tick
    /// re-sends everything the timeline asks for.
    ///
    /// Lanes survive a reset: commands queued before it still reach their
    /// light ahead of anything sent after it.
    pub fn reset(&mut self) {
        dispatch::lock(&self.table).clear();
        self.last_accepted = None;
    }

    /// Diff `targets` against the last-sent states, recording every change
    /// as sent.
    fn diff(&mut self, targets: HashMap<String, LightState>) -> Vec<Command> {
        let mut table = dispatch::lock(&self.table);
        let involved: BTreeSet<String> = table.keys().chain(targets.keys()).cloned().collect();
        let mut commands = Vec::new();

        for light_id in involved {
            let current = table.get(&light_id).map(|r| r.state);
            let state = match targets.get(&light_id) {
                Some(target) if should_update(current.as_ref(), target) => *target,
                Some(_) => continue,
                None if current.is_some_and(|c| c.on) => LightState::off(),
                None => continue,
            };

            self.next_generation += 1;
            let generation = self.next_generation;
            table.insert(light_id.clone(), Record { state, generation });

            let update = self.gate(&light_id, StateUpdate::from(&state));
            commands.push(Command {
                light_id,
                state,
                update,
                generation,
            });
        }

        commands
    }

    fn gate(&self, light_id: &str, mut update: StateUpdate) -> StateUpdate {
        if let Some(caps) = self.capabilities.get(light_id) {
            if !caps.supports_color {
                update.xy = None;
            }
            if !caps.supports_brightness {
                update.bri = None;
            }
        }
        update
    }
}
