//! Per-light command lanes.
//!
//! Every light gets one background task draining an unbounded queue, so
//! commands for one light reach the bridge in the order they were produced
//! while different lights proceed independently. Enqueueing never blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::client::LightTransport;
use crate::payload::StateUpdate;
use crate::runtime::RuntimeHandle;
use crate::status::LightState;

/// A last-sent state together with the generation of the command that
/// wrote it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Record {
    pub state: LightState,
    pub generation: u64,
}

pub(crate) type StateTable = Arc<Mutex<HashMap<String, Record>>>;

pub(crate) fn lock(table: &StateTable) -> MutexGuard<'_, HashMap<String, Record>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub(crate) struct Command {
    pub light_id: String,
    pub state: LightState,
    pub update: StateUpdate,
    pub generation: u64,
}

enum LaneMsg {
    Apply(Command),
    Flush(oneshot::Sender<()>),
}

pub(crate) struct Dispatcher<T: LightTransport> {
    transport: Arc<T>,
    table: StateTable,
    runtime: RuntimeHandle,
    lanes: HashMap<String, mpsc::UnboundedSender<LaneMsg>>,
}

impl<T: LightTransport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, table: StateTable, runtime: RuntimeHandle) -> Self {
        Dispatcher {
            transport,
            table,
            runtime,
            lanes: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queue `command` on its light's lane, starting the lane if needed.
    pub fn dispatch(&mut self, command: Command) {
        let light_id = command.light_id.clone();
        let tx = match self.lanes.get(&light_id) {
            Some(tx) if !tx.is_closed() => tx.clone(),
            _ => self.start_lane(light_id.clone()),
        };
        if tx.send(LaneMsg::Apply(command)).is_err() {
            warn!("Dropping command for light {light_id}: lane closed");
        }
    }

    /// Wait until every command queued so far has been resolved.
    pub async fn flush(&self) {
        let waiters = self.lanes.values().filter_map(|tx| {
            let (done, wait) = oneshot::channel();
            tx.send(LaneMsg::Flush(done)).ok().map(|()| wait)
        });
        join_all(waiters).await;
    }

    fn start_lane(&mut self, light_id: String) -> mpsc::UnboundedSender<LaneMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("Starting command lane for light {light_id}");
        self.runtime.spawn(run_lane(
            light_id.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.table),
            rx,
        ));
        self.lanes.insert(light_id, tx.clone());
        tx
    }
}

async fn run_lane<T: LightTransport>(
    light_id: String,
    transport: Arc<T>,
    table: StateTable,
    mut rx: mpsc::UnboundedReceiver<LaneMsg>,
) {
    // Last state the bridge accepted for this light.
    let mut confirmed: Option<LightState> = None;

    while let Some(msg) = rx.recv().await {
        match msg {
            LaneMsg::Flush(done) => {
                let _ = done.send(());
            }
            LaneMsg::Apply(command) => match transport.apply(&light_id, &command.update).await {
                Ok(()) => {
                    debug!("Light {light_id} accepted {:?}", command.update);
                    confirmed = Some(command.state);
                }
                Err(e) => {
                    warn!("Failed to update light {light_id}: {e}");
                    roll_back(&table, &light_id, command.generation, confirmed);
                }
            },
        }
    }
    debug!("Command lane for light {light_id} closed");
}

/// Undo the optimistic record of a failed command, unless a newer command
/// has replaced it in the meantime.
fn roll_back(table: &StateTable, light_id: &str, generation: u64, confirmed: Option<LightState>) {
    let mut table = lock(table);
    if table.get(light_id).map(|r| r.generation) != Some(generation) {
        return;
    }
    match confirmed {
        Some(state) => {
            table.insert(light_id.to_string(), Record { state, generation });
        }
        None => {
            table.remove(light_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Brightness;

    fn table_with(light_id: &str, generation: u64) -> StateTable {
        let table: StateTable = Arc::default();
        lock(&table).insert(
            light_id.to_string(),
            Record {
                state: LightState::on(Brightness::new(), None),
                generation,
            },
        );
        table
    }

    #[test]
    fn test_roll_back_removes_unconfirmed_record() {
        let table = table_with("1", 3);
        roll_back(&table, "1", 3, None);
        assert!(lock(&table).get("1").is_none());
    }

    #[test]
    fn test_roll_back_restores_confirmed_state() {
        let table = table_with("1", 3);
        roll_back(&table, "1", 3, Some(LightState::off()));
        assert_eq!(lock(&table).get("1").map(|r| r.state), Some(LightState::off()));
    }

    #[test]
    fn test_roll_back_skips_newer_record() {
        let table = table_with("1", 4);
        roll_back(&table, "1", 3, None);
        assert_eq!(lock(&table).get("1").map(|r| r.generation), Some(4));
    }
}
