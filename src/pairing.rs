//! Link-button pairing.
//!
//! A bridge only issues a credential after its physical link button has been
//! pressed. Until then every request is answered with error type 101, so
//! pairing keeps asking at a fixed interval.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use strum_macros::Display;
use tokio::sync::watch;

use crate::client::{BridgeClient, CredentialIssuer};
use crate::errors::Error;
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Identifier sent as `devicetype`, in the bridge's `app#device` form.
pub const DEFAULT_APP_IDENTIFIER: &str = "hue-light-show-creator";

/// Progress of a pairing session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PairingState {
    #[default]
    Unpaired,
    AwaitingButtonPress,
    Paired,
    Failed,
}

/// Retry policy of a pairing session.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingOptions {
    /// Attempts before giving up on the button press.
    pub max_attempts: u32,
    /// Wait between two attempts.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "backoff_ms")]
    pub backoff: Duration,
    /// Overall time limit across all attempts.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "deadline_ms")]
    pub deadline: Option<Duration>,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            backoff: Duration::from_secs(1),
            deadline: None,
        }
    }
}

/// Runs the credential handshake against one bridge.
///
/// # Example
///
/// ```no_run
/// use hue_timeline_rs::{BridgeClient, PairingOptions, PairingSession};
///
/// # async fn run() -> Result<(), hue_timeline_rs::Error> {
/// let client = BridgeClient::new("192.168.1.2")?;
/// let mut session = PairingSession::new(PairingOptions::default());
/// let mut progress = session.subscribe();
/// tokio::spawn(async move {
///     while progress.changed().await.is_ok() {
///         println!("pairing: {}", *progress.borrow_and_update());
///     }
/// });
/// let credential = session.pair(&client, "hue-light-show-creator#laptop").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PairingSession {
    options: PairingOptions,
    state: watch::Sender<PairingState>,
    attempts: u32,
    backoffs: u32,
}

impl Default for PairingSession {
    fn default() -> Self {
        PairingSession::new(PairingOptions::default())
    }
}

impl PairingSession {
    pub fn new(options: PairingOptions) -> Self {
        PairingSession {
            options,
            state: watch::Sender::new(PairingState::Unpaired),
            attempts: 0,
            backoffs: 0,
        }
    }

    pub fn state(&self) -> PairingState {
        *self.state.borrow()
    }

    /// Follow state changes while [`PairingSession::pair`] runs, for
    /// instance to tell the user to press the link button.
    pub fn subscribe(&self) -> watch::Receiver<PairingState> {
        self.state.subscribe()
    }

    /// Requests sent so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Waits taken between requests so far.
    pub fn backoffs(&self) -> u32 {
        self.backoffs
    }

    pub fn options(&self) -> &PairingOptions {
        &self.options
    }

    /// Ask the bridge behind `client` for a credential, retrying until the
    /// link button is pressed, the attempts run out or the deadline passes.
    pub async fn pair<C: CredentialIssuer>(
        &mut self,
        client: &C,
        app_identifier: &str,
    ) -> Result<String> {
        self.set_state(PairingState::Unpaired);
        self.attempts = 0;
        self.backoffs = 0;

        let result = match self.options.deadline {
            Some(deadline) => {
                let outcome =
                    runtime::timeout(deadline, self.attempt_loop(client, app_identifier)).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Pairing with {} timed out after {deadline:?}", client.address());
                        Err(Error::LinkButtonNotPressed {
                            attempts: self.attempts,
                        })
                    }
                }
            }
            None => self.attempt_loop(client, app_identifier).await,
        };

        self.set_state(match result {
            Ok(_) => PairingState::Paired,
            Err(_) => PairingState::Failed,
        });
        result
    }

    fn set_state(&self, state: PairingState) {
        if self.state.send_replace(state) != state {
            debug!("Pairing state is now {state}");
        }
    }

    async fn attempt_loop<C: CredentialIssuer>(
        &mut self,
        client: &C,
        app_identifier: &str,
    ) -> Result<String> {
        let max_attempts = self.options.max_attempts.max(1);

        loop {
            self.attempts += 1;
            debug!(
                "Pairing attempt {}/{max_attempts} with {}",
                self.attempts,
                client.address()
            );

            match client.create_user(app_identifier).await {
                Ok(credential) => {
                    info!("Paired with bridge {}", client.address());
                    return Ok(credential);
                }
                Err(Error::Bridge { code, .. }) if code == Error::LINK_BUTTON_NOT_PRESSED => {
                    self.set_state(PairingState::AwaitingButtonPress);
                    if self.attempts >= max_attempts {
                        return Err(Error::LinkButtonNotPressed {
                            attempts: self.attempts,
                        });
                    }
                }
                Err(e) if e.is_transient() && self.attempts < max_attempts => {
                    warn!("Pairing attempt {} failed: {e}", self.attempts);
                }
                Err(e) => return Err(e),
            }

            self.backoffs += 1;
            runtime::sleep(self.options.backoff).await;
        }
    }
}

/// Pair with the bridge at `address` using default options.
pub async fn pair_with_bridge(address: &str, app_identifier: &str) -> Result<String> {
    let client = BridgeClient::new(address)?;
    PairingSession::new(PairingOptions::default())
        .pair(&client, app_identifier)
        .await
}
