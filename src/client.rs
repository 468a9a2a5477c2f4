//! HTTP access to a single bridge.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::config::BridgeConfig;
use crate::connection::BridgeConnection;
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::payload::StateUpdate;
use crate::registry::{self, Device};
use crate::response;
use crate::runtime::Mutex;

type Result<T> = std::result::Result<T, Error>;

/// Sink for light state updates.
///
/// [`BridgeClient`] is the production implementation; the sync engine is
/// generic over this trait so it can be driven without a bridge.
pub trait LightTransport: Send + Sync + 'static {
    /// Apply `update` to the light with id `light_id`.
    fn apply(
        &self,
        light_id: &str,
        update: &StateUpdate,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Issuer of app credentials.
///
/// Pairing is generic over this trait; [`BridgeClient`] asks a real bridge.
pub trait CredentialIssuer: Send + Sync {
    /// Request a credential for `devicetype`.
    fn create_user(&self, devicetype: &str) -> impl Future<Output = Result<String>> + Send;

    /// Where the credential comes from, for logging.
    fn address(&self) -> &str;
}

/// A client for one bridge's JSON API.
///
/// # Example
///
/// ```no_run
/// use hue_timeline_rs::{BridgeClient, StateUpdate};
///
/// # async fn run() -> Result<(), hue_timeline_rs::Error> {
/// let client = BridgeClient::new("192.168.1.2")?.with_credential("abc123");
/// client.set_light_state("1", &StateUpdate::off()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    address: String,
    credential: Option<String>,
    history: Arc<Mutex<MessageHistory>>,
}

impl BridgeClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a client for the bridge at `address` (host or host:port).
    pub fn new(address: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::http("build client", e))?;
        Self::with_client(http, address)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, address: &str) -> Result<Self> {
        let base_url = base_url(address)?;
        Ok(BridgeClient {
            http,
            base_url,
            address: address.to_string(),
            credential: None,
            history: Arc::new(Mutex::new(MessageHistory::new())),
        })
    }

    /// Create an authenticated client from a stored connection.
    pub fn from_connection(connection: &BridgeConnection) -> Result<Self> {
        let credential = connection.credential().ok_or(Error::NotAuthenticated)?;
        Ok(Self::new(connection.address())?.with_credential(credential))
    }

    pub fn with_credential(mut self, credential: &str) -> Self {
        self.credential = Some(credential.to_string());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub async fn history(&self) -> MessageHistory {
        self.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Reads the public configuration document (no credential needed).
    pub async fn get_config(&self) -> Result<BridgeConfig> {
        let body = self.request(Method::GET, "api/config", None).await?;
        serde_json::from_value(body).map_err(Error::JsonLoad)
    }

    /// One pairing attempt: ask the bridge to issue a credential for
    /// `devicetype`.
    ///
    /// Fails with [`Error::Bridge`] code 101 while the link button has not
    /// been pressed.
    pub async fn create_user(&self, devicetype: &str) -> Result<String> {
        let body = self
            .request(Method::POST, "api", Some(&json!({ "devicetype": devicetype })))
            .await?;

        response::parse_items(body)?
            .into_iter()
            .find_map(|item| {
                item.get("username")
                    .and_then(|u| u.as_str())
                    .map(String::from)
            })
            .ok_or_else(|| Error::UnexpectedResponse("pairing success without username".into()))
    }

    /// Fetch all lights known to the bridge, sorted by name.
    pub async fn get_lights(&self) -> Result<Vec<Device>> {
        let path = format!("api/{}/lights", self.require_credential()?);
        let body = self.request(Method::GET, &path, None).await?;
        response::check_error_array(&body)?;
        registry::parse_lights(body)
    }

    /// Send a state update to one light. HTTP 200 means the bridge accepted
    /// the request.
    pub async fn set_light_state(&self, light_id: &str, update: &StateUpdate) -> Result<()> {
        if !update.is_valid() {
            return Err(Error::UnexpectedResponse(
                "refusing to send an empty state update".into(),
            ));
        }

        let path = format!("api/{}/lights/{}/state", self.require_credential()?, light_id);
        let msg = serde_json::to_value(update).map_err(Error::JsonDump)?;
        let body = self.request(Method::PUT, &path, Some(&msg)).await?;

        if let Err(e) = response::check_error_array(&body) {
            warn!("Light {light_id} accepted update with errors: {e}");
        }
        Ok(())
    }

    fn require_credential(&self) -> Result<&str> {
        self.credential.as_deref().ok_or(Error::NotAuthenticated)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::invalid_address(&self.address, &e.to_string()))?;
        let label = format!("{} {}", method, self.redact(path));

        self.history
            .lock()
            .await
            .record(MessageType::Send, &label, body.unwrap_or(&Value::Null));

        match self.send(method, url, body, &label).await {
            Ok(value) => {
                self.history
                    .lock()
                    .await
                    .record(MessageType::Receive, &label, &value);
                Ok(value)
            }
            Err(e) => {
                self.history.lock().await.record_error(&label, &e.to_string());
                Err(e)
            }
        }
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>, label: &str) -> Result<Value> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| Error::http(label, e))?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::status(label, status));
        }

        let value = resp.json::<Value>().await.map_err(|e| Error::http(label, e))?;
        debug!("{label} -> {value}");
        Ok(value)
    }

    /// Keep credentials out of logs and history.
    fn redact(&self, path: &str) -> String {
        match &self.credential {
            Some(c) if !c.is_empty() => path.replace(c.as_str(), "<credential>"),
            _ => path.to_string(),
        }
    }
}

impl LightTransport for BridgeClient {
    fn apply(
        &self,
        light_id: &str,
        update: &StateUpdate,
    ) -> impl Future<Output = Result<()>> + Send {
        self.set_light_state(light_id, update)
    }
}

impl CredentialIssuer for BridgeClient {
    fn create_user(&self, devicetype: &str) -> impl Future<Output = Result<String>> + Send {
        BridgeClient::create_user(self, devicetype)
    }

    fn address(&self) -> &str {
        BridgeClient::address(self)
    }
}

/// Build the `http://<address>/` base URL of a bridge.
pub(crate) fn base_url(address: &str) -> Result<Url> {
    let address = address.trim();
    if address.is_empty() || address.contains('/') {
        return Err(Error::invalid_address(address, "expected host or host:port"));
    }
    Url::parse(&format!("http://{address}/"))
        .map_err(|e| Error::invalid_address(address, &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("192.168.1.2").unwrap().as_str(), "http://192.168.1.2/");
        assert_eq!(base_url("127.0.0.1:8080").unwrap().as_str(), "http://127.0.0.1:8080/");
        assert!(base_url("").is_err());
        assert!(base_url("http://x/y").is_err());
    }

    #[test]
    fn test_redact_credential() {
        let client = BridgeClient::new("10.0.0.2").unwrap().with_credential("secret");
        assert_eq!(client.redact("api/secret/lights"), "api/<credential>/lights");
    }

    #[test]
    fn test_from_connection_requires_credential() {
        let connection = BridgeConnection::new("10.0.0.2", None);
        assert!(matches!(
            BridgeClient::from_connection(&connection),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected_locally() {
        let client = BridgeClient::new("10.0.0.2").unwrap().with_credential("abc");
        assert!(client.set_light_state("1", &StateUpdate::new()).await.is_err());
        assert!(client.history().await.is_empty());
    }
}
