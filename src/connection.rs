//! Bridge connection details and their persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::discovery::BridgeCandidate;
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Address, credential and display name of the bridge in use.
///
/// A connection without a credential is unauthenticated; pairing fills the
/// credential in.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BridgeConnection {
    #[serde(rename = "ipAddress")]
    address: String,
    #[serde(rename = "username", default, with = "empty_as_none")]
    credential: Option<String>,
    #[serde(default, with = "empty_as_none")]
    name: Option<String>,
}

impl BridgeConnection {
    pub fn new(address: &str, name: Option<&str>) -> Self {
        BridgeConnection {
            address: address.to_string(),
            credential: None,
            name: name.map(String::from),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Record the credential issued by pairing.
    pub fn authenticate(&mut self, credential: &str) {
        self.credential = Some(credential.to_string()).filter(|c| !c.is_empty());
    }
}

impl From<&BridgeCandidate> for BridgeConnection {
    fn from(candidate: &BridgeCandidate) -> Self {
        BridgeConnection::new(&candidate.address, Some(&candidate.name))
    }
}

/// JSON file holding the connection between runs, so the user does not
/// have to pair again.
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub const FILE_NAME: &'static str = "bridge_config.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConnectionStore { path: path.into() }
    }

    /// A store at `bridge_config.json` inside the host's application directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved connection; `None` if nothing was saved.
    pub fn load(&self) -> Result<Option<BridgeConnection>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.storage_error(err)),
        };
        let connection = serde_json::from_slice(&data).map_err(Error::JsonLoad)?;
        Ok(Some(connection))
    }

    pub fn save(&self, connection: &BridgeConnection) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.storage_error(e))?;
        }
        let data = serde_json::to_vec_pretty(connection).map_err(Error::JsonDump)?;
        fs::write(&self.path, data).map_err(|e| self.storage_error(e))?;
        debug!("Saved bridge connection to {:?}", self.path);
        Ok(())
    }

    /// Forget the saved connection (disconnect). Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    fn storage_error(&self, err: std::io::Error) -> Error {
        Error::Storage {
            path: self.path.clone(),
            err,
        }
    }
}

/// Persisted files write absent values as empty strings.
mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|s| !s.is_empty()))
    }
}
