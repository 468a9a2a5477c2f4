//! Bridge response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// A structured error reported by the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeError {
    #[serde(rename = "type")]
    pub code: u16,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl From<BridgeError> for Error {
    fn from(err: BridgeError) -> Self {
        Error::Bridge {
            code: err.code,
            description: err.description,
        }
    }
}

/// One item of a bridge response array.
///
/// Write requests answer with `[{"success": {...}}, {"error": {...}}, ...]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseItem {
    Success(Value),
    Error(BridgeError),
}

/// Parse a response array, returning the success payloads or the first
/// error item.
pub(crate) fn parse_items(body: Value) -> Result<Vec<Value>> {
    let items: Vec<ResponseItem> = serde_json::from_value(body).map_err(Error::JsonLoad)?;
    items
        .into_iter()
        .map(|item| match item {
            ResponseItem::Success(value) => Ok(value),
            ResponseItem::Error(err) => Err(err.into()),
        })
        .collect()
}

/// Read endpoints answer with an object on success but with an error
/// array on failure (for example an unknown credential). Return the error
/// if `body` is such an array.
pub(crate) fn check_error_array(body: &Value) -> Result<()> {
    let Some(items) = body.as_array() else {
        return Ok(());
    };
    for item in items {
        if let Ok(ResponseItem::Error(err)) = serde_json::from_value::<ResponseItem>(item.clone()) {
            return Err(err.into());
        }
    }
    Ok(())
}
