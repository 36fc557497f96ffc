//! Mount settings derived from bind parameters.

use serde_json::{Map, Value};

use crate::errors::BrokerError;

/// Base directory for container mounts when the app does not pick one.
pub const DEFAULT_CONTAINER_PATH: &str = "/var/vcap/data";

pub const MODE_READ_ONLY: &str = "r";
pub const MODE_READ_WRITE: &str = "rw";

/// `readonly: true` mounts read-only; absent or `false` mounts read-write.
pub fn evaluate_mode(params: Option<&Map<String, Value>>) -> Result<&'static str, BrokerError> {
    match params.and_then(|p| p.get("readonly")) {
        None => Ok(MODE_READ_WRITE),
        Some(Value::Bool(true)) => Ok(MODE_READ_ONLY),
        Some(Value::Bool(false)) => Ok(MODE_READ_WRITE),
        Some(other) => Err(BrokerError::invalid_params(format!("readonly must be a boolean, got {other}"))),
    }
}

/// A non-empty `mount` string wins; otherwise `<DEFAULT_CONTAINER_PATH>/<volume_id>`.
pub fn evaluate_container_path(params: Option<&Map<String, Value>>, volume_id: &str) -> Result<String, BrokerError> {
    match params.and_then(|p| p.get("mount")) {
        Some(Value::String(path)) if !path.is_empty() => Ok(path.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(format!("{DEFAULT_CONTAINER_PATH}/{volume_id}")),
        Some(other) => Err(BrokerError::invalid_params(format!("mount must be a string, got {other}"))),
    }
}
