//! Contract with the external volume provisioner.
//!
//! The broker asks the provisioner to create a volume when an instance is
//! provisioned and to remove it on deprovision. Wire shapes follow the
//! voldriver JSON convention (`Name`, `Opts`, `Err`) so an existing driver
//! can be used unchanged.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::ProvisionerError;

pub mod http;

pub use http::HttpProvisioner;

/// Per-request context forwarded to the provisioner.
///
/// The broker never enforces a deadline itself; the provisioner is expected
/// to honor `timeout` on its own call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverEnv {
    pub request_id: String,
    pub timeout: Option<Duration>,
}

impl DriverEnv {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for DriverEnv {
    fn default() -> Self { Self::new(Uuid::new_v4().to_string()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Opts", default)]
    pub opts: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Provisioner reply; an empty `Err` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err", default)]
    pub err: String,
}

impl ErrorResponse {
    pub fn into_result(self) -> Result<(), ProvisionerError> {
        if self.err.is_empty() { Ok(()) } else { Err(ProvisionerError(self.err)) }
    }
}

/// Creates and removes the physical volume behind an instance.
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    async fn create(&self, env: &DriverEnv, req: CreateRequest) -> Result<(), ProvisionerError>;
    async fn remove(&self, env: &DriverEnv, req: RemoveRequest) -> Result<(), ProvisionerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_match_voldriver() {
        let mut opts = Map::new();
        opts.insert("volume_capability".into(), json!("mount"));
        let req = CreateRequest { name: "vol-1".into(), opts };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"Name": "vol-1", "Opts": {"volume_capability": "mount"}})
        );

        let ok: ErrorResponse = serde_json::from_value(json!({"Err": ""})).unwrap();
        assert!(ok.into_result().is_ok());
        let missing: ErrorResponse = serde_json::from_value(json!({})).unwrap();
        assert!(missing.into_result().is_ok());
        let failed: ErrorResponse = serde_json::from_value(json!({"Err": "no space"})).unwrap();
        assert_eq!(failed.into_result(), Err(ProvisionerError::new("no space")));
    }
}
