//! Request and response shapes exchanged with the broker protocol layer.
//!
//! Provision and bind payloads are kept as the raw JSON the platform sent:
//! the broker compares them structurally and writes them back verbatim, and
//! only reads the handful of fields it needs through accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::BrokerError;

/// Permission a service must request from the platform to hand out volume mounts.
pub const PERMISSION_VOLUME_MOUNT: &str = "volume_mount";

/// Raw provision request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionDetails(pub Value);

impl ProvisionDetails {
    pub fn service_id(&self) -> Option<&str> { self.0.get("service_id").and_then(Value::as_str) }
    pub fn plan_id(&self) -> Option<&str> { self.0.get("plan_id").and_then(Value::as_str) }
}

impl From<Value> for ProvisionDetails {
    fn from(v: Value) -> Self { Self(v) }
}

/// Raw bind request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindDetails(pub Value);

impl BindDetails {
    /// Application the binding is for; `bind_resource.app_guid` is accepted as a fallback.
    pub fn app_guid(&self) -> Option<&str> {
        fn non_empty(v: &Value) -> Option<&str> {
            v.as_str().filter(|s| !s.trim().is_empty())
        }
        self.0
            .get("app_guid")
            .and_then(non_empty)
            .or_else(|| self.0.pointer("/bind_resource/app_guid").and_then(non_empty))
    }

    /// Arbitrary parameters object; absent and `null` both mean "no parameters".
    pub fn parameters(&self) -> Result<Option<&Map<String, Value>>, BrokerError> {
        match self.0.get("parameters") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(BrokerError::invalid_params("parameters must be a JSON object")),
        }
    }
}

impl From<Value> for BindDetails {
    fn from(v: Value) -> Self { Self(v) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateDetails(pub Value);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<String>,
    pub requires: Vec<String>,
    pub plans: Vec<ServicePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

/// Provisioning is always synchronous and has no dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedServiceSpec {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionServiceSpec {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDevice {
    pub volume_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub driver: String,
    pub container_dir: String,
    pub mode: String,
    pub device_type: String,
    pub device: SharedDevice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Always an object; the platform rejects a binding whose credentials are null.
    pub credentials: Value,
    pub volume_mounts: Vec<VolumeMount>,
}
