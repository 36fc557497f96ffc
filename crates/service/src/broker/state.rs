//! Dynamic broker state and its JSON state file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{BindDetails, ProvisionDetails};
use crate::errors::BrokerError;
use crate::storage::StateFs;

/// Instances and bindings currently registered.
///
/// Field names match the state file written by earlier broker releases so
/// an existing file restores unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicState {
    #[serde(rename = "InstanceMap", default, deserialize_with = "null_as_empty")]
    pub instances: HashMap<String, ProvisionDetails>,
    #[serde(rename = "BindingMap", default, deserialize_with = "null_as_empty")]
    pub bindings: HashMap<String, BindDetails>,
}

fn null_as_empty<'de, D, V>(de: D) -> Result<HashMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    Ok(Option::<HashMap<String, V>>::deserialize(de)?.unwrap_or_default())
}

/// Serialize the whole state and write it to `path`.
pub async fn persist(fs: &dyn StateFs, path: &Path, state: &DynamicState) -> Result<(), BrokerError> {
    let data = serde_json::to_vec(state)
        .map_err(|e| BrokerError::Persistence(format!("cannot encode state: {e}")))?;
    fs.write(path, &data)
        .await
        .map_err(|e| BrokerError::Persistence(format!("cannot write {}: {e}", path.display())))
}

/// Read and decode the state stored at `path`.
pub async fn restore(fs: &dyn StateFs, path: &Path) -> Result<DynamicState, BrokerError> {
    let data = fs
        .read(path)
        .await
        .map_err(|e| BrokerError::Persistence(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_slice(&data)
        .map_err(|e| BrokerError::Persistence(format!("cannot decode {}: {e}", path.display())))
}
