//! Runtime wiring helpers
//!
//! Builds the broker from configuration so binaries and tests share one
//! construction path.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::broker::{Broker, BrokerStatic};
use crate::errors::ProvisionerError;
use crate::provisioner::HttpProvisioner;
use crate::storage::LocalFs;

/// Broker backed by the HTTP provisioner and the local file system.
pub async fn build_broker(cfg: &configs::AppConfig) -> Result<Arc<Broker>, ProvisionerError> {
    let provisioner = HttpProvisioner::new(
        cfg.provisioner.url.clone(),
        Duration::from_secs(cfg.provisioner.timeout_secs),
    )?;
    info!(provisioner_url = %cfg.provisioner.url, data_dir = %cfg.broker.data_dir, "building broker");
    let broker = Broker::new(
        BrokerStatic::from_config(&cfg.broker),
        Arc::new(provisioner),
        Arc::new(LocalFs),
        &cfg.broker.data_dir,
        cfg.broker.spec_version.clone(),
    )
    .await;
    Ok(broker)
}
