#![cfg(test)]
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ProvisionerError;
use crate::provisioner::{CreateRequest, DriverEnv, RemoveRequest, VolumeProvisioner};

/// Provisioner double: records calls, fails names listed in `fail`, optionally sleeps.
#[derive(Default)]
pub struct FakeProvisioner {
    pub creates: Mutex<Vec<CreateRequest>>,
    pub removes: Mutex<Vec<RemoveRequest>>,
    pub envs: Mutex<Vec<DriverEnv>>,
    fail: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl FakeProvisioner {
    pub fn new() -> Self { Self::default() }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn fail_for(&self, name: &str) {
        self.fail.lock().unwrap().insert(name.to_string());
    }

    pub fn create_count(&self) -> usize { self.creates.lock().unwrap().len() }

    pub fn remove_count(&self) -> usize { self.removes.lock().unwrap().len() }

    fn outcome(&self, name: &str) -> Result<(), ProvisionerError> {
        if self.fail.lock().unwrap().contains(name) {
            Err(ProvisionerError(format!("driver refused {name}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VolumeProvisioner for FakeProvisioner {
    async fn create(&self, env: &DriverEnv, req: CreateRequest) -> Result<(), ProvisionerError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.envs.lock().unwrap().push(env.clone());
        let out = self.outcome(&req.name);
        self.creates.lock().unwrap().push(req);
        out
    }

    async fn remove(&self, env: &DriverEnv, req: RemoveRequest) -> Result<(), ProvisionerError> {
        self.envs.lock().unwrap().push(env.clone());
        let out = self.outcome(&req.name);
        self.removes.lock().unwrap().push(req);
        out
    }
}
