//! Broker state manager.
//!
//! Holds the advertised service identity and the registry of provisioned
//! instances and active bindings. Every mutating operation runs under one
//! async mutex, including the provisioner call, and flushes the full state
//! to the state file before the lock is released, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    BindDetails, Binding, Catalog, DeprovisionDetails, DeprovisionServiceSpec, ProvisionDetails,
    ProvisionedServiceSpec, Service, ServicePlan, SharedDevice, UnbindDetails, UpdateDetails, VolumeMount,
    PERMISSION_VOLUME_MOUNT,
};
use crate::errors::BrokerError;
use crate::metrics;
use crate::provisioner::{CreateRequest, DriverEnv, RemoveRequest, VolumeProvisioner};
use crate::storage::{state_file_path, StateFs};

pub mod conflict;
pub mod params;
pub mod state;

pub use state::DynamicState;

use conflict::conflicts;

const DEVICE_TYPE_SHARED: &str = "shared";

/// Identity of the one service and plan this broker advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatic {
    pub service_name: String,
    pub service_id: String,
    pub plan_name: String,
    pub plan_id: String,
    pub plan_desc: String,
    pub description: String,
    pub tags: Vec<String>,
    pub volume_driver: String,
}

impl BrokerStatic {
    pub fn from_config(cfg: &configs::BrokerConfig) -> Self {
        Self {
            service_name: cfg.service_name.clone(),
            service_id: cfg.service_id.clone(),
            plan_name: cfg.plan_name.clone(),
            plan_id: cfg.plan_id.clone(),
            plan_desc: cfg.plan_desc.clone(),
            description: cfg.description.clone(),
            tags: cfg.tags.clone(),
            volume_driver: cfg.volume_driver.clone(),
        }
    }
}

pub struct Broker {
    static_state: BrokerStatic,
    provisioner: Arc<dyn VolumeProvisioner>,
    fs: Arc<dyn StateFs>,
    state_file: PathBuf,
    spec_version: String,
    dynamic: Mutex<DynamicState>,
}

impl Broker {
    /// Build the broker and load whatever state was last flushed.
    ///
    /// A missing or unreadable state file is logged and the broker starts empty.
    pub async fn new(
        static_state: BrokerStatic,
        provisioner: Arc<dyn VolumeProvisioner>,
        fs: Arc<dyn StateFs>,
        data_dir: impl AsRef<Path>,
        spec_version: impl Into<String>,
    ) -> Arc<Self> {
        let state_file = state_file_path(data_dir, &static_state.service_name);
        let broker = Self {
            static_state,
            provisioner,
            fs,
            state_file,
            spec_version: spec_version.into(),
            dynamic: Mutex::new(DynamicState::default()),
        };
        broker.restore_dynamic_state().await;
        Arc::new(broker)
    }

    async fn restore_dynamic_state(&self) {
        let state_file = self.state_file.display().to_string();
        match state::restore(self.fs.as_ref(), &self.state_file).await {
            Ok(restored) => {
                info!(
                    event = "state_restored",
                    %state_file,
                    instances = restored.instances.len(),
                    bindings = restored.bindings.len(),
                    "broker state restored"
                );
                *self.dynamic.lock().await = restored;
            }
            Err(e) => {
                warn!(event = "state_restore_skipped", %state_file, error = %e, "starting with empty broker state");
            }
        }
    }

    /// Write the whole state; failures are logged and counted, never returned.
    async fn flush(&self, state: &DynamicState) {
        match state::persist(self.fs.as_ref(), &self.state_file, state).await {
            Ok(()) => debug!(event = "state_saved", state_file = %self.state_file.display(), "broker state saved"),
            Err(e) => {
                metrics::PERSISTENCE_FAILURES_TOTAL.inc();
                error!(
                    event = "state_save_failed",
                    state_file = %self.state_file.display(),
                    error = %e,
                    "failed to write state file"
                );
            }
        }
    }

    pub fn state_file(&self) -> &Path { &self.state_file }

    /// Copy of the current dynamic state.
    pub async fn snapshot(&self) -> DynamicState {
        self.dynamic.lock().await.clone()
    }

    /// The single service offering, built from static config only.
    pub fn services(&self) -> Vec<Service> {
        let s = &self.static_state;
        vec![Service {
            id: s.service_id.clone(),
            name: s.service_name.clone(),
            description: s.description.clone(),
            bindable: true,
            plan_updateable: false,
            tags: s.tags.clone(),
            requires: vec![PERMISSION_VOLUME_MOUNT.to_string()],
            plans: vec![ServicePlan {
                id: s.plan_id.clone(),
                name: s.plan_name.clone(),
                description: s.plan_desc.clone(),
            }],
        }]
    }

    pub fn catalog(&self) -> Catalog {
        Catalog { services: self.services() }
    }

    #[instrument(skip(self, env, details), fields(request_id = %env.request_id))]
    pub async fn provision(
        &self,
        env: &DriverEnv,
        instance_id: &str,
        details: ProvisionDetails,
        async_allowed: bool,
    ) -> Result<ProvisionedServiceSpec, BrokerError> {
        info!(
            event = "start",
            async_allowed,
            service_id = details.service_id(),
            plan_id = details.plan_id(),
            "provision"
        );
        let mut state = self.dynamic.lock().await;
        let result = self.provision_locked(&mut state, env, instance_id, details).await;
        self.flush(&state).await;
        drop(state);
        metrics::record("provision", &result);
        info!(event = "end", ok = result.is_ok(), "provision");
        result
    }

    async fn provision_locked(
        &self,
        state: &mut DynamicState,
        env: &DriverEnv,
        instance_id: &str,
        details: ProvisionDetails,
    ) -> Result<ProvisionedServiceSpec, BrokerError> {
        if conflicts(&state.instances, instance_id, &details) {
            error!(event = "instance_already_exists", %instance_id, "provision request differs from existing instance");
            return Err(BrokerError::InstanceAlreadyExists);
        }

        let mut opts = Map::new();
        opts.insert("version".into(), json!(self.spec_version));
        opts.insert("volume_capability".into(), json!("mount"));
        let req = CreateRequest { name: instance_id.to_string(), opts };
        if let Err(e) = self.provisioner.create(env, req).await {
            error!(event = "provisioner_create_failed", %instance_id, error = %e, "provisioner create failed");
            return Err(e.into());
        }

        state.instances.insert(instance_id.to_string(), details);
        Ok(ProvisionedServiceSpec::default())
    }

    #[instrument(skip(self, env, details), fields(request_id = %env.request_id))]
    pub async fn deprovision(
        &self,
        env: &DriverEnv,
        instance_id: &str,
        details: DeprovisionDetails,
        async_allowed: bool,
    ) -> Result<DeprovisionServiceSpec, BrokerError> {
        info!(event = "start", async_allowed, plan_id = %details.plan_id, "deprovision");
        let mut state = self.dynamic.lock().await;
        let result = self.deprovision_locked(&mut state, env, instance_id).await;
        self.flush(&state).await;
        drop(state);
        metrics::record("deprovision", &result);
        info!(event = "end", ok = result.is_ok(), "deprovision");
        result
    }

    async fn deprovision_locked(
        &self,
        state: &mut DynamicState,
        env: &DriverEnv,
        instance_id: &str,
    ) -> Result<DeprovisionServiceSpec, BrokerError> {
        if !state.instances.contains_key(instance_id) {
            return Err(BrokerError::InstanceNotFound);
        }

        let req = RemoveRequest { name: instance_id.to_string() };
        if let Err(e) = self.provisioner.remove(env, req).await {
            error!(event = "provisioner_remove_failed", %instance_id, error = %e, "provisioner remove failed");
            return Err(e.into());
        }

        state.instances.remove(instance_id);
        Ok(DeprovisionServiceSpec::default())
    }

    #[instrument(skip(self, env, details), fields(request_id = %env.request_id))]
    pub async fn bind(
        &self,
        env: &DriverEnv,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Binding, BrokerError> {
        info!(event = "start", "bind");
        let mut state = self.dynamic.lock().await;
        let result = self.bind_locked(&mut state, instance_id, binding_id, details);
        self.flush(&state).await;
        drop(state);
        metrics::record("bind", &result);
        info!(event = "end", ok = result.is_ok(), "bind");
        result
    }

    fn bind_locked(
        &self,
        state: &mut DynamicState,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Binding, BrokerError> {
        if !state.instances.contains_key(instance_id) {
            return Err(BrokerError::InstanceNotFound);
        }
        if details.app_guid().is_none() {
            return Err(BrokerError::MissingApplicationReference);
        }

        let params = details.parameters()?;
        let mode = params::evaluate_mode(params)?;
        let container_dir = params::evaluate_container_path(params, instance_id)?;

        if conflicts(&state.bindings, binding_id, &details) {
            error!(event = "binding_already_exists", %binding_id, "bind request differs from existing binding");
            return Err(BrokerError::BindingAlreadyExists);
        }

        state.bindings.insert(binding_id.to_string(), details);

        Ok(Binding {
            credentials: json!({}),
            volume_mounts: vec![VolumeMount {
                driver: self.static_state.volume_driver.clone(),
                container_dir,
                mode: mode.to_string(),
                device_type: DEVICE_TYPE_SHARED.to_string(),
                device: SharedDevice { volume_id: instance_id.to_string(), mount_config: None },
            }],
        })
    }

    #[instrument(skip(self, env, details), fields(request_id = %env.request_id))]
    pub async fn unbind(
        &self,
        env: &DriverEnv,
        instance_id: &str,
        binding_id: &str,
        details: UnbindDetails,
    ) -> Result<(), BrokerError> {
        info!(event = "start", plan_id = %details.plan_id, "unbind");
        let mut state = self.dynamic.lock().await;
        let result = Self::unbind_locked(&mut state, instance_id, binding_id);
        self.flush(&state).await;
        drop(state);
        metrics::record("unbind", &result);
        info!(event = "end", ok = result.is_ok(), "unbind");
        result
    }

    fn unbind_locked(state: &mut DynamicState, instance_id: &str, binding_id: &str) -> Result<(), BrokerError> {
        if !state.instances.contains_key(instance_id) {
            return Err(BrokerError::InstanceNotFound);
        }
        if state.bindings.remove(binding_id).is_none() {
            return Err(BrokerError::BindingNotFound);
        }
        Ok(())
    }

    /// Plan changes are outside this broker's capabilities.
    pub async fn update(
        &self,
        instance_id: &str,
        _details: UpdateDetails,
        _async_allowed: bool,
    ) -> Result<(), BrokerError> {
        error!(event = "unsupported_operation", operation = "update", %instance_id, "update called on a broker that cannot update");
        let result = Err(BrokerError::Unsupported("update"));
        metrics::record("update", &result);
        result
    }

    /// Every operation completes synchronously, so there is never an operation to poll.
    pub async fn last_operation(&self, instance_id: &str, _operation_data: Option<&str>) -> Result<(), BrokerError> {
        error!(event = "unsupported_operation", operation = "last_operation", %instance_id, "last_operation called on a synchronous broker");
        let result = Err(BrokerError::Unsupported("last_operation"));
        metrics::record("last_operation", &result);
        result
    }
}
