use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8999, worker_threads: Some(4) }
    }
}

/// Identity of the single service/plan this broker advertises, plus where it keeps state.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_id")]
    pub service_id: String,
    #[serde(default = "default_plan_name")]
    pub plan_name: String,
    #[serde(default = "default_plan_id")]
    pub plan_id: String,
    #[serde(default = "default_plan_desc")]
    pub plan_desc: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_volume_driver")]
    pub volume_driver: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_id: default_service_id(),
            plan_name: default_plan_name(),
            plan_id: default_plan_id(),
            plan_desc: default_plan_desc(),
            description: default_description(),
            tags: default_tags(),
            volume_driver: default_volume_driver(),
            data_dir: default_data_dir(),
            spec_version: default_spec_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_provisioner_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self { url: String::new(), timeout_secs: default_provisioner_timeout() }
    }
}

fn default_service_name() -> String { "csi-volume".into() }
fn default_service_id() -> String { "csi-volume-service".into() }
fn default_plan_name() -> String { "free".into() }
fn default_plan_id() -> String { "free-plan".into() }
fn default_plan_desc() -> String { "free csi filesystem".into() }
fn default_description() -> String { "CSI volume service".into() }
fn default_tags() -> Vec<String> { vec!["csi".into()] }
fn default_volume_driver() -> String { "localdriver".into() }
fn default_data_dir() -> String { "data".into() }
fn default_spec_version() -> String { "0.0.1".into() }
fn default_provisioner_timeout() -> u64 { 30 }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `CONFIG_PATH` (or `config.toml`); a missing file falls back to defaults
    /// so the broker can run purely from environment variables.
    pub fn load_and_validate() -> Result<Self> {
        // file first, then env overrides, then checks
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if is_not_found(&e) => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Fill or override settings from environment variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server bind settings
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(threads) = lookup("TOKIO_WORKER_THREADS").and_then(|v| v.parse::<usize>().ok()) {
            self.server.worker_threads = Some(threads);
        }
        // State file location
        if let Some(dir) = lookup("BROKER_DATA_DIR") {
            self.broker.data_dir = dir;
        }
        // Provisioner URL only fills a missing value
        if self.provisioner.url.trim().is_empty() {
            if let Some(url) = lookup("PROVISIONER_URL") {
                self.provisioner.url = url;
            }
        }
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.broker.validate()?;
        self.provisioner.validate()?;
        Ok(())
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        // Default worker threads
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("broker.service_name", &self.service_name),
            ("broker.service_id", &self.service_id),
            ("broker.plan_name", &self.plan_name),
            ("broker.plan_id", &self.plan_id),
            ("broker.data_dir", &self.data_dir),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must not be empty"));
            }
        }
        // the service name becomes part of the state file name
        if self.service_name.contains(['/', '\\']) {
            return Err(anyhow!("broker.service_name must not contain path separators"));
        }
        Ok(())
    }
}

impl ProvisionerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("provisioner.url is empty; set it in config.toml or PROVISIONER_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(anyhow!("provisioner.url must start with http:// or https://"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("provisioner.timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }
}
