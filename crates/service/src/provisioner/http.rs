use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::{CreateRequest, DriverEnv, ErrorResponse, RemoveRequest, VolumeProvisioner};
use crate::errors::ProvisionerError;

/// Header carrying the broker request id to the provisioner.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Provisioner reached over HTTP: `POST <base>/create` and `POST <base>/remove`.
#[derive(Clone)]
pub struct HttpProvisioner {
    client: Client,
    base_url: String,
    default_timeout: Duration,
}

impl HttpProvisioner {
    pub fn new(base_url: impl Into<String>, default_timeout: Duration) -> Result<Self, ProvisionerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProvisionerError(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout,
        })
    }

    async fn call<T: Serialize + Sync>(&self, env: &DriverEnv, route: &str, body: &T) -> Result<(), ProvisionerError> {
        let url = format!("{}/{}", self.base_url, route);
        let timeout = env.timeout.unwrap_or(self.default_timeout);
        debug!(%url, request_id = %env.request_id, ?timeout, "calling provisioner");

        let resp = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, &env.request_id)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, request_id = %env.request_id, error = %e, "provisioner unreachable");
                ProvisionerError(format!("{route} request failed: {e}"))
            })?;

        let status = resp.status();
        let reply: ErrorResponse = resp
            .json()
            .await
            .map_err(|e| ProvisionerError(format!("{route} returned {status} with an unreadable body: {e}")))?;
        reply.into_result()?;
        if !status.is_success() {
            return Err(ProvisionerError(format!("{route} returned {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl VolumeProvisioner for HttpProvisioner {
    async fn create(&self, env: &DriverEnv, req: CreateRequest) -> Result<(), ProvisionerError> {
        self.call(env, "create", &req).await
    }

    async fn remove(&self, env: &DriverEnv, req: RemoveRequest) -> Result<(), ProvisionerError> {
        self.call(env, "remove", &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn record(seen: &Seen, route: &str, headers: &HeaderMap, body: Value) {
        let rid = headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()).map(String::from);
        seen.lock().unwrap().push((route.to_string(), rid, body));
    }

    // Fake driver: creating "bad" fails, removing anything succeeds, "slow" never answers in time.
    async fn start_driver() -> anyhow::Result<(String, Seen)> {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/create",
                post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    record(&seen, "create", &headers, body.clone()).await;
                    match body["Name"].as_str() {
                        Some("bad") => Json(json!({"Err": "volume backend refused bad"})),
                        Some("slow") => {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            Json(json!({"Err": ""}))
                        }
                        _ => Json(json!({"Err": ""})),
                    }
                }),
            )
            .route(
                "/remove",
                post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    record(&seen, "remove", &headers, body).await;
                    Json(json!({"Err": ""}))
                }),
            )
            .with_state(seen.clone());
        let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok((format!("http://{addr}/"), seen))
    }

    #[tokio::test]
    async fn create_and_remove_round_trip() -> anyhow::Result<()> {
        let (base, seen) = start_driver().await?;
        let p = HttpProvisioner::new(base, Duration::from_secs(2))?;
        let env = DriverEnv::new("req-42");

        let mut opts = serde_json::Map::new();
        opts.insert("volume_capability".into(), json!("mount"));
        p.create(&env, CreateRequest { name: "vol-1".into(), opts }).await?;
        p.remove(&env, RemoveRequest { name: "vol-1".into() }).await?;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "create");
        assert_eq!(seen[0].1.as_deref(), Some("req-42"));
        assert_eq!(seen[0].2, json!({"Name": "vol-1", "Opts": {"volume_capability": "mount"}}));
        assert_eq!(seen[1].0, "remove");
        assert_eq!(seen[1].2, json!({"Name": "vol-1"}));
        Ok(())
    }

    #[tokio::test]
    async fn driver_error_text_is_returned_verbatim() -> anyhow::Result<()> {
        let (base, _) = start_driver().await?;
        let p = HttpProvisioner::new(base, Duration::from_secs(2))?;
        let err = p
            .create(&DriverEnv::default(), CreateRequest { name: "bad".into(), opts: Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err, ProvisionerError::new("volume backend refused bad"));
        Ok(())
    }

    #[tokio::test]
    async fn env_timeout_is_honored() -> anyhow::Result<()> {
        let (base, _) = start_driver().await?;
        let p = HttpProvisioner::new(base, Duration::from_secs(30))?;
        let env = DriverEnv::new("t").with_timeout(Duration::from_millis(100));
        let err = p
            .create(&env, CreateRequest { name: "slow".into(), opts: Default::default() })
            .await
            .unwrap_err();
        assert!(err.0.starts_with("create request failed"), "got {err}");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_driver_is_a_provisioner_error() -> anyhow::Result<()> {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(listener);
        let p = HttpProvisioner::new(format!("http://{addr}"), Duration::from_secs(1))?;
        let err = p.remove(&DriverEnv::default(), RemoveRequest { name: "x".into() }).await.unwrap_err();
        assert!(err.0.starts_with("remove request failed"));
        Ok(())
    }
}
