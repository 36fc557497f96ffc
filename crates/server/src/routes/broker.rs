//! Service broker v2 handlers.
//!
//! Each handler only translates HTTP into a broker call. Mutating calls run
//! on their own task so a dropped client connection cannot cut an operation
//! off between the state change and the state flush.

use std::future::Future;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use service::domain::{
    BindDetails, Binding, Catalog, DeprovisionDetails, ProvisionDetails, ProvisionedServiceSpec, UnbindDetails,
    UpdateDetails,
};
use service::errors::BrokerError;
use service::provisioner::DriverEnv;

use super::AppState;
use crate::errors::ApiError;

/// Request id headers, most specific first.
const REQUEST_ID_HEADERS: [&str; 2] = ["X-Broker-API-Request-Identity", "X-Request-Id"];

#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    pub operation: Option<String>,
}

fn driver_env(state: &AppState, headers: &HeaderMap) -> DriverEnv {
    let request_id = REQUEST_ID_HEADERS
        .iter()
        .find_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()))
        .filter(|v| !v.trim().is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let env = DriverEnv::new(request_id);
    match state.provisioner_timeout {
        Some(t) => env.with_timeout(t),
        None => env,
    }
}

async fn detached<T, F>(fut: F) -> Result<T, BrokerErrorOrJoin>
where
    F: Future<Output = Result<T, BrokerError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(res) => res.map_err(BrokerErrorOrJoin::Broker),
        Err(e) => Err(BrokerErrorOrJoin::Join(e.to_string())),
    }
}

enum BrokerErrorOrJoin {
    Broker(BrokerError),
    Join(String),
}

impl BrokerErrorOrJoin {
    fn into_api(self, map: fn(BrokerError) -> ApiError) -> ApiError {
        match self {
            BrokerErrorOrJoin::Broker(e) => map(e),
            BrokerErrorOrJoin::Join(msg) => ApiError::internal(format!("broker task failed: {msg}")),
        }
    }
}

pub async fn catalog(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.broker.catalog())
}

pub async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(q): Query<AsyncQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ProvisionedServiceSpec>), ApiError> {
    let env = driver_env(&state, &headers);
    let broker = state.broker.clone();
    let spec = detached(async move {
        broker.provision(&env, &instance_id, ProvisionDetails(body), q.accepts_incomplete).await
    })
    .await
    .map_err(|e| e.into_api(ApiError::from_broker))?;
    Ok((StatusCode::CREATED, Json(spec)))
}

pub async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(q): Query<PlanQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let env = driver_env(&state, &headers);
    let broker = state.broker.clone();
    let details = DeprovisionDetails { service_id: q.service_id, plan_id: q.plan_id };
    detached(async move { broker.deprovision(&env, &instance_id, details, q.accepts_incomplete).await })
        .await
        .map_err(|e| e.into_api(ApiError::from_deprovision))?;
    Ok(Json(serde_json::json!({})))
}

pub async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Binding>), ApiError> {
    let env = driver_env(&state, &headers);
    let broker = state.broker.clone();
    let binding = detached(async move { broker.bind(&env, &instance_id, &binding_id, BindDetails(body)).await })
        .await
        .map_err(|e| e.into_api(ApiError::from_broker))?;
    Ok((StatusCode::CREATED, Json(binding)))
}

pub async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(q): Query<PlanQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let env = driver_env(&state, &headers);
    let broker = state.broker.clone();
    let details = UnbindDetails { service_id: q.service_id, plan_id: q.plan_id };
    detached(async move { broker.unbind(&env, &instance_id, &binding_id, details).await })
        .await
        .map_err(|e| e.into_api(ApiError::from_broker))?;
    Ok(Json(serde_json::json!({})))
}

pub async fn update(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(q): Query<AsyncQuery>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ApiError> {
    // a missing or unreadable body still gets the capability answer
    let details = body.map(|Json(v)| UpdateDetails(v)).unwrap_or_default();
    state.broker.update(&instance_id, details, q.accepts_incomplete).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(q): Query<LastOperationQuery>,
) -> Result<Json<Value>, ApiError> {
    state.broker.last_operation(&instance_id, q.operation.as_deref()).await?;
    Ok(Json(serde_json::json!({})))
}
