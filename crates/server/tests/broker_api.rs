use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use server::routes::{self, AppState};
use service::broker::{Broker, BrokerStatic};
use service::errors::ProvisionerError;
use service::provisioner::{CreateRequest, DriverEnv, RemoveRequest, VolumeProvisioner};
use service::storage::MemoryFs;

/// Provisioner double that refuses any volume whose name starts with `bad`.
#[derive(Default)]
struct StubProvisioner {
    request_ids: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl VolumeProvisioner for StubProvisioner {
    async fn create(&self, env: &DriverEnv, req: CreateRequest) -> Result<(), ProvisionerError> {
        self.request_ids.lock().unwrap().push(env.request_id.clone());
        if req.name.starts_with("bad") {
            return Err(ProvisionerError::new(format!("cannot create {}", req.name)));
        }
        Ok(())
    }

    async fn remove(&self, _env: &DriverEnv, _req: RemoveRequest) -> Result<(), ProvisionerError> {
        Ok(())
    }
}

fn cors() -> tower_http::cors::CorsLayer { tower_http::cors::CorsLayer::permissive() }

struct TestApp {
    router: Router,
    broker: Arc<Broker>,
    provisioner: Arc<StubProvisioner>,
}

async fn build_app() -> TestApp {
    let provisioner = Arc::new(StubProvisioner::default());
    let static_state = BrokerStatic {
        service_name: "csi-volume".into(),
        service_id: "svc-id".into(),
        plan_name: "free".into(),
        plan_id: "plan-id".into(),
        plan_desc: "free csi filesystem".into(),
        description: "CSI volume service".into(),
        tags: vec!["csi".into()],
        volume_driver: "localdriver".into(),
    };
    let broker = Broker::new(static_state, provisioner.clone(), Arc::new(MemoryFs::new()), "/data", "1.0.0").await;
    let state = AppState { broker: broker.clone(), provisioner_timeout: Some(Duration::from_secs(5)) };
    TestApp { router: routes::build_router(state, cors()), broker, provisioner }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .header("X-Broker-API-Request-Identity", "rid-123")
            .body(Body::from(v.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    let res = app.router.clone().oneshot(req).await?;
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    Ok((status, value))
}

#[tokio::test]
async fn catalog_lists_one_service() -> anyhow::Result<()> {
    let app = build_app().await;
    let (status, body) = send(&app, "GET", "/v2/catalog", None).await?;
    assert_eq!(status, StatusCode::OK);
    let services = body["services"].as_array().expect("services array");
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["name"], "csi-volume");
    assert_eq!(services[0]["requires"], json!(["volume_mount"]));
    assert_eq!(services[0]["plans"][0]["id"], "plan-id");
    Ok(())
}

#[tokio::test]
async fn provision_lifecycle_over_http() -> anyhow::Result<()> {
    let app = build_app().await;
    let one_gig = json!({"service_id": "svc-id", "plan_id": "plan-id", "parameters": {"size": "1G"}});

    let (status, body) = send(&app, "PUT", "/v2/service_instances/vol-1", Some(one_gig.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({}));
    assert_eq!(app.provisioner.request_ids.lock().unwrap()[0], "rid-123");

    let two_gig = json!({"service_id": "svc-id", "plan_id": "plan-id", "parameters": {"size": "2G"}});
    let (status, body) = send(&app, "PUT", "/v2/service_instances/vol-1", Some(two_gig)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InstanceAlreadyExists");

    let (status, _) = send(&app, "PUT", "/v2/service_instances/vol-1", Some(one_gig)).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "DELETE", "/v2/service_instances/vol-1?service_id=svc-id&plan_id=plan-id", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(app.broker.snapshot().await.instances.is_empty());

    let (status, _) = send(&app, "DELETE", "/v2/service_instances/vol-1", None).await?;
    assert_eq!(status, StatusCode::GONE);
    Ok(())
}

#[tokio::test]
async fn provisioner_error_is_passed_through() -> anyhow::Result<()> {
    let app = build_app().await;
    let (status, body) = send(&app, "PUT", "/v2/service_instances/bad-vol", Some(json!({"plan_id": "plan-id"}))).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "ProvisionerFailure");
    assert_eq!(body["description"], "cannot create bad-vol");
    assert!(app.broker.snapshot().await.instances.is_empty());
    Ok(())
}

#[tokio::test]
async fn bind_and_unbind_over_http() -> anyhow::Result<()> {
    let app = build_app().await;

    let bind_body = json!({"app_guid": "app-1", "plan_id": "plan-id", "parameters": {"readonly": true}});
    let (status, _) = send(&app, "PUT", "/v2/service_instances/vol-1/service_bindings/b-1", Some(bind_body.clone())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", "/v2/service_instances/vol-1", Some(json!({"plan_id": "plan-id"}))).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "PUT", "/v2/service_instances/vol-1/service_bindings/b-1", Some(bind_body)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["credentials"], json!({}));
    assert_eq!(body["volume_mounts"][0]["mode"], "r");
    assert_eq!(body["volume_mounts"][0]["container_dir"], "/var/vcap/data/vol-1");
    assert_eq!(body["volume_mounts"][0]["device"]["volume_id"], "vol-1");

    let (status, body) = send(
        &app,
        "PUT",
        "/v2/service_instances/vol-1/service_bindings/b-2",
        Some(json!({"plan_id": "plan-id"})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "RequiresApp");

    let (status, _) = send(&app, "DELETE", "/v2/service_instances/vol-1/service_bindings/b-1", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", "/v2/service_instances/vol-1/service_bindings/b-1", None).await?;
    assert_eq!(status, StatusCode::GONE);
    Ok(())
}

#[tokio::test]
async fn update_and_last_operation_are_not_implemented() -> anyhow::Result<()> {
    let app = build_app().await;
    let (status, body) = send(&app, "PATCH", "/v2/service_instances/vol-1", Some(json!({"plan_id": "other"}))).await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"], "Unsupported");

    // no body and no content-type
    let (status, body) = send(&app, "PATCH", "/v2/service_instances/vol-1", None).await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"], "Unsupported");

    let (status, _) = send(&app, "GET", "/v2/service_instances/vol-1/last_operation", None).await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    Ok(())
}

#[tokio::test]
async fn health_and_metrics() -> anyhow::Result<()> {
    let app = build_app().await;
    let (status, body) = send(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    // drive one operation so the counter family exists
    let _ = send(&app, "GET", "/v2/service_instances/x/last_operation", None).await?;
    let res = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(res.into_body(), usize::MAX).await?.to_vec())?;
    assert!(text.contains("csibroker_operations_total"));
    Ok(())
}
