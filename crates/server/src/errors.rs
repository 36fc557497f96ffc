use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use service::errors::BrokerError;
use thiserror::Error;
use tracing::{error, warn};

/// Error body in the service broker format: `{"error": ..., "description": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub description: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, description: impl Into<String>) -> Self {
        Self { status, error: error.into(), description: description.into() }
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", description)
    }

    pub fn from_broker(e: BrokerError) -> Self { e.into() }

    /// Deprovision reports a missing instance as gone rather than not found.
    pub fn from_deprovision(e: BrokerError) -> Self {
        match e {
            BrokerError::InstanceNotFound => Self::new(StatusCode::GONE, e.kind(), e.to_string()),
            other => other.into(),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        let status = match &e {
            BrokerError::InstanceAlreadyExists | BrokerError::BindingAlreadyExists => StatusCode::CONFLICT,
            BrokerError::InstanceNotFound => StatusCode::NOT_FOUND,
            BrokerError::BindingNotFound => StatusCode::GONE,
            BrokerError::MissingApplicationReference | BrokerError::InvalidParameters(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BrokerError::ProvisionerFailure(_) | BrokerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BrokerError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        };
        let error = match &e {
            BrokerError::MissingApplicationReference => "RequiresApp",
            other => other.kind(),
        };
        let description = match &e {
            // provisioner text goes back to the platform unchanged
            BrokerError::ProvisionerFailure(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self::new(status, error, description)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.error, description = %self.description, "broker request failed");
        } else {
            warn!(status = %self.status, error = %self.error, description = %self.description, "broker request rejected");
        }
        let body = serde_json::json!({"error": self.error, "description": self.description});
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("runtime check failed: {0}")]
    Runtime(String),
    #[error("provisioner client: {0}")]
    Provisioner(#[from] service::errors::ProvisionerError),
}
