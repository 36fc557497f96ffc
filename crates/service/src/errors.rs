use thiserror::Error;

/// Failure reported by the volume provisioner, carried verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ProvisionerError(pub String);

impl ProvisionerError {
    pub fn new(msg: impl Into<String>) -> Self { Self(msg.into()) }
}

/// Errors returned by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("instance already exists")]
    InstanceAlreadyExists,
    #[error("instance does not exist")]
    InstanceNotFound,
    #[error("binding already exists")]
    BindingAlreadyExists,
    #[error("binding does not exist")]
    BindingNotFound,
    #[error("app_guid is required for binding")]
    MissingApplicationReference,
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("provisioner failure: {0}")]
    ProvisionerFailure(String),
    /// Only ever logged; a failed state flush never fails the triggering request.
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("{0} is not supported by this broker")]
    Unsupported(&'static str),
}

impl BrokerError {
    /// Stable name for logs, metrics labels and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::InstanceAlreadyExists => "InstanceAlreadyExists",
            BrokerError::InstanceNotFound => "InstanceNotFound",
            BrokerError::BindingAlreadyExists => "BindingAlreadyExists",
            BrokerError::BindingNotFound => "BindingNotFound",
            BrokerError::MissingApplicationReference => "MissingApplicationReference",
            BrokerError::InvalidParameters(_) => "InvalidParameters",
            BrokerError::ProvisionerFailure(_) => "ProvisionerFailure",
            BrokerError::Persistence(_) => "PersistenceFailure",
            BrokerError::Unsupported(_) => "Unsupported",
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self { Self::InvalidParameters(msg.into()) }
}

impl From<ProvisionerError> for BrokerError {
    fn from(e: ProvisionerError) -> Self { BrokerError::ProvisionerFailure(e.0) }
}
