//! Service layer of the CSI volume broker.
//! - `broker` holds the state manager and its conflict/persistence rules.
//! - `provisioner` and `storage` are the seams to the volume driver and the file system.
//! - `domain` carries the request/response shapes shared with the HTTP layer.

pub mod errors;
pub mod domain;
pub mod broker;
pub mod provisioner;
pub mod storage;
pub mod metrics;
pub mod runtime;
#[cfg(test)]
pub mod test_support;
