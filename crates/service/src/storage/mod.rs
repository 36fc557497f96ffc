//! Persistence medium for the broker state file.
//!
//! The broker only needs whole-file reads and writes, so the medium is a
//! two-method trait. `LocalFs` talks to the real file system, `MemoryFs`
//! keeps files in a map for tests and embedding.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub mod local_fs;
pub mod memory_fs;

pub use local_fs::LocalFs;
pub use memory_fs::MemoryFs;

/// Whole-file read/write access used to load and flush broker state.
#[async_trait]
pub trait StateFs: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// `<data_dir>/<service_name>-services.json`
pub fn state_file_path(data_dir: impl AsRef<Path>, service_name: &str) -> PathBuf {
    data_dir.as_ref().join(format!("{service_name}-services.json"))
}
