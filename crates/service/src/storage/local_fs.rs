use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use super::StateFs;

/// `StateFs` backed by `tokio::fs`.
///
/// Writes replace the file in place; there is no rename step, so a crash
/// mid-write can leave a truncated file which the next restore rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl StateFs for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, data).await
    }
}
