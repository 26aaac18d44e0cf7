//! One file per key under a directory

use super::KeyValueStore;
use crate::error::{ClientError, ClientResult};

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the store directory
    pub async fn open(root: impl AsRef<Path>) -> ClientResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| ClientError::Storage(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    /// Keys contain `/` and account addresses; hex keeps file names flat and safe
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(format!("read {}: {}", key, e))),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> ClientResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        fs::write(&tmp, value)
            .await
            .map_err(|e| ClientError::Storage(format!("write {}: {}", key, e)))?;
        // Rename is atomic, so a reader sees the old or the new value, never a mix
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| ClientError::Storage(format!("commit {}: {}", key, e)))?;

        debug!("Saved {} ({} bytes)", key, value.len());
        Ok(())
    }
}
