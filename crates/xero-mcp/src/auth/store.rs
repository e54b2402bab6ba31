//! Token persistence.
//!
//! The file store writes to a temporary file in the same directory and renames it over
//! the target, so readers never observe a half-written record. It assumes a single
//! server process owns the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::token::TokenRecord;
use crate::error::{AuthError, AuthResult};

/// Storage for the current [`TokenRecord`].
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Load the stored record. Unreadable or corrupt content is reported as absent.
    async fn load(&self) -> Option<TokenRecord>;

    /// Replace the stored record.
    async fn save(&self, record: &TokenRecord) -> AuthResult<()>;

    /// Remove the stored record. Removing a missing record is not an error.
    async fn delete(&self) -> AuthResult<()>;
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSON file store with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = self.path.file_name().and_then(|n| n.to_str()).unwrap_or("tokens");
        let tmp = format!(".{name}.{}.{n}.tmp", std::process::id());
        self.path.with_file_name(tmp)
    }

    async fn write_temp(tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Option<TokenRecord> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No token file");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read token file");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Token file is corrupt, treating as absent"
                );
                None
            }
        }
    }

    async fn save(&self, record: &TokenRecord) -> AuthResult<()> {
        let contents = serde_json::to_vec_pretty(record).map_err(AuthError::storage)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.temp_path();
        if let Err(e) = Self::write_temp(&tmp, &contents).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AuthError::storage(format!("cannot write {}: {e}", tmp.display())));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AuthError::storage(format!(
                "cannot replace {}: {e}",
                self.path.display()
            )));
        }

        tracing::debug!(path = %self.path.display(), expires_at = %record.expires_at, "Saved tokens");
        Ok(())
    }

    async fn delete(&self) -> AuthResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Deleted stored tokens");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!(
                "cannot delete {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: RwLock<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(record: TokenRecord) -> Self {
        Self { record: RwLock::new(Some(record)) }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    async fn save(&self, record: &TokenRecord) -> AuthResult<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn delete(&self) -> AuthResult<()> {
        *self.record.write().await = None;
        Ok(())
    }
}
