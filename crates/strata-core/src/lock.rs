//! Per-table writer lock.
//!
//! At most one writer may hold a table's merge lock at a time. The lock is
//! a storage object acquired with CAS:
//! - acquisition writes a lock file with the holder's ID and expiry time
//!   under a `DoesNotExist` precondition, so only one writer can succeed;
//! - an expired lock can be taken over, bound to the version observed at
//!   the expiry check so a racing takeover loses the CAS;
//! - release writes an expired record rather than deleting, so a release
//!   can never clobber a newer holder's lock.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::storage::{StorageBackend, WritePrecondition, WriteResult};

/// Default lock TTL (30 seconds).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Default maximum retry attempts for lock acquisition.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Base backoff duration for retries.
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Maximum backoff duration.
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Lock file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Unique lock holder ID.
    pub holder_id: String,

    /// When the lock expires.
    pub expires_at: DateTime<Utc>,

    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,

    /// Optional description of the operation holding the lock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LockInfo {
    /// Creates lock info for the given holder and TTL.
    #[must_use]
    pub fn new(holder_id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id: holder_id.into(),
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30)),
            acquired_at: now,
            operation: None,
        }
    }

    /// Returns whether this lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// A writer lock for one merge target, backed by storage CAS.
pub struct TableLock<S: StorageBackend + ?Sized> {
    storage: Arc<S>,
    lock_path: String,
    holder_id: String,
}

impl<S: StorageBackend + ?Sized> Clone for TableLock<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            lock_path: self.lock_path.clone(),
            holder_id: self.holder_id.clone(),
        }
    }
}

impl<S: StorageBackend + ?Sized> TableLock<S> {
    /// Creates a lock handle. Each handle gets a unique holder ID.
    #[must_use]
    pub fn new(storage: Arc<S>, lock_path: impl Into<String>) -> Self {
        Self {
            storage,
            lock_path: lock_path.into(),
            holder_id: Ulid::new().to_string(),
        }
    }

    /// Returns the holder ID for this lock handle.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Attempts to acquire the lock with the given TTL.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionFailed` if the lock is still held after
    /// all retries.
    pub async fn acquire(&self, ttl: Duration, max_retries: u32) -> Result<LockGuard<S>> {
        self.acquire_with_operation(ttl, max_retries, None).await
    }

    /// Attempts to acquire the lock, recording an operation description.
    ///
    /// # Errors
    ///
    /// Returns `Error::PreconditionFailed` if the lock is still held after
    /// all retries.
    pub async fn acquire_with_operation(
        &self,
        ttl: Duration,
        max_retries: u32,
        operation: Option<String>,
    ) -> Result<LockGuard<S>> {
        let mut attempts = 0;
        let mut backoff = BACKOFF_BASE;

        loop {
            match self.try_acquire(ttl, operation.clone()).await {
                Ok(guard) => return Ok(guard),
                Err(LockError::AlreadyHeld(holder)) => {
                    attempts += 1;
                    if attempts >= max_retries {
                        return Err(Error::PreconditionFailed {
                            message: format!("lock held by {holder} after {max_retries} retries"),
                        });
                    }

                    let jitter = Duration::from_millis(rand_jitter());
                    tokio::time::sleep(backoff.min(BACKOFF_MAX) + jitter).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(LockError::Storage(e)) => return Err(e),
            }
        }
    }

    async fn try_acquire(
        &self,
        ttl: Duration,
        operation: Option<String>,
    ) -> std::result::Result<LockGuard<S>, LockError> {
        let mut lock_info = LockInfo::new(&self.holder_id, ttl);
        lock_info.operation.clone_from(&operation);
        let lock_bytes = encode(&lock_info).map_err(LockError::Storage)?;

        match self
            .storage
            .put(&self.lock_path, lock_bytes, WritePrecondition::DoesNotExist)
            .await
            .map_err(LockError::Storage)?
        {
            WriteResult::Success { version } => {
                return Ok(LockGuard {
                    storage: Arc::clone(&self.storage),
                    lock_path: self.lock_path.clone(),
                    holder_id: self.holder_id.clone(),
                    version,
                    released: false,
                });
            }
            WriteResult::PreconditionFailed { .. } => {
                // Lock exists - check for takeover below.
            }
        }

        // Bind the expiry decision to the version observed here, so a
        // competing takeover makes our CAS fail instead of racing.
        let meta = self
            .storage
            .head(&self.lock_path)
            .await
            .map_err(LockError::Storage)?;
        let Some(meta) = meta else {
            return Err(LockError::AlreadyHeld("race".into()));
        };

        let existing = self.read_lock().await.map_err(LockError::Storage)?;

        match existing {
            Some(info) if info.is_expired() => {
                let mut new_info = LockInfo::new(&self.holder_id, ttl);
                new_info.operation = operation;
                let new_bytes = encode(&new_info).map_err(LockError::Storage)?;

                match self
                    .storage
                    .put(
                        &self.lock_path,
                        new_bytes,
                        WritePrecondition::MatchesVersion(meta.version),
                    )
                    .await
                    .map_err(LockError::Storage)?
                {
                    WriteResult::Success { version } => Ok(LockGuard {
                        storage: Arc::clone(&self.storage),
                        lock_path: self.lock_path.clone(),
                        holder_id: self.holder_id.clone(),
                        version,
                        released: false,
                    }),
                    WriteResult::PreconditionFailed { .. } => {
                        Err(LockError::AlreadyHeld("unknown".into()))
                    }
                }
            }
            Some(info) => Err(LockError::AlreadyHeld(info.holder_id)),
            None => Err(LockError::AlreadyHeld("race".into())),
        }
    }

    async fn read_lock(&self) -> Result<Option<LockInfo>> {
        match self.storage.get(&self.lock_path).await {
            Ok(data) => {
                let info: LockInfo = serde_json::from_slice(&data)
                    .map_err(|e| Error::internal(format!("parse lock: {e}")))?;
                Ok(Some(info))
            }
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Checks if the lock is currently held (regardless of holder).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state could not be read.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock()
            .await?
            .is_some_and(|info| !info.is_expired()))
    }

    /// Forcefully breaks an existing lock (operator recovery only).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock object could not be deleted.
    pub async fn force_break(&self) -> Result<()> {
        self.storage.delete(&self.lock_path).await
    }
}

fn encode(info: &LockInfo) -> Result<Bytes> {
    serde_json::to_vec(info)
        .map(Bytes::from)
        .map_err(|e| Error::internal(format!("serialize lock: {e}")))
}

/// RAII guard for a held lock.
///
/// Prefer calling [`LockGuard::release`] explicitly; the drop path is
/// best-effort and falls back to TTL expiry outside a runtime.
pub struct LockGuard<S: StorageBackend + ?Sized> {
    storage: Arc<S>,
    lock_path: String,
    holder_id: String,
    version: String,
    released: bool,
}

impl<S: StorageBackend + ?Sized> LockGuard<S> {
    /// Returns the holder ID for this lock.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Explicitly releases the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the release write fails.
    pub async fn release(mut self) -> Result<()> {
        self.do_release().await
    }

    /// Writes an expired lock record via CAS. If another holder took over
    /// in the meantime the CAS fails and their lock is left intact.
    async fn do_release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        if let Some(info) = self.read_lock().await? {
            if info.holder_id == self.holder_id {
                let expired = LockInfo {
                    holder_id: self.holder_id.clone(),
                    expires_at: Utc::now() - chrono::Duration::seconds(1),
                    acquired_at: info.acquired_at,
                    operation: None,
                };
                let _ = self
                    .storage
                    .put(
                        &self.lock_path,
                        encode(&expired)?,
                        WritePrecondition::MatchesVersion(self.version.clone()),
                    )
                    .await?;
            }
        }

        self.released = true;
        Ok(())
    }

    async fn read_lock(&self) -> Result<Option<LockInfo>> {
        match self.storage.get(&self.lock_path).await {
            Ok(data) => {
                let info: LockInfo = serde_json::from_slice(&data)
                    .map_err(|e| Error::internal(format!("parse lock: {e}")))?;
                Ok(Some(info))
            }
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<S: StorageBackend + ?Sized> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Best-effort async release; without a runtime, TTL handles cleanup.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let storage = Arc::clone(&self.storage);
        let path = self.lock_path.clone();
        let holder = self.holder_id.clone();
        let version = self.version.clone();

        handle.spawn(async move {
            if let Ok(data) = storage.get(&path).await {
                if let Ok(info) = serde_json::from_slice::<LockInfo>(&data) {
                    if info.holder_id == holder {
                        let expired = LockInfo {
                            holder_id: holder,
                            expires_at: Utc::now() - chrono::Duration::seconds(1),
                            acquired_at: info.acquired_at,
                            operation: None,
                        };
                        if let Ok(bytes) = serde_json::to_vec(&expired) {
                            let _ = storage
                                .put(
                                    &path,
                                    Bytes::from(bytes),
                                    WritePrecondition::MatchesVersion(version),
                                )
                                .await;
                        }
                    }
                }
            }
        });
    }
}

/// Internal lock acquisition errors.
enum LockError {
    AlreadyHeld(String),
    Storage(Error),
}

/// Generates random jitter for backoff (0-50ms) without a rand dependency.
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    let seed = u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    seed % 50
}
