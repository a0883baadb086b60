//! Storage backend abstraction for the tabular substrate.
//!
//! The engine is defined as a data-transformation contract over any store
//! capable of equality lookups and sorted scans per entity. This module
//! pins down that contract in object-store terms:
//! - Conditional writes with preconditions (CAS)
//! - Object metadata including an opaque version token
//! - Prefix listing with caller-side ordering
//!
//! The version token is an opaque `String` so backends can map it to
//! whatever their substrate provides (generation number, etag, content
//! hash).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes (CAS operations).
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// Write succeeded, returns the new version token.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed, returns the current version token.
    PreconditionFailed {
        /// The version that caused the precondition to fail.
        current_version: String,
    },
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque version token for CAS operations.
    pub version: String,
    /// Last modification timestamp, when the backend knows it.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait.
///
/// All backends (memory, local filesystem) implement this contract.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` when the precondition is
    /// not met — that's a normal result, never an error.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object. Succeeds even if the object doesn't exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// Ordering is backend-defined; callers requiring determinism sort the
    /// results themselves.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Uses numeric versions internally (stored as
/// strings).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = objects.get(path);

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(obj) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: obj.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match current {
                    Some(obj) if obj.version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: obj.version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            WritePrecondition::None => {}
        }

        let new_version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                version: obj.version.to_string(),
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|obj| ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            version: obj.version.to_string(),
            last_modified: Some(obj.last_modified),
        }))
    }
}

// ============================================================================
// Local filesystem backend
// ============================================================================

/// Local filesystem backend rooted at a directory.
///
/// Version tokens are content hashes, so CAS detects concurrent mutation
/// within a single process. Suitable for the CLI and development; not a
/// multi-process coordination substrate.
#[derive(Debug)]
pub struct LocalFsBackend {
    root: PathBuf,
    // Serializes read-check-write sequences inside put().
    write_gate: tokio::sync::Mutex<()>,
}

impl LocalFsBackend {
    /// Creates a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::storage_with_source(format!("create root {}", root.display()), e))?;
        Ok(Self {
            root,
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(Error::InvalidInput(format!(
                "storage path must be relative and may not traverse upward: {path}"
            )));
        }
        Ok(self.root.join(rel))
    }

    fn content_version(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    async fn read_if_exists(full: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(full).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(
                format!("read {}", full.display()),
                e,
            )),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        Self::read_if_exists(&full)
            .await?
            .map(Bytes::from)
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let full = self.resolve(path)?;
        let _gate = self.write_gate.lock().await;

        let current = Self::read_if_exists(&full).await?;

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(existing) = &current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: Self::content_version(existing),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => match &current {
                Some(existing) if Self::content_version(existing) != expected => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: Self::content_version(existing),
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: "0".to_string(),
                    });
                }
                _ => {}
            },
            WritePrecondition::None => {}
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage_with_source(format!("create dir {}", parent.display()), e)
            })?;
        }

        // Write-then-rename so readers never observe a partial object.
        let tmp = full.with_extension(format!("tmp-{}", ulid::Ulid::new()));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| Error::storage_with_source(format!("write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &full)
            .await
            .map_err(|e| Error::storage_with_source(format!("rename to {}", full.display()), e))?;

        Ok(WriteResult::Success {
            version: Self::content_version(&data),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_with_source(
                format!("delete {}", full.display()),
                e,
            )),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // Walk from the deepest directory named by the prefix.
        let dir_part = prefix.rfind('/').map_or("", |idx| &prefix[..idx]);
        let start = self.resolve(dir_part)?;
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                Error::storage_with_source(format!("list {}", dir.display()), e)
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                Error::storage_with_source(format!("list {}", dir.display()), e)
            })? {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    stack.push(entry_path);
                    continue;
                }
                let rel = entry_path
                    .strip_prefix(&self.root)
                    .map_err(|_| Error::internal("walked outside storage root"))?
                    .to_string_lossy()
                    .replace('\\', "/");
                if !rel.starts_with(prefix) {
                    continue;
                }
                if let Some(meta) = self.head(&rel).await? {
                    out.push(meta);
                }
            }
        }
        Ok(out)
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let full = self.resolve(path)?;
        let Some(data) = Self::read_if_exists(&full).await? else {
            return Ok(None);
        };

        let last_modified = tokio::fs::metadata(&full)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(Some(ObjectMeta {
            path: path.to_string(),
            size: data.len() as u64,
            version: Self::content_version(&data),
            last_modified,
        }))
    }
}
