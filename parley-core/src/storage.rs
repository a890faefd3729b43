//! Record storage for NPC contexts.
//!
//! A [`RecordStore`] maps an NPC id onto one serialized [`NpcContext`]. The
//! context store uses two of them: a writable memory tier for saved sessions
//! and a read-only profile tier for hand-authored NPC seeds.
//!
//! Two implementations ship with the crate:
//! - [`JsonDirStore`]: one pretty-printed `<id>.json` per NPC under a directory.
//! - [`InMemoryStore`]: raw JSON text in a map, for tests and ephemeral runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::context::NpcContext;
use crate::error::{ParleyError, Result};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Keyed storage of serialized NPC contexts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the record stored under `key`.
    ///
    /// Returns `Ok(None)` when no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed,
    /// or if `key` is not acceptable to the backend.
    async fn load(&self, key: &str) -> Result<Option<NpcContext>>;

    /// Store `ctx` under `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    async fn save(&self, key: &str, ctx: &NpcContext) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JsonDirStore
// ---------------------------------------------------------------------------

/// One JSON file per NPC under a single directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Store rooted at `root`. The directory is not created here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::InvalidKey`] if `key` could escape the root
    /// directory or is otherwise unusable as a file name.
    pub fn record_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);
    if bad {
        return Err(ParleyError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for JsonDirStore {
    async fn load(&self, key: &str) -> Result<Option<NpcContext>> {
        let path = self.record_path(key)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ctx = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded NPC record");
        Ok(Some(ctx))
    }

    async fn save(&self, key: &str, ctx: &NpcContext) -> Result<()> {
        let path = self.record_path(key)?;
        let body = serde_json::to_string_pretty(ctx)?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), "Saved NPC record");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// Records held as raw JSON text in a map.
///
/// Keeping the text rather than the parsed value means malformed records can
/// be planted with [`insert_raw`](Self::insert_raw) and are only rejected on
/// load, the same way a corrupt file would be.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under `key` without validation.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.records.write().insert(key.into(), raw.into());
    }

    /// Raw text stored under `key`, if any.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.records.read().get(key).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<NpcContext>> {
        let Some(raw) = self.get_raw(key) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, key: &str, ctx: &NpcContext) -> Result<()> {
        let body = serde_json::to_string(ctx)?;
        self.insert_raw(key, body);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
