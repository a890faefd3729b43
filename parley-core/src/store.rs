//! The context store: one shared [`NpcContext`] per NPC id.
//!
//! ## Resolution tiers
//!
//! On the first reference to an id the store consults, in order:
//!
//! 1. the in-memory cache,
//! 2. the memory tier (a previously saved session),
//! 3. the profile tier (hand-authored NPC data, never written),
//! 4. the caller's seed data,
//! 5. an empty skeleton.
//!
//! The first tier that yields a context wins and the result is cached. A tier
//! whose record is unreadable is logged and skipped.
//!
//! ## Locking
//!
//! Each context sits behind its own `parking_lot::Mutex`. Callers hold it for
//! short synchronous sections only and never across an `.await`. There is no
//! per-NPC request serialisation: two dialogues with the same NPC can
//! interleave and the later save wins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{FeaturesConfig, PathsConfig};
use crate::context::NpcContext;
use crate::storage::{JsonDirStore, RecordStore};
use crate::types::NpcSeed;

/// A cached context shared between every request touching the same NPC.
pub type SharedContext = Arc<Mutex<NpcContext>>;

/// Owner of all live NPC contexts and the tiers they are loaded from.
pub struct ContextStore {
    cache: RwLock<HashMap<String, SharedContext>>,
    memories: Arc<dyn RecordStore>,
    profiles: Arc<dyn RecordStore>,
    persistence_enabled: bool,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("cached", &self.cache.read().len())
            .field("persistence_enabled", &self.persistence_enabled)
            .finish_non_exhaustive()
    }
}

impl ContextStore {
    /// Store over explicit memory and profile tiers, with persistence on.
    #[must_use]
    pub fn new(memories: Arc<dyn RecordStore>, profiles: Arc<dyn RecordStore>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            memories,
            profiles,
            persistence_enabled: true,
        }
    }

    /// Store backed by the configured JSON directories.
    #[must_use]
    pub fn from_config(paths: &PathsConfig, features: &FeaturesConfig) -> Self {
        Self::new(
            Arc::new(JsonDirStore::new(&paths.memories)),
            Arc::new(JsonDirStore::new(&paths.npc_profiles)),
        )
        .with_persistence(features.memory_persistence)
    }

    /// Enable or disable writes to the memory tier.
    #[must_use]
    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persistence_enabled = enabled;
        self
    }

    /// Whether [`persist`](Self::persist) writes anything.
    #[must_use]
    pub fn persistence_enabled(&self) -> bool {
        self.persistence_enabled
    }

    /// Number of contexts currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether no context has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// The cached context for `npc_id`, without consulting any other tier.
    #[must_use]
    pub fn cached(&self, npc_id: &str) -> Option<SharedContext> {
        self.cache.read().get(npc_id).cloned()
    }

    /// Return the context for `npc_id`, creating and caching it on first use.
    ///
    /// Never fails: storage problems degrade to the next tier.
    pub async fn resolve(&self, npc_id: &str, seed: Option<&NpcSeed>) -> SharedContext {
        if let Some(ctx) = self.cached(npc_id) {
            return ctx;
        }

        let ctx = self.load_uncached(npc_id, seed).await;

        // Another request may have resolved the same id while we were loading.
        let mut cache = self.cache.write();
        Arc::clone(
            cache
                .entry(npc_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ctx))),
        )
    }

    async fn load_uncached(&self, npc_id: &str, seed: Option<&NpcSeed>) -> NpcContext {
        if let Some(ctx) = load_tier(self.memories.as_ref(), "memory", npc_id).await {
            info!(npc = %npc_id, "Restored NPC context from saved memory");
            return ctx;
        }
        if let Some(ctx) = load_tier(self.profiles.as_ref(), "profile", npc_id).await {
            info!(npc = %npc_id, "Loaded NPC context from profile");
            return ctx;
        }
        if let Some(seed) = seed {
            debug!(npc = %npc_id, "Created NPC context from request data");
            return NpcContext::from_seed(npc_id, seed);
        }
        debug!(npc = %npc_id, "Created empty NPC context");
        NpcContext::skeleton(npc_id)
    }

    /// Write `ctx` to the memory tier under its id.
    ///
    /// Returns `false` when persistence is disabled or the write failed; a
    /// failed write is logged and otherwise ignored.
    pub async fn persist(&self, ctx: &NpcContext) -> bool {
        if !self.persistence_enabled {
            return false;
        }
        match self.memories.save(&ctx.id, ctx).await {
            Ok(()) => {
                debug!(npc = %ctx.id, "Persisted NPC context");
                true
            }
            Err(e) => {
                warn!(npc = %ctx.id, error = %e, "Failed to persist NPC context");
                false
            }
        }
    }
}

async fn load_tier(store: &dyn RecordStore, tier: &str, npc_id: &str) -> Option<NpcContext> {
    match store.load(npc_id).await {
        Ok(Some(mut ctx)) => {
            if ctx.id != npc_id {
                warn!(
                    npc = %npc_id,
                    stored_id = %ctx.id,
                    tier,
                    "Stored record id differs from its key; using the key"
                );
                ctx.id = npc_id.to_string();
            }
            Some(ctx)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(npc = %npc_id, tier, error = %e, "Ignoring unreadable NPC record");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
