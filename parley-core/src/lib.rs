//! # Parley Core Library
//!
//! The dialogue session engine behind the Parley server:
//!
//! - [`NpcContext`]: per-NPC descriptive data with bounded conversation
//!   (10 turns) and event (20 entries) memory.
//! - [`ContextStore`]: one shared context per NPC, resolved through a cache,
//!   saved sessions, authored profiles, caller seed data, and finally an
//!   empty skeleton.
//! - [`RecordStore`]: the storage seam, with [`JsonDirStore`] and
//!   [`InMemoryStore`] implementations.
//! - [`ActionExtractor`]: strips embedded directives out of generated text.
//! - [`ParleyConfig`]: TOML + environment configuration.
//!
//! Nothing in this crate touches the network.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod config;
pub mod context;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

pub use actions::{Action, ActionExtractor, ActionFormat, Extraction, ParamValue};
pub use config::ParleyConfig;
pub use context::{ConversationEntry, EventEntry, NpcContext};
pub use error::{ParleyError, Result};
pub use storage::{InMemoryStore, JsonDirStore, RecordStore};
pub use store::{ContextStore, SharedContext};
pub use types::*;
