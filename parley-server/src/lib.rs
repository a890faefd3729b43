//! # parley-server: WebSocket Front-End for Parley
//!
//! Accepts game-client connections, decodes one JSON request per frame, and
//! answers each with exactly one JSON message.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 parley-server                │
//! │  ┌──────────┐   ┌────────────┐   ┌────────┐  │
//! │  │  server  │──►│ dispatcher │──►│ prompt │  │
//! │  └────┬─────┘   └─────┬──────┘   └────────┘  │
//! │       │               │                      │
//! │       ▼               ▼                      │
//! │  connections   ┌─────────────┐ ┌───────────┐ │
//! │                │ parley-core │ │parley-llm │ │
//! │                └─────────────┘ └───────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `protocol`: inbound request validation and outbound envelopes
//! - `dispatcher`: routing plus the dialogue and event flows
//! - `prompt`: dialogue prompt composition from context and game state
//! - `connections`: live connection registry with drop-guard cleanup
//! - `server`: axum WebSocket upgrade and per-connection loop
//! - `backends`: building generators, voice and the dispatcher from config

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backends;
pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod prompt;
pub mod protocol;
pub mod server;

pub use connections::{ConnectionGuard, ConnectionRegistry};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use prompt::DialoguePromptBuilder;
pub use protocol::{DialogueRequest, EventRequest, NpcRef, OutboundMessage};
pub use server::{AppState, router, serve};
