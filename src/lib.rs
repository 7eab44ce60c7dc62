//! Memoria - curated conversational memory for coding agents
//!
//! Memoria gives a coding agent continuity across sessions. At checkpoints an
//! external agent CLI reviews the conversation and curates memories; before
//! each new message Memoria scores the stored memories against it and injects
//! the few worth showing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     HTTP API (axum)                          │
//! │   /memory/context   /memory/process   /memory/checkpoint     │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────────────┐
//! │                  SessionCoordinator                          │
//! │  SessionStore (per-session state, TTL)   Primer              │
//! └──────┬───────────────────────────────────────────┬───────────┘
//!        │ get_context                               │ checkpoint
//! ┌──────▼──────────────────────┐   ┌────────────────▼───────────┐
//! │      RetrievalEngine        │   │         Curator            │
//! │  Stage 1: obligatory        │   │  AgentBackend (CLI)        │
//! │  Stage 2: RetrievalStrategy │   │  envelope + response parse │
//! │  ScoringEngine + gate       │   │  transcript reader         │
//! └──────┬──────────────────────┘   └────────────────┬───────────┘
//!        └──────────────┬────────────────────────────┘
//!               ┌───────▼────────┐
//!               │  MemoryStore   │  Embedder
//!               │ (memory/file)  │  (hashing/ollama)
//!               └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`memory`]: records, embeddings and storage
//! - [`retrieval`]: scoring, strategies and selection
//! - [`curator`]: external agent invocation and response parsing
//! - [`session`]: session state, primer, coordinator and HTTP handlers
//! - [`api`]: the assembled HTTP application
//! - [`config`]: configuration management

pub mod api;
pub mod config;
pub mod curator;
pub mod error;
pub mod memory;
pub mod retrieval;
pub mod session;

pub use config::MemoriaConfig;
pub use error::{Error, Result};
