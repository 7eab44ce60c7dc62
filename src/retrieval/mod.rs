//! Memory retrieval
//!
//! - `text`: tokenizing and keyword families
//! - `scoring`: the multi-factor score and relevance gate
//! - `strategy`: Stage 2 ranking (`SmartVector`, `Agent`, `Hybrid`)
//! - `engine`: two-stage selection with per-session dedup
//! - `format`: the injected text block

pub mod engine;
pub mod format;
pub mod scoring;
pub mod strategy;
pub mod text;

pub use engine::RetrievalEngine;
pub use format::format_context;
pub use scoring::{Query, ScoreBreakdown, ScoredMemory, ScoringEngine};
pub use strategy::{
    build_strategy, AgentStrategy, HybridStrategy, RetrievalStrategy, SelectedMemory,
    SelectionTier, SmartVectorStrategy,
};
