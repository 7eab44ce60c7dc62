//! Memory curation
//!
//! At a checkpoint the external agent reviews the conversation (either by
//! resuming its own session or by reading a transcript) and proposes memories.
//! The reply goes through the envelope and response parsers and comes back as
//! a validated `CurationResult`.

pub mod backend;
pub mod literal;
pub mod parser;
pub mod prompt;
pub mod transcript;
pub mod types;

pub use backend::{AgentBackend, AgentRequest, CliAgent, CURATOR_ACTIVE_ENV};
pub use parser::{CliEnvelope, ResponseParser};
pub use types::{CandidateMemory, CurationResult, CurationTrigger, SnapshotFields};

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the agent should curate from
#[derive(Debug, Clone, PartialEq)]
pub enum CurationSource {
    /// Resume the agent's own session
    Session {
        handle: String,
        cwd: Option<PathBuf>,
    },
    /// Read a JSONL transcript and hand it to a fresh agent query
    Transcript(PathBuf),
}

impl CurationSource {
    /// Value recorded in `curator_version` on every memory from this source
    pub fn version_label(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Transcript(_) => "transcript",
        }
    }
}

/// Drives the external agent through a curation pass
pub struct Curator {
    backend: Arc<dyn AgentBackend>,
    parser: ResponseParser,
}

impl Curator {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Result<Self> {
        Ok(Self {
            backend,
            parser: ResponseParser::new()?,
        })
    }

    pub fn backend(&self) -> Arc<dyn AgentBackend> {
        Arc::clone(&self.backend)
    }

    /// Run a curation pass, reporting why it failed
    pub async fn try_curate(
        &self,
        source: &CurationSource,
        trigger: CurationTrigger,
        cancel: CancellationToken,
    ) -> Result<CurationResult> {
        let request = match source {
            CurationSource::Session { handle, cwd } => AgentRequest {
                system_prompt: prompt::session_system_prompt(trigger),
                user_message: prompt::session_user_message(trigger),
                session_handle: Some(handle.clone()),
                cwd: cwd.clone(),
            },
            CurationSource::Transcript(path) => {
                let turns = transcript::read_transcript(path).await?;
                if turns.is_empty() {
                    return Err(Error::InvalidCandidate(format!(
                        "transcript {} has no conversation",
                        path.display()
                    )));
                }
                let conversation = transcript::format_conversation(&turns);
                AgentRequest {
                    system_prompt: prompt::transcript_system_prompt(),
                    user_message: prompt::transcript_user_message(&conversation, trigger),
                    session_handle: None,
                    cwd: path.parent().map(PathBuf::from),
                }
            }
        };

        let reply = self.backend.invoke(request, cancel).await?;
        let result = self.parser.parse_curation(&reply)?;

        tracing::info!(
            backend = self.backend.name(),
            source = source.version_label(),
            %trigger,
            memories = result.memories.len(),
            "Curation complete"
        );
        Ok(result)
    }

    /// Run a curation pass; any failure yields the empty result
    pub async fn curate(
        &self,
        source: &CurationSource,
        trigger: CurationTrigger,
        cancel: CancellationToken,
    ) -> CurationResult {
        match self.try_curate(source, trigger, cancel).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, %trigger, "Curation failed");
                CurationResult::empty()
            }
        }
    }
}
