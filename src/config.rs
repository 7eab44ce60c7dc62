//! Memoria configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Memoria configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoriaConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retrieval and ranking configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// External curation agent configuration
    #[serde(default)]
    pub curator: CuratorConfig,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Session primer configuration
    #[serde(default)]
    pub primer: PrimerConfig,
}

impl MemoriaConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the configuration: explicit path, then `~/.memoria/config.toml`,
    /// then defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (~/.memoria/config.toml)
    pub fn default_path() -> PathBuf {
        home_dir().join("config.toml")
    }

    /// Apply `MEMORIA_*` overrides through the given lookup function
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("MEMORIA_RETRIEVAL_MODE") {
            self.retrieval.mode = mode.parse()?;
        }
        if let Some(command) = lookup("MEMORIA_CURATOR_COMMAND") {
            self.curator.command = command;
        }
        if let Some(dir) = lookup("MEMORIA_STORAGE_DIR") {
            self.storage.base_dir = PathBuf::from(dir);
            self.storage.backend = StorageBackend::File;
        }
        Ok(())
    }

    /// Reject settings that would make the engine unusable
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.max_memories == 0 {
            return Err(Error::Config(
                "retrieval.max_memories must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.curator.command.trim().is_empty() {
            return Err(Error::Config("curator.command is empty".to_string()));
        }
        if self.session.ttl_secs == 0 {
            return Err(Error::Config("session.ttl_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Base directory for everything Memoria keeps on disk (~/.memoria)
pub fn home_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memoria")
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            cors_origins: Vec::new(),
        }
    }
}

/// Where memories are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process memory only, lost on restart
    Memory,
    /// JSON files under `base_dir`
    File,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            base_dir: home_dir().join("store"),
        }
    }
}

/// Which retrieval strategy ranks Stage 2 candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Multi-factor scoring with tiered selection
    SmartVector,
    /// Scoring, escalating complex queries to the external agent
    Hybrid,
    /// External agent picks among gated candidates
    Agent,
}

impl std::str::FromStr for RetrievalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "smart_vector" | "smart-vector" | "vector" => Ok(Self::SmartVector),
            "hybrid" => Ok(Self::Hybrid),
            "agent" | "claude" => Ok(Self::Agent),
            other => Err(Error::Config(format!("unknown retrieval mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SmartVector => write!(f, "smart_vector"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Whether the final selection is cut to the requested budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Exactly `max_memories` at most
    #[default]
    Strict,
    /// Up to twice `max_memories` when tiers B and C have material
    Rich,
}

impl std::str::FromStr for SelectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "rich" => Ok(Self::Rich),
            other => Err(Error::Config(format!("unknown selection mode '{}'", other))),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,

    /// Default memory budget per context request
    pub max_memories: usize,

    #[serde(default)]
    pub selection: SelectionMode,

    /// Maximum number of Stage 1 (must-include) memories
    pub obligatory_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::SmartVector,
            max_memories: 5,
            selection: SelectionMode::Strict,
            obligatory_cap: 3,
        }
    }
}

/// How the external CLI expects its system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliFlavor {
    /// Accepts a separate system prompt argument
    #[default]
    ClaudeCode,
    /// No system prompt flag; the prompt is folded into the user message
    GeminiCli,
}

/// External curation agent configuration
///
/// Argument templates may contain `{session_id}`, `{system_prompt}` and
/// `{user_message}` placeholders. Each template entry becomes exactly one
/// argv element, so no shell quoting is involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    /// Executable to run
    pub command: String,

    #[serde(default)]
    pub flavor: CliFlavor,

    /// Arguments used when resuming an existing agent session
    pub resume_args: Vec<String>,

    /// Arguments used for one-shot prompts (transcripts, agent retrieval)
    pub query_args: Vec<String>,

    /// Extra arguments appended to every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Extra environment variables for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Optional wall-clock limit; unset means wait for the agent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CuratorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            command: "one-claude".to_string(),
            flavor: CliFlavor::ClaudeCode,
            resume_args: [
                "-n",
                "--resume",
                "{session_id}",
                "--system-prompt",
                "{system_prompt}",
                "--format",
                "json",
                "{user_message}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            query_args: [
                "-n",
                "--system-prompt",
                "{system_prompt}",
                "--format",
                "json",
                "{user_message}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: None,
        }
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Deterministic offline feature hashing
    Hashing,
    /// Ollama `/api/embed` endpoint
    Ollama,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub dimension: usize,
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimension: 384,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session's state is evicted
    pub ttl_secs: u64,

    /// How often the background reaper scans for idle sessions
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 6 * 60 * 60,
            reap_interval_secs: 300,
        }
    }
}

/// Session primer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    /// Substrings that mark a memory as essential project context
    #[serde(default)]
    pub essential_markers: Vec<String>,

    /// Maximum essential memories surfaced in a primer
    pub max_essential: usize,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        Self {
            essential_markers: Vec::new(),
            max_essential: 3,
        }
    }
}
