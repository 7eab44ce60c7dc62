//! External agent invocation
//!
//! Curation and agent-assisted retrieval both talk to an external agent CLI
//! through `AgentBackend`. `CliAgent` spawns the configured command with an
//! argv template, waits for it to exit and returns the unwrapped reply text.

use super::parser::CliEnvelope;
use crate::config::{CliFlavor, CuratorConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Environment marker set on every spawned agent, so hooks running inside
/// the agent can recognise a curation call and skip themselves.
pub const CURATOR_ACTIVE_ENV: &str = "MEMORY_CURATOR_ACTIVE";

const SESSION_ID: &str = "{session_id}";
const SYSTEM_PROMPT: &str = "{system_prompt}";
const USER_MESSAGE: &str = "{user_message}";

/// One request to the external agent
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub system_prompt: String,
    pub user_message: String,
    /// Agent session to resume; `None` runs a fresh one-shot query
    pub session_handle: Option<String>,
    pub cwd: Option<PathBuf>,
}

/// Something that can answer a prompt
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Run the request and return the agent's reply text
    async fn invoke(&self, request: AgentRequest, cancel: CancellationToken) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Agent backend that shells out to a CLI
#[derive(Debug, Clone)]
pub struct CliAgent {
    command: String,
    flavor: CliFlavor,
    resume_args: Vec<String>,
    query_args: Vec<String>,
    extra_args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl CliAgent {
    pub fn new(config: &CuratorConfig) -> Self {
        Self {
            command: config.command.clone(),
            flavor: config.flavor,
            resume_args: config.resume_args.clone(),
            query_args: config.query_args.clone(),
            extra_args: config.extra_args.clone(),
            env: config.env.clone(),
            timeout: config.timeout(),
        }
    }

    /// Expand the argv template for a request
    pub fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let template = match request.session_handle {
            Some(_) => &self.resume_args,
            None => &self.query_args,
        };
        let session_id = request.session_handle.as_deref().unwrap_or_default();

        let (system_prompt, user_message) = match self.flavor {
            CliFlavor::ClaudeCode => (request.system_prompt.clone(), request.user_message.clone()),
            CliFlavor::GeminiCli => (
                String::new(),
                format!("{}\n\n{}", request.system_prompt, request.user_message),
            ),
        };

        let mut args: Vec<String> = Vec::with_capacity(template.len() + self.extra_args.len());
        for arg in template {
            if arg.contains(SYSTEM_PROMPT) && self.flavor == CliFlavor::GeminiCli {
                // No system prompt flag: drop the placeholder and its flag
                if args.last().is_some_and(|prev| prev.starts_with('-')) {
                    args.pop();
                }
                continue;
            }
            args.push(
                arg.replace(SESSION_ID, session_id)
                    .replace(SYSTEM_PROMPT, &system_prompt)
                    .replace(USER_MESSAGE, &user_message),
            );
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn run(&self, request: &AgentRequest) -> Result<String> {
        let args = self.build_args(request);
        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .env(CURATOR_ACTIVE_ENV, "1")
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|e| {
            Error::AgentUnavailable(format!("failed to spawn '{}': {}", self.command, e))
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::AgentUnavailable(format!("'{}' failed: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::AgentUnavailable(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(CliEnvelope::parse(&stdout).into_text())
    }
}

#[async_trait]
impl AgentBackend for CliAgent {
    async fn invoke(&self, request: AgentRequest, cancel: CancellationToken) -> Result<String> {
        tracing::info!(
            command = %self.command,
            resume = request.session_handle.is_some(),
            "Invoking agent CLI"
        );

        let run = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.run(&request))
                    .await
                    .map_err(|_| {
                        Error::AgentUnavailable(format!(
                            "'{}' timed out after {}s",
                            self.command,
                            limit.as_secs_f32()
                        ))
                    })?,
                None => self.run(&request).await,
            }
        };

        tokio::select! {
            result = run => result,
            _ = cancel.cancelled() => {
                tracing::warn!(command = %self.command, "Agent invocation cancelled");
                Err(Error::Cancelled)
            }
        }
    }

    fn name(&self) -> &str {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(command: &str, query_args: &[&str]) -> CliAgent {
        let config = CuratorConfig {
            command: command.to_string(),
            query_args: query_args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        CliAgent::new(&config)
    }

    fn request(user: &str) -> AgentRequest {
        AgentRequest {
            system_prompt: "SYS".into(),
            user_message: user.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resume_template_expansion() {
        let cli = CliAgent::new(&CuratorConfig::default());
        let args = cli.build_args(&AgentRequest {
            session_handle: Some("abc".into()),
            ..request("go")
        });
        assert_eq!(
            args,
            vec!["-n", "--resume", "abc", "--system-prompt", "SYS", "--format", "json", "go"]
        );
    }

    #[test]
    fn test_query_template_without_handle() {
        let cli = CliAgent::new(&CuratorConfig::default());
        let args = cli.build_args(&request("go"));
        assert!(!args.contains(&"--resume".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("go"));
    }

    #[test]
    fn test_gemini_folds_system_prompt() {
        let config = CuratorConfig {
            flavor: CliFlavor::GeminiCli,
            extra_args: vec!["--yolo".into()],
            ..Default::default()
        };
        let args = CliAgent::new(&config).build_args(&request("go"));
        assert!(!args.contains(&"--system-prompt".to_string()));
        assert!(args.contains(&"SYS\n\ngo".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--yolo"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_unwraps_envelope() {
        let cli = agent("sh", &["-c", "printf '%s' \"$0\"", "{user_message}"]);
        let reply = cli
            .invoke(request(r#"{"result": "curated"}"#), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "curated");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_sets_marker_env() {
        let cli = agent("sh", &["-c", "printf '%s' \"$MEMORY_CURATOR_ACTIVE\""]);
        let reply = cli.invoke(request(""), CancellationToken::new()).await.unwrap();
        assert_eq!(reply, "1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_unavailable() {
        let cli = agent("sh", &["-c", "echo boom >&2; exit 3"]);
        let err = cli.invoke(request(""), CancellationToken::new()).await.unwrap_err();
        match err {
            Error::AgentUnavailable(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let cli = agent("/nonexistent/agent-cli", &[]);
        let err = cli.invoke(request(""), CancellationToken::new()).await;
        assert!(matches!(err, Err(Error::AgentUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation() {
        let cli = agent("sleep", &["5"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cli.invoke(request(""), cancel).await;
        assert!(matches!(err, Err(Error::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let mut cli = agent("sleep", &["5"]);
        cli.timeout = Some(Duration::from_millis(100));
        let err = cli.invoke(request(""), CancellationToken::new()).await;
        assert!(matches!(err, Err(Error::AgentUnavailable(msg)) if msg.contains("timed out")));
    }
}
