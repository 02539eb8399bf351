// Phase Runner
// Runs the two fixed phases for one task, each as one supervised agent
// process with phase-specific prompt construction and working directory.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use drover_runtime::{supervise, LogSink, ProcessOutcome, ProcessSpec};

use crate::config::{EngineConfig, REPO_DIR_NAME};
use crate::error::{DroverError, Result};
use crate::prompts::PhasePrompts;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Execution,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Execution => "execution",
        }
    }
}

/// Drives one task's phases against its workspace and log sink.
pub struct PhaseRunner<'a> {
    config: &'a EngineConfig,
    workspace: &'a Workspace,
    sink: &'a LogSink,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(config: &'a EngineConfig, workspace: &'a Workspace, sink: &'a LogSink) -> Self {
        Self {
            config,
            workspace,
            sink,
        }
    }

    /// Discovery: enumerate/select/clone, run from the workspace root so the
    /// clone lands at `repo/`. Execution never starts unless this returns
    /// `ProcessOutcome::Ok`.
    pub async fn run_discovery(&self, request: &str) -> Result<ProcessOutcome> {
        let prompt = PhasePrompts::discovery_prompt(request, REPO_DIR_NAME);
        let spec = self.agent_spec(
            &prompt,
            None,
            self.workspace.root().to_path_buf(),
            self.config.discovery_timeout,
        );
        self.supervise_phase(Phase::Discovery, spec).await
    }

    /// Execution: the user prompt unmodified plus the fixed operating-mode
    /// system prompt, run inside the repository Discovery produced. On
    /// success the execution portion of the log is scanned for the first
    /// canonical pull-request URL; absence is not an error.
    pub async fn run_execution(&self, user_prompt: &str) -> Result<(ProcessOutcome, Option<String>)> {
        if !self.workspace.repo_is_ready() {
            return Err(DroverError::Workspace(format!(
                "repository missing at {} after discovery",
                self.workspace.repo_dir().display()
            )));
        }

        let system_prompt = PhasePrompts::execution_system_prompt();
        let spec = self.agent_spec(
            user_prompt,
            Some(system_prompt.as_str()),
            self.workspace.repo_dir(),
            self.config.execution_timeout,
        );

        let offset = self.sink.offset().await.unwrap_or(0);
        let outcome = self.supervise_phase(Phase::Execution, spec).await?;

        let pr_url = if outcome == ProcessOutcome::Ok {
            let transcript = self.sink.read_since(offset).await?;
            extract_pr_url(&transcript)
        } else {
            None
        };

        Ok((outcome, pr_url))
    }

    fn agent_spec(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        cwd: PathBuf,
        deadline: Duration,
    ) -> ProcessSpec {
        let mut args = vec!["-p".to_string(), prompt.to_string()];
        if let Some(system_prompt) = system_prompt {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.to_string());
        }
        args.extend(
            [
                "--output-format",
                "stream-json",
                "--verbose",
                "--dangerously-skip-permissions",
            ]
            .map(String::from),
        );

        let mut env = Vec::new();
        if let Some(token) = &self.config.github_token {
            env.push(("GH_TOKEN".to_string(), token.clone()));
        }

        ProcessSpec {
            program: self.config.agent_bin.clone(),
            args,
            cwd,
            env,
            deadline,
        }
    }

    async fn supervise_phase(&self, phase: Phase, spec: ProcessSpec) -> Result<ProcessOutcome> {
        tracing::info!(
            phase = phase.label(),
            cwd = %spec.cwd.display(),
            deadline_secs = spec.deadline.as_secs(),
            "starting phase process"
        );
        let outcome = supervise(spec, self.sink)
            .await
            .map_err(|e| DroverError::Supervisor(format!("{} phase: {}", phase.label(), e)))?;
        tracing::info!(phase = phase.label(), outcome = ?outcome, "phase process resolved");
        Ok(outcome)
    }
}

/// First canonical GitHub pull-request URL in `transcript`, if any.
pub fn extract_pr_url(transcript: &str) -> Option<String> {
    pr_url_re()
        .find(transcript)
        .map(|m| m.as_str().to_string())
}

fn pr_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/pull/\d+")
            .expect("valid pull request url regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_canonical_pr_url() {
        let transcript = "opened https://github.com/acme/acme-api/pull/42 for review\n\
                          also mentioned https://github.com/acme/acme-api/pull/43";
        assert_eq!(
            extract_pr_url(transcript).as_deref(),
            Some("https://github.com/acme/acme-api/pull/42")
        );
    }

    #[test]
    fn ignores_non_pr_github_urls() {
        let transcript = "see https://github.com/acme/acme-api/issues/7 and \
                          https://github.com/acme/acme-api/tree/main";
        assert_eq!(extract_pr_url(transcript), None);
    }

    #[test]
    fn absence_of_url_is_none() {
        assert_eq!(extract_pr_url("no links here"), None);
    }

    #[test]
    fn url_with_trailing_punctuation_is_trimmed_to_the_number() {
        assert_eq!(
            extract_pr_url("done (https://github.com/a-b/c.d/pull/9).").as_deref(),
            Some("https://github.com/a-b/c.d/pull/9")
        );
    }
}
