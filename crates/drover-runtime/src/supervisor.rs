// Process Supervisor
// Runs one external command attached to a pseudo-terminal, streams output to
// the task log sink, and resolves exactly once with a terminal outcome.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use drover_types::TaskErrorKind;

use crate::classifier::{classify_output, ClassifiedError};
use crate::log_sink::LogSink;

/// One supervised invocation: command, working directory, extra environment,
/// and the hard deadline measured from spawn.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub deadline: Duration,
}

/// Terminal resolution of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit status zero and nothing classified in the transcript
    Ok,
    /// Non-zero exit status, nothing classified
    ExitError { code: i32 },
    /// The classifier matched the transcript; wins over the exit status
    ClassifiedError { kind: TaskErrorKind, message: String },
    /// Deadline elapsed before exit; the process group was killed
    Timeout,
}

// The accumulator only feeds the classifier, which needs a trailing window,
// not the whole transcript. The full transcript lives in the log sink.
const ACCUMULATOR_MAX_BYTES: usize = 256 * 1024;
const ACCUMULATOR_TRIM_TO: usize = 128 * 1024;

const READ_BUF_BYTES: usize = 8192;
const PTY_ROWS: u16 = 40;
const PTY_COLS: u16 = 120;

/// Spawn `spec` on a fresh PTY and drive it to resolution.
///
/// Every output chunk is appended to `sink` before the classifier sees it,
/// so the classifier never observes output that is not already externally
/// visible. The first classification is retained (and logged immediately)
/// but the handle resolves only at exit or deadline.
pub async fn supervise(spec: ProcessSpec, sink: &LogSink) -> anyhow::Result<ProcessOutcome> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(PtySize {
        rows: PTY_ROWS,
        cols: PTY_COLS,
        pixel_width: 0,
        pixel_height: 0,
    })?;

    let mut cmd = CommandBuilder::new(&spec.program);
    for arg in &spec.args {
        cmd.arg(arg);
    }
    cmd.cwd(&spec.cwd);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let mut child = pair.slave.spawn_command(cmd)?;
    drop(pair.slave);

    let mut reader = pair.master.try_clone_reader()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    std::thread::spawn(move || {
        let mut buf = [0u8; READ_BUF_BYTES];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let deadline = Instant::now() + spec.deadline;
    let mut accumulated = String::new();
    let mut detected: Option<ClassifiedError> = None;

    loop {
        let chunk = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => {
                tracing::warn!(
                    program = %spec.program,
                    deadline_secs = spec.deadline.as_secs(),
                    "process deadline elapsed, killing process group"
                );
                kill_process_group(child.process_id());
                let _ = child.kill();
                // Reap off the runtime so the kernel entry is released.
                tokio::task::spawn_blocking(move || {
                    let _ = child.wait();
                });
                return Ok(ProcessOutcome::Timeout);
            }
            Ok(None) => break,
            Ok(Some(chunk)) => chunk,
        };

        sink.append(&chunk).await?;
        accumulated.push_str(&String::from_utf8_lossy(&chunk));
        trim_accumulator(&mut accumulated);

        if detected.is_none() {
            if let Some(hit) = classify_output(&accumulated) {
                tracing::warn!(
                    kind = ?hit.kind,
                    message = %hit.message,
                    "failure pattern detected in process output"
                );
                detected = Some(hit);
            }
        }
    }

    // EOF on the PTY. The exit status may still take time to land, so the
    // deadline keeps applying to the wait itself.
    let pid = child.process_id();
    let wait_handle = tokio::task::spawn_blocking(move || child.wait());
    let status = match tokio::time::timeout_at(deadline, wait_handle).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(program = %spec.program, "process closed its terminal but did not exit before the deadline");
            kill_process_group(pid);
            return Ok(ProcessOutcome::Timeout);
        }
    };

    // One final pass over the transcript catches patterns that arrived in
    // the last chunks before exit.
    if detected.is_none() {
        detected = classify_output(&accumulated);
    }

    if let Some(hit) = detected {
        return Ok(ProcessOutcome::ClassifiedError {
            kind: hit.kind,
            message: hit.message,
        });
    }

    if status.success() {
        Ok(ProcessOutcome::Ok)
    } else {
        Ok(ProcessOutcome::ExitError {
            code: status.exit_code() as i32,
        })
    }
}

fn trim_accumulator(accumulated: &mut String) {
    if accumulated.len() > ACCUMULATOR_MAX_BYTES {
        // Stay on a char boundary; lossy conversion upstream guarantees one
        // exists within a few bytes.
        let mut cut = accumulated.len().saturating_sub(ACCUMULATOR_TRIM_TO);
        while cut < accumulated.len() && !accumulated.is_char_boundary(cut) {
            cut += 1;
        }
        let tail = accumulated.split_off(cut);
        *accumulated = tail;
    }
}

/// Kill the whole process group so agent-spawned children do not outlive the
/// deadline. The PTY child is the session leader of its own group.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::log_sink::LogSink;

    fn sh_spec(script: &str, cwd: &std::path::Path, deadline: Duration) -> ProcessSpec {
        ProcessSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
            deadline,
        }
    }

    async fn run(script: &str, deadline: Duration) -> (ProcessOutcome, String) {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::open(dir.path().join("task.log")).await.unwrap();
        let outcome = supervise(sh_spec(script, dir.path(), deadline), &sink)
            .await
            .unwrap();
        let transcript = sink.read_to_string().await.unwrap();
        (outcome, transcript)
    }

    #[tokio::test]
    async fn zero_exit_resolves_ok_and_streams_output() {
        let (outcome, transcript) = run("echo supervised hello", Duration::from_secs(10)).await;
        assert_eq!(outcome, ProcessOutcome::Ok);
        assert!(transcript.contains("supervised hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_resolves_exit_error() {
        let (outcome, _) = run("exit 7", Duration::from_secs(10)).await;
        assert_eq!(outcome, ProcessOutcome::ExitError { code: 7 });
    }

    #[tokio::test]
    async fn classified_output_overrides_zero_exit() {
        let (outcome, _) = run(
            "echo 'error: session expired'; exit 0",
            Duration::from_secs(10),
        )
        .await;
        match outcome {
            ProcessOutcome::ClassifiedError { kind, .. } => {
                assert_eq!(kind, TaskErrorKind::AuthExpired);
            }
            other => panic!("expected classified error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn classified_output_overrides_nonzero_exit() {
        let (outcome, _) = run("echo 'rate limit exceeded'; exit 3", Duration::from_secs(10)).await;
        match outcome {
            ProcessOutcome::ClassifiedError { kind, .. } => {
                assert_eq!(kind, TaskErrorKind::CapacityReached);
            }
            other => panic!("expected classified error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deadline_kills_process_and_stops_appending() {
        let (outcome, transcript) =
            run("echo before; sleep 30; echo after", Duration::from_secs(1)).await;
        assert_eq!(outcome, ProcessOutcome::Timeout);
        assert!(transcript.contains("before"));
        assert!(!transcript.contains("after"));
    }

    #[test]
    fn accumulator_trim_keeps_trailing_window() {
        let mut text = "x".repeat(ACCUMULATOR_MAX_BYTES + 100);
        text.push_str("sentinel");
        trim_accumulator(&mut text);
        assert!(text.len() <= ACCUMULATOR_TRIM_TO + "sentinel".len());
        assert!(text.ends_with("sentinel"));
    }
}
