//! External program execution for device adapters
//!
//! Camera grab, text-to-speech and trigger wait are all external programs.
//! Each run:
//! - captures stdout (a JPEG frame for the camera)
//! - is killed when its future is dropped (Ctrl-C, timeout)
//! - is bounded by an optional timeout

use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no program configured")]
    EmptyCommand,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}ms", timeout.as_millis())]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Output of a successful run
#[derive(Debug)]
pub struct ProgramOutput {
    pub stdout: Vec<u8>,
    pub execution_time_ms: u128,
}

/// Run `argv` to completion. A non-zero exit is an error.
pub async fn run_program(argv: &[String], timeout: Option<Duration>) -> Result<ProgramOutput, ExecutionError> {
    let (program, args) = argv.split_first().ok_or(ExecutionError::EmptyCommand)?;
    let start_time = Instant::now();
    debug!(program = %program, ?args, ?timeout, "Running program");

    let child = AsyncCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            program: program.clone(),
            source,
        })?;

    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::TimedOut {
                program: program.clone(),
                timeout: limit,
            })?,
        None => child.wait_with_output().await,
    };
    let output = waited.map_err(|source| ExecutionError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ExecutionError::Failed {
            program: program.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(ProgramOutput {
        stdout: output.stdout,
        execution_time_ms: start_time.elapsed().as_millis(),
    })
}

/// Substitute `placeholder` in each argument; append `value` if no argument had it.
pub fn expand_args(template: &[String], placeholder: &str, value: &str, append_if_missing: bool) -> Vec<String> {
    let mut found = false;
    let mut argv: Vec<String> = template
        .iter()
        .map(|arg| {
            if arg.contains(placeholder) {
                found = true;
                arg.replace(placeholder, value)
            } else {
                arg.clone()
            }
        })
        .collect();

    if !found && append_if_missing && !argv.is_empty() {
        argv.push(value.to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_args() {
        let expanded = expand_args(&argv(&["espeak", "-s", "140", "{text}"]), "{text}", "I see Alice.", true);
        assert_eq!(expanded, argv(&["espeak", "-s", "140", "I see Alice."]));

        let appended = expand_args(&argv(&["say"]), "{text}", "hello", true);
        assert_eq!(appended, argv(&["say", "hello"]));

        let untouched = expand_args(&argv(&["grab", "-d", "/dev/video0"]), "{device}", "/dev/video2", false);
        assert_eq!(untouched, argv(&["grab", "-d", "/dev/video0"]));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let err = run_program(&[], None).await.unwrap_err();
        assert!(matches!(err, ExecutionError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_program(&argv(&["facelink-no-such-program"]), None).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_captured() {
        let output = run_program(&argv(&["echo", "frame"]), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"frame\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        let err = run_program(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        match err {
            ExecutionError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let err = run_program(&argv(&["sleep", "10"]), Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
    }
}
