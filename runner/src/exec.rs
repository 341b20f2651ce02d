use crate::command::{CommandOutcome, CommandSpec};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Exit code reported for a command that exceeded its time limit, matching `timeout(1)`
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit code reported when the program could not be found, matching POSIX shells
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Program not found: {program}")]
    NotFound { program: String },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", describe_code(.code))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

impl RunnerError {
    /// Process exit status that surfaces this failure unchanged to the caller
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::NotFound { .. } => NOT_FOUND_EXIT_CODE,
            RunnerError::NonZeroExit { code, .. } => code.filter(|c| *c != 0).unwrap_or(1),
            RunnerError::Timeout { .. } => TIMEOUT_EXIT_CODE,
            RunnerError::Spawn { .. } | RunnerError::InvalidConfig { .. } | RunnerError::Io(_) => 1,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout { .. })
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Capability to execute external commands
///
/// Implementations only report how the process ended; deciding whether a
/// non-zero exit is a failure belongs to [`run_checked`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<CommandOutcome>;

    fn runner_name(&self) -> &'static str;
}

/// Run a command, failing on non-zero exit or when `limit` elapses first
///
/// Dropping the in-flight run on timeout is what stops the child process, so
/// runners must tie the child's lifetime to the returned future.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    limit: Option<Duration>,
) -> RunnerResult<CommandOutcome> {
    let command = spec.to_string();
    info!(runner = runner.runner_name(), "$ {}", command);

    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, runner.run(spec)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("`{}` exceeded its {}s limit", command, limit.as_secs());
                return Err(RunnerError::Timeout {
                    command,
                    timeout: limit,
                });
            }
        },
        None => runner.run(spec).await?,
    };

    debug!(
        code = ?outcome.code,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "finished `{}`",
        spec.command_line()
    );

    if !outcome.success() {
        return Err(RunnerError::NonZeroExit {
            command,
            code: outcome.code,
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = RunnerError::NonZeroExit {
            command: "pytest".to_string(),
            code: Some(5),
        };
        assert_eq!(err.exit_code(), 5);

        let err = RunnerError::NonZeroExit {
            command: "pytest".to_string(),
            code: None,
        };
        assert_eq!(err.exit_code(), 1);

        let err = RunnerError::Timeout {
            command: "pytest".to_string(),
            timeout: Duration::from_secs(120),
        };
        assert_eq!(err.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(err.is_timeout());

        let err = RunnerError::NotFound {
            program: "pdoc".to_string(),
        };
        assert_eq!(err.exit_code(), NOT_FOUND_EXIT_CODE);
    }

    #[test]
    fn test_error_display() {
        let err = RunnerError::NonZeroExit {
            command: "pip install .".to_string(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "`pip install .` exited with exit code 2");

        let err = RunnerError::Timeout {
            command: "pytest -vv".to_string(),
            timeout: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "`pytest -vv` timed out after 120s");
    }
}
