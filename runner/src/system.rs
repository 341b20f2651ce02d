use crate::command::{CommandOutcome, CommandSpec};
use crate::config::RunnerConfig;
use crate::exec::{CommandRunner, RunnerError, RunnerResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Runs commands as real child processes
///
/// Children are spawned with `kill_on_drop`, so abandoning a run (for example
/// when [`crate::run_checked`] hits its time limit) terminates the process.
#[derive(Default)]
pub struct SystemRunner {
    config: RunnerConfig,
}

impl SystemRunner {
    pub fn new(config: RunnerConfig) -> RunnerResult<Self> {
        config
            .validate()
            .map_err(|message| RunnerError::InvalidConfig { message })?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn build(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&self.config.base_env)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = spec.current_dir.as_ref().or(self.config.working_dir.as_ref()) {
            cmd.current_dir(dir);
        }

        if self.config.inherit_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<CommandOutcome> {
        let started = Instant::now();
        let mut child = self.build(spec).spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RunnerError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                RunnerError::Spawn {
                    command: spec.command_line(),
                    source: e,
                }
            }
        })?;

        let status = child.wait().await?;

        Ok(CommandOutcome {
            code: status.code(),
            elapsed: started.elapsed(),
        })
    }

    fn runner_name(&self) -> &'static str {
        "system"
    }
}
