//! In-memory command runner.
//!
//! [`RecordingRunner`] never spawns processes. It records every command it is
//! asked to run and answers according to rules keyed on a substring of the
//! rendered command line. The harness uses it for `--dry-run` and the test
//! suites use it as a fake for provisioners, installers and phases.

use crate::command::{CommandOutcome, CommandSpec};
use crate::exec::{CommandRunner, RunnerError, RunnerResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Hook = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Exit(i32),
    Sleep(Duration),
    Missing,
    Hook(Hook),
}

#[derive(Clone)]
struct Rule {
    pattern: String,
    behavior: Behavior,
}

#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    rules: Vec<Rule>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` for commands whose command line contains `pattern`
    pub fn fail_when(mut self, pattern: impl Into<String>, code: i32) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            behavior: Behavior::Exit(code),
        });
        self
    }

    /// Take `duration` (in tokio time) before succeeding
    pub fn sleep_when(mut self, pattern: impl Into<String>, duration: Duration) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            behavior: Behavior::Sleep(duration),
        });
        self
    }

    /// Report the program as not installed
    pub fn missing_when(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            behavior: Behavior::Missing,
        });
        self
    }

    /// Run `hook` and succeed; used to simulate a tool's side effects on disk
    pub fn on_run<F>(mut self, pattern: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            pattern: pattern.into(),
            behavior: Behavior::Hook(Arc::new(hook)),
        });
        self
    }

    /// Commands received so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines received so far, in order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Index of the first recorded command line containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.command_lines()
            .iter()
            .position(|line| line.contains(pattern))
    }

    fn behavior_for(&self, spec: &CommandSpec) -> Option<Behavior> {
        let line = spec.command_line();
        self.rules
            .iter()
            .find(|rule| line.contains(&rule.pattern))
            .map(|rule| rule.behavior.clone())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> RunnerResult<CommandOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }

        match self.behavior_for(spec) {
            None => Ok(CommandOutcome::exited(0, Duration::ZERO)),
            Some(Behavior::Exit(code)) => Ok(CommandOutcome::exited(code, Duration::ZERO)),
            Some(Behavior::Sleep(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(CommandOutcome::exited(0, duration))
            }
            Some(Behavior::Missing) => Err(RunnerError::NotFound {
                program: spec.program.clone(),
            }),
            Some(Behavior::Hook(hook)) => {
                hook(spec);
                Ok(CommandOutcome::exited(0, Duration::ZERO))
            }
        }
    }

    fn runner_name(&self) -> &'static str {
        "recording"
    }
}
