pub mod command;
pub mod config;
pub mod exec;
pub mod recording;
pub mod system;

pub use command::{CommandOutcome, CommandSpec};
pub use config::RunnerConfig;
pub use exec::{
    run_checked, CommandRunner, RunnerError, RunnerResult, NOT_FOUND_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};
pub use recording::RecordingRunner;
pub use system::SystemRunner;

pub mod prelude {
    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::exec::*;
    pub use crate::recording::*;
    pub use crate::system::*;
}
