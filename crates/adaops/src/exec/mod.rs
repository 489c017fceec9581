//! Command execution: invocations, outputs, and the runner seam.

mod process;
mod runner;
mod scripted;

pub use process::{resolve_binary, ProcessRunner};
pub use runner::{CommandOutput, CommandRunner, ExecError, Invocation};
pub use scripted::ScriptedRunner;
