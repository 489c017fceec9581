//! Runner that replays queued responses and records what it was asked to run.
//! Used by tests and for dry runs that only need the assembled commands.

use crate::exec::runner::{CommandOutput, CommandRunner, ExecError, Invocation};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<(String, String, i32)>>,
    seen: Mutex<Vec<Invocation>>,
    /// Answer every command with exit code 0 once the queue is empty.
    succeed_when_empty: bool,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that never fails: every command exits 0 with empty output.
    pub fn dry_run() -> Self {
        Self {
            succeed_when_empty: true,
            ..Default::default()
        }
    }

    pub fn push_ok(&self, stdout: impl Into<String>) -> &Self {
        self.push(stdout.into(), String::new(), 0)
    }

    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) -> &Self {
        self.push(String::new(), stderr.into(), code)
    }

    fn push(&self, stdout: String, stderr: String, code: i32) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((stdout, stderr, code));
        self
    }

    /// Invocations received so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Arguments of the `n`th invocation (program excluded).
    pub fn args_of(&self, n: usize) -> Vec<String> {
        self.invocations()
            .get(n)
            .map(|i| i.args.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let (stdout, stderr, code) = match next {
            Some(r) => r,
            None if self.succeed_when_empty => (String::new(), String::new(), 0),
            None => return Err(ExecError::Exhausted(invocation.command_line())),
        };
        Ok(CommandOutput {
            stdout,
            stderr,
            code: Some(code),
            cmd: invocation.command_line(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let runner = ScriptedRunner::new();
        runner.push_ok("first").push_failure(1, "second");
        let inv = Invocation::new("x").arg("a");
        let a = runner.run(&inv).await.unwrap();
        let b = runner.run(&inv).await.unwrap();
        assert_eq!(a.stdout, "first");
        assert!(a.success());
        assert_eq!(b.stderr, "second");
        assert_eq!(b.code, Some(1));
        assert!(matches!(
            runner.run(&inv).await,
            Err(ExecError::Exhausted(_))
        ));
        assert_eq!(runner.invocations().len(), 3);
        assert_eq!(runner.args_of(0), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        let runner = ScriptedRunner::dry_run();
        let out = runner.run(&Invocation::new("x")).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.is_empty());
    }
}
