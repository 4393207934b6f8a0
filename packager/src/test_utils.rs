//! Shared test utilities for the release crate.

use crate::error::Result;
use crate::exec::CommandExecutor;
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., `"zip"`).
    pub cmd: &'static str,
    /// Leading arguments the call must start with.
    pub args_prefix: Vec<&'static str>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd` invoked with arguments starting with `args_prefix`.
    #[must_use]
    pub fn new(cmd: &'static str, args_prefix: &[&'static str], result: Result<Output>) -> Self {
        Self {
            cmd,
            args_prefix: args_prefix.to_vec(),
            result,
        }
    }
}

/// A command invocation observed by [`StubExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Working directory, when the call used `run_in`.
    pub dir: Option<Utf8PathBuf>,
    /// The command.
    pub cmd: String,
    /// All arguments.
    pub args: Vec<String>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Returns predefined results in order and records every invocation so
/// tests can inspect arguments that are only known at run time, such as
/// temporary output paths.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    recorded: RefCell<Vec<RecordedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            recorded: RefCell::new(Vec::new()),
        }
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorded.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }

    #[expect(clippy::expect_used, reason = "test stub fails loudly on misuse")]
    fn respond(&self, dir: Option<&Utf8Path>, cmd: &str, args: &[&str]) -> Result<Output> {
        self.recorded.borrow_mut().push(RecordedCall {
            dir: dir.map(Utf8Path::to_path_buf),
            cmd: cmd.to_owned(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
        });

        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .expect("unexpected command invocation");

        assert_eq!(call.cmd, cmd);
        assert!(
            args.starts_with(&call.args_prefix),
            "arguments {args:?} do not start with {:?}",
            call.args_prefix
        );

        call.result
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        self.respond(None, cmd, args)
    }

    fn run_in(&self, dir: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output> {
        self.respond(Some(dir), cmd, args)
    }
}
