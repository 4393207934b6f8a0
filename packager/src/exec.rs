//! External command execution.
//!
//! The shell archive backend and backend probing run the platform `zip`
//! utility. Both go through [`CommandExecutor`] so tests can substitute a
//! stub for the real process spawner.

use crate::error::{ReleaseError, Result};
use camino::Utf8Path;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the command cannot be spawned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use extension_release::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let output = SystemCommandExecutor.run("zip", &["-v"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), extension_release::error::ReleaseError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;

    /// Runs a command from within `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the command cannot be spawned.
    fn run_in(&self, dir: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        Command::new(cmd)
            .args(args)
            .output()
            .map_err(ReleaseError::io("run", Utf8Path::new(cmd)))
    }

    fn run_in(&self, dir: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output> {
        Command::new(cmd)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(ReleaseError::io("run", Utf8Path::new(cmd)))
    }
}

/// Returns `true` if `cmd args` can be spawned and exits successfully.
///
/// Spawn failures count as "not available" rather than errors.
#[must_use]
pub fn command_succeeds(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> bool {
    match executor.run(cmd, args) {
        Ok(output) => output.status.success(),
        Err(e) => {
            log::debug!("probe `{cmd}` unavailable: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
    use rstest::rstest;

    #[rstest]
    #[case::success(Ok(success_output()), true)]
    #[case::nonzero_exit(Ok(failure_output("zip error")), false)]
    #[case::spawn_failure(
        Err(ReleaseError::io("run", Utf8Path::new("zip"))(std::io::Error::from(
            std::io::ErrorKind::NotFound
        ))),
        false
    )]
    fn command_succeeds_reflects_outcome(#[case] result: Result<Output>, #[case] expected: bool) {
        let executor = StubExecutor::new(vec![ExpectedCall::new("zip", &["-v"], result)]);
        assert_eq!(command_succeeds(&executor, "zip", &["-v"]), expected);
        executor.assert_finished();
    }
}
