//! Helpers for running external tools: windowless spawning and
//! captured, time-bounded execution.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
pub use captured::{CapturedOutput, RunError, run_captured};

#[cfg(feature = "tokio")]
mod captured {
    use std::fmt;
    use std::process::{ExitStatus, Stdio};
    use std::time::{Duration, Instant};

    /// Exit status and captured streams of a finished child process.
    #[derive(Debug)]
    pub struct CapturedOutput {
        pub status: ExitStatus,
        pub stdout: Vec<u8>,
        pub stderr: Vec<u8>,
        pub elapsed: Duration,
    }

    impl CapturedOutput {
        pub fn success(&self) -> bool {
            self.status.success()
        }

        /// Exit code, `-1` when the process was terminated by a signal.
        pub fn code(&self) -> i32 {
            self.status.code().unwrap_or(-1)
        }

        pub fn stdout_lossy(&self) -> String {
            String::from_utf8_lossy(&self.stdout).into_owned()
        }

        pub fn stderr_lossy(&self) -> String {
            String::from_utf8_lossy(&self.stderr).into_owned()
        }
    }

    /// Why a child process produced no [`CapturedOutput`].
    #[derive(Debug)]
    pub enum RunError {
        /// The program could not be started (missing binary, permissions).
        Spawn(std::io::Error),
        /// Waiting on the running child failed.
        Wait(std::io::Error),
        /// The child exceeded the deadline and was killed.
        TimedOut(Duration),
    }

    impl fmt::Display for RunError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                RunError::Spawn(e) => write!(f, "failed to spawn process: {e}"),
                RunError::Wait(e) => write!(f, "failed to wait for process: {e}"),
                RunError::TimedOut(limit) => {
                    write!(f, "process timed out after {}s", limit.as_secs())
                }
            }
        }
    }

    impl std::error::Error for RunError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                RunError::Spawn(e) | RunError::Wait(e) => Some(e),
                RunError::TimedOut(_) => None,
            }
        }
    }

    /// Run `command` to completion, capturing stdout and stderr.
    ///
    /// The child is killed if it is still running when `timeout` elapses.
    /// A zero `timeout` waits indefinitely.
    pub async fn run_captured(
        command: &mut tokio::process::Command,
        timeout: Duration,
    ) -> Result<CapturedOutput, RunError> {
        let start = Instant::now();

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(RunError::Spawn)?;

        let output = if timeout.is_zero() {
            child.wait_with_output().await.map_err(RunError::Wait)?
        } else {
            // Dropping the future on timeout drops the child, which kills it.
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(RunError::Wait)?,
                Err(_) => return Err(RunError::TimedOut(timeout)),
            }
        };

        Ok(CapturedOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed: start.elapsed(),
        })
    }

    #[cfg(all(test, unix))]
    mod tests {
        use super::*;
        use crate::tokio_command;

        #[tokio::test]
        async fn captures_stdout_of_successful_command() {
            let mut cmd = tokio_command("sh");
            cmd.args(["-c", "printf hello"]);

            let output = run_captured(&mut cmd, Duration::from_secs(10)).await.unwrap();
            assert!(output.success());
            assert_eq!(output.stdout_lossy(), "hello");
        }

        #[tokio::test]
        async fn reports_non_zero_exit_code() {
            let mut cmd = tokio_command("sh");
            cmd.args(["-c", "echo broken >&2; exit 3"]);

            let output = run_captured(&mut cmd, Duration::from_secs(10)).await.unwrap();
            assert!(!output.success());
            assert_eq!(output.code(), 3);
            assert!(output.stderr_lossy().contains("broken"));
        }

        #[tokio::test]
        async fn missing_binary_is_a_spawn_error() {
            let mut cmd = tokio_command("definitely-not-a-real-binary-xyz");
            let err = run_captured(&mut cmd, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::Spawn(_)));
        }

        #[tokio::test]
        async fn slow_command_times_out() {
            let mut cmd = tokio_command("sh");
            cmd.args(["-c", "sleep 5"]);

            let err = run_captured(&mut cmd, Duration::from_millis(100))
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::TimedOut(_)));
        }
    }
}
