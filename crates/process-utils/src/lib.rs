//! Child-process helpers shared by the subprocess-backed collaborators
//! (capture backend, stream resolver, chat capture).

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
pub use self::async_process::*;

#[cfg(feature = "tokio")]
mod async_process {
    use std::ffi::OsStr;
    use std::process::{Output, Stdio};
    use std::time::Duration;

    use tokio::process::{Child, Command};
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, error, warn};

    use super::NoWindowExt;

    impl NoWindowExt for Command {
        fn no_window(&mut self) {
            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                self.as_std_mut().creation_flags(super::CREATE_NO_WINDOW);
            }
        }
    }

    /// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
    pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.no_window();
        cmd
    }

    /// Command for long-running supervised children: stdin closed, killed
    /// when the `Child` handle is dropped.
    pub fn supervised_command(program: impl AsRef<OsStr>) -> Command {
        let mut cmd = tokio_command(program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run a command to completion and collect its output, killing it if it
    /// does not finish within `timeout`.
    pub async fn output_with_timeout(
        mut cmd: Command,
        timeout: Duration,
    ) -> std::io::Result<Output> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("process did not finish within {}s", timeout.as_secs()),
            )),
        }
    }

    /// Watch `child` on a background task and report its exit code.
    ///
    /// The receiver yields `None` when `kill` fired or the child died from a
    /// signal, `Some(-1)` when waiting itself failed.
    pub fn spawn_process_waiter(
        mut child: Child,
        kill: CancellationToken,
        label: impl Into<String>,
    ) -> oneshot::Receiver<Option<i32>> {
        let (exit_tx, exit_rx) = oneshot::channel();
        let label = label.into();

        tokio::spawn(async move {
            let exit = tokio::select! {
                _ = kill.cancelled() => {
                    debug!(process = %label, "Terminating process on request");
                    if let Err(e) = child.kill().await {
                        warn!(process = %label, "Failed to kill process: {}", e);
                    }
                    None
                }
                waited = child.wait() => match waited {
                    Ok(status) if status.success() => {
                        debug!(process = %label, "Process exited cleanly");
                        status.code()
                    }
                    Ok(status) => {
                        warn!(process = %label, %status, "Process exited abnormally");
                        status.code()
                    }
                    Err(e) => {
                        error!(process = %label, "Error waiting for process: {}", e);
                        Some(-1)
                    }
                },
            };
            let _ = exit_tx.send(exit);
        });

        exit_rx
    }

    #[cfg(all(test, unix))]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_waiter_reports_exit_code() {
            let child = tokio_command("sh")
                .args(["-c", "exit 3"])
                .spawn()
                .unwrap();
            let rx = spawn_process_waiter(child, CancellationToken::new(), "sh");
            assert_eq!(rx.await.unwrap(), Some(3));
        }

        #[tokio::test]
        async fn test_waiter_kills_on_cancel() {
            let child = supervised_command("sleep").arg("30").spawn().unwrap();
            let token = CancellationToken::new();
            let rx = spawn_process_waiter(child, token.clone(), "sleep");
            token.cancel();
            assert_eq!(rx.await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_output_with_timeout_times_out() {
            let mut cmd = tokio_command("sleep");
            cmd.arg("30");
            let err = output_with_timeout(cmd, Duration::from_millis(50))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        }

        #[tokio::test]
        async fn test_output_with_timeout_collects_stdout() {
            let mut cmd = tokio_command("sh");
            cmd.args(["-c", "echo hello"]);
            let output = output_with_timeout(cmd, Duration::from_secs(5))
                .await
                .unwrap();
            assert!(output.status.success());
            assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
        }
    }
}
