//! Running external commands with a bounded execution time

use std::{
    io::Read,
    path::Path,
    process::{Child, Command, Stdio},
    sync::mpsc::{self, Receiver},
    thread,
    time::{Duration, Instant},
};

use crate::download::error::DownloadError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    /// Runs `program` to completion; exceeding `timeout` kills it and returns
    /// [`DownloadError::TimedOut`].
    fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput, DownloadError>;
}

/// Spawns real child processes with captured output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn command(program: &Path, args: &[&str]) -> Command {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command
    }

    /// Reads `pipe` to the end on its own thread; the text arrives on the receiver.
    fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = pipe {
                let _ = pipe.read_to_end(&mut buf);
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    }

    /// Output collected before `deadline`. A pipe still held open by a leftover
    /// grandchild yields what never arrived as empty.
    fn collect(output: &Receiver<String>, deadline: Instant) -> String {
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(POLL_INTERVAL);
        output.recv_timeout(remaining).unwrap_or_default()
    }

    fn wait_with_deadline(child: &mut Child, deadline: Instant) -> std::io::Result<Option<Option<i32>>> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status.code()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn terminate(child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput, DownloadError> {
        let mut child = Self::command(program, args).spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DownloadError::NotFound(program.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => DownloadError::PermissionDenied(program.to_path_buf()),
            _ => DownloadError::Spawn {
                program: program.to_path_buf(),
                source: e,
            },
        })?;

        // pipes are drained while waiting, a full pipe would stall the child
        let stdout = Self::drain(child.stdout.take());
        let stderr = Self::drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let code = match Self::wait_with_deadline(&mut child, deadline) {
            Ok(Some(code)) => code,
            Ok(None) => {
                Self::terminate(&mut child);
                return Err(DownloadError::TimedOut {
                    program: program.to_path_buf(),
                    timeout,
                });
            }
            Err(e) => {
                Self::terminate(&mut child);
                return Err(e.into());
            }
        };

        Ok(CommandOutput {
            code,
            stdout: Self::collect(&stdout, deadline),
            stderr: Self::collect(&stderr, deadline),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{path::Path, time::Duration};

    use super::*;

    #[test]
    fn captures_output_and_exit_code() -> anyhow::Result<()> {
        let out = ProcessRunner.run(
            Path::new("sh"),
            &["-c", "echo hello; echo oops >&2; exit 3"],
            Duration::from_secs(10),
        )?;

        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        Ok(())
    }

    #[test]
    fn slow_command_times_out() {
        let err = ProcessRunner
            .run(Path::new("sleep"), &["5"], Duration::from_millis(200))
            .unwrap_err();

        assert!(matches!(err, DownloadError::TimedOut { .. }));
    }

    #[test]
    fn missing_program_is_reported() {
        let err = ProcessRunner
            .run(
                Path::new("/definitely/not/a/real/binary"),
                &[],
                Duration::from_secs(1),
            )
            .unwrap_err();

        assert!(matches!(err, DownloadError::NotFound(_)));
    }

    #[test]
    fn leftover_grandchild_does_not_hold_the_runner_past_its_timeout() -> anyhow::Result<()> {
        let started = std::time::Instant::now();

        let out = ProcessRunner.run(
            Path::new("sh"),
            &["-c", "sleep 5 & exit 0"],
            Duration::from_millis(500),
        )?;

        assert!(out.success());
        assert!(started.elapsed() < Duration::from_secs(3));
        Ok(())
    }
}
