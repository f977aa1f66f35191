// src/utils/command.rs

use std::{
    io::Read,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel;

use crate::errors::CommandError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external tools (`reg.exe`, `powercfg`, `sc.exe`, `ping`, PowerShell).
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// With `Some(timeout)` the process is killed once the timeout elapses and
    /// `CommandError::Timeout` is returned.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes with hidden windows and piped output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(source: Option<R>, stream: Stream, sender: channel::Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            if let Err(e) = source.read_to_end(&mut buffer) {
                tracing::debug!("Failed to read child output: {}", e);
            }
        }
        let text = String::from_utf8_lossy(&buffer).into_owned();
        // The receiver is gone if the command timed out.
        let _ = sender.send((stream, text));
    });
}

fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout: Duration,
) -> Result<ExitStatus, CommandError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                if let Err(e) = child.kill() {
                    tracing::warn!("{} -> Failed to kill timed out process: {}", program, e);
                }
                let _ = child.wait();
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(CommandError::Wait {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        tracing::debug!("Running '{}' with args {:?}", program, args);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::CREATE_NO_WINDOW;
            command.creation_flags(CREATE_NO_WINDOW.0);
        }

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let (sender, receiver) = channel::bounded(2);
        spawn_reader(child.stdout.take(), Stream::Stdout, sender.clone());
        spawn_reader(child.stderr.take(), Stream::Stderr, sender);

        let status = match timeout {
            Some(limit) => wait_with_deadline(&mut child, program, limit)?,
            None => child.wait().map_err(|source| CommandError::Wait {
                program: program.to_string(),
                source,
            })?,
        };

        let mut output = CommandOutput {
            exit_code: status.code(),
            ..Default::default()
        };
        // Both readers finish once the process has exited and closed its pipes.
        for (stream, text) in receiver.iter() {
            match stream {
                Stream::Stdout => output.stdout = text,
                Stream::Stderr => output.stderr = text,
            }
        }

        tracing::debug!("'{}' exited with {:?}", program, output.exit_code);
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let output = SystemCommandRunner
            .run("sh", &["-c", "echo hello; echo oops >&2; exit 3"], None)
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[test]
    fn test_kills_process_after_timeout() {
        let started = Instant::now();
        let result = SystemCommandRunner.run("sleep", &["5"], Some(Duration::from_millis(200)));
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let result = SystemCommandRunner.run("definitely-not-a-real-program-xyz", &[], None);
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
