//! Blocking subprocess helper with a wall-clock deadline, for the two
//! external tools spec §5 calls out by name: "Forensic mount and PST
//! extraction have explicit timeouts (60-300s) after which the file is
//! reported failed." Extractors already run inside
//! `tokio::task::spawn_blocking` (see `orchestrator::process_one_piece`), so
//! this polls `Child::try_wait` on that blocking thread rather than reaching
//! back into the async runtime for a `tokio::time::timeout`.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("'{0}' unavailable: {1}")]
    Spawn(String, std::io::Error),
    #[error("'{0}' exceeded its {1:?} timeout and was killed")]
    TimedOut(String, Duration),
    #[error("waiting on '{0}': {1}")]
    Wait(String, std::io::Error),
}

/// Runs `command` to completion, killing it and returning `TimedOut` if it
/// hasn't exited within `timeout`. Captures stdout/stderr the way
/// `Command::output()` does, but drains both pipes on background threads so
/// a chatty child can't deadlock the poll loop by filling a pipe buffer.
pub fn run_with_timeout(mut command: Command, tool: &str, timeout: Duration) -> Result<Output, SubprocessError> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child: Child = command.spawn().map_err(|e| SubprocessError::Spawn(tool.to_string(), e))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status: ExitStatus = loop {
        if let Some(status) = child.try_wait().map_err(|e| SubprocessError::Wait(tool.to_string(), e))? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(SubprocessError::TimedOut(tool.to_string(), timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output { status, stdout, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_surfaces_as_spawn_error() {
        let command = Command::new("definitely-not-a-real-binary");
        let result = run_with_timeout(command, "definitely-not-a-real-binary", Duration::from_secs(5));
        assert!(matches!(result, Err(SubprocessError::Spawn(_, _))));
    }

    #[test]
    fn hung_process_is_killed_on_deadline() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let result = run_with_timeout(command, "sleep", Duration::from_millis(200));
        assert!(matches!(result, Err(SubprocessError::TimedOut(_, _))));
    }

    #[test]
    fn fast_process_completes_normally() {
        let command = Command::new("true");
        let result = run_with_timeout(command, "true", Duration::from_secs(5)).unwrap();
        assert!(result.status.success());
    }
}
