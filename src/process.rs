//! Bounded execution of local engine binaries

use crate::error::OcrError;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured output of a finished engine process
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Output goes to temporary files rather than pipes so a chatty child cannot
/// block on a full pipe while we poll it.
pub fn run_with_timeout(
    program: &str,
    mut command: Command,
    timeout: Duration,
) -> Result<ProcessOutput, OcrError> {
    let mut stdout_file = tempfile::tempfile()
        .map_err(|e| OcrError::Internal(format!("Failed to create output file: {}", e)))?;
    let mut stderr_file = tempfile::tempfile()
        .map_err(|e| OcrError::Internal(format!("Failed to create output file: {}", e)))?;

    let stdout = stdout_file
        .try_clone()
        .map_err(|e| OcrError::Internal(format!("Failed to share output file: {}", e)))?;
    let stderr = stderr_file
        .try_clone()
        .map_err(|e| OcrError::Internal(format!("Failed to share output file: {}", e)))?;

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OcrError::EngineUnavailable(format!("'{}' not found", program))
            } else {
                OcrError::EngineInvocation(format!("Failed to start '{}': {}", program, e))
            }
        })?;

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    tracing::warn!("{} timed out after {:?}, killing", program, timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OcrError::Timeout(timeout));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(OcrError::EngineInvocation(format!(
                    "Failed to wait for '{}': {}",
                    program, e
                )));
            }
        }
    };

    let stdout = read_back(&mut stdout_file)?;
    let stderr = read_back(&mut stderr_file)?;

    if !status.success() {
        return Err(OcrError::EngineInvocation(format!(
            "'{}' exited with {}: {}",
            program,
            status,
            stderr.trim()
        )));
    }

    Ok(ProcessOutput { stdout, stderr })
}

fn read_back(file: &mut std::fs::File) -> Result<String, OcrError> {
    let mut buffer = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut buffer))
        .map_err(|e| OcrError::Internal(format!("Failed to read process output: {}", e)))?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
