use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CheckError, Result};

const WAIT_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
}

/// Display name for a tool path, used in logs and error reasons.
pub fn tool_name(tool: &Path) -> String {
    tool.file_name()
        .unwrap_or(tool.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Run an external tool to completion, killing it if it outlives `timeout`.
///
/// `cwd` is handed to the child directly so the process working directory is
/// never touched.
pub fn run_tool<I, S>(tool: &Path, args: I, cwd: Option<&Path>, timeout: Duration) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = tool_name(tool);
    let mut command = Command::new(tool);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CheckError::ToolMissing { tool: name.clone() },
        _ => CheckError::Io(e),
    })?;

    // Drain pipes on their own threads so a chatty tool cannot fill the pipe and stall.
    let (tx, rx) = mpsc::channel();
    let mut readers = 0;
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(Stream::Stdout, pipe, tx.clone());
        readers += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(Stream::Stderr, pipe, tx.clone());
        readers += 1;
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let timed_out = || CheckError::ToolTimeout {
        tool: name.clone(),
        secs: timeout.as_secs(),
    };

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(timed_out());
        }
        thread::sleep(WAIT_POLL);
    };

    // A background helper may still hold the pipes open after the tool itself exits.
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, bytes)) => stdout = bytes,
            Ok((Stream::Stderr, bytes)) => stderr = bytes,
            Err(RecvTimeoutError::Timeout) => return Err(timed_out()),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(ToolOutput {
        success: status.success(),
        code: status
            .code()
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| status.to_string()),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(stream: Stream, mut pipe: R, tx: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}
