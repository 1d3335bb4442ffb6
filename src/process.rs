//! Child-process capture with a deadline.
//!
//! The negotiation handshake is a strictly synchronous request/response
//! exchange: write the request to the child's stdin, drain its stdout and
//! stderr on reader threads so neither pipe can deadlock, and wait for exit
//! under a deadline. A hung child is killed rather than hanging the host.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Captured output of a finished (or killed) child process.
#[derive(Debug)]
pub struct CapturedChild {
    /// Exit status. When `timed_out` is set this is the status after SIGKILL.
    pub status: ExitStatus,
    /// Everything the child wrote to stdout.
    pub stdout: Vec<u8>,
    /// Everything the child wrote to stderr.
    pub stderr: Vec<u8>,
    /// Whether the deadline expired and the child was killed.
    pub timed_out: bool,
}

/// Run a command to completion with piped stdio and a deadline.
///
/// `input` is written to the child's stdin, which is then closed. A child
/// that exits before reading its stdin is tolerated; its exit status tells
/// the caller what happened.
pub fn run_captured(mut cmd: Command, input: &[u8], timeout: Duration) -> Result<CapturedChild> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!(timeout_secs = timeout.as_secs(), "spawning child process");
    let mut child = cmd.spawn()?;

    write_and_close_stdin(&mut child, input)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::negotiation("capture stdout", "stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::negotiation("capture stderr", "stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || drain(stdout));
    let stderr_handle = thread::spawn(move || drain(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "child process deadline expired, killing"
            );
            timed_out = true;
            child.kill()?;
            child.wait()?
        }
    };

    let stdout = join_reader(stdout_handle)?;
    let stderr = join_reader(stderr_handle)?;

    tracing::debug!(exit_code = ?status.code(), timed_out, "child process finished");
    Ok(CapturedChild {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn write_and_close_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::negotiation("write request", "stdin was not piped"))?;
    match stdin.write_all(input) {
        Ok(()) => {}
        // Child exited before reading; its exit status carries the outcome.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e.into()),
    }
    // Dropping the handle closes the stream so the child sees EOF.
    Ok(())
}

fn drain(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::negotiation(
            "read child output",
            "reader thread panicked",
        )),
    }
}
