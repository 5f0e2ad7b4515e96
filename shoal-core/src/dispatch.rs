use crate::error::{Result, ShoalError};
use crate::store::writer::ArchiveWriter;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::process::{ChildStdin, ChildStdout, Command, Stdio};

/// Largest single write to a child's stdin. Writes of at most PIPE_BUF bytes
/// are atomic, and bounding each batch keeps the stdout drain interleaved
/// with the feed.
const WRITE_BATCH: usize = nix::libc::PIPE_BUF;

/// Run `program` once with `payload` on its stdin. With a writer present the
/// child's stdout is captured and inserted under `name` as exactly one new
/// record; without one the child's stdout is re-pointed at this process's
/// stderr, keeping stdout free for the control protocol.
///
/// Returns the child's exit code (-1 if killed by a signal). A non-zero code
/// is not an error here; callers report it on the status stream.
pub fn apply_record(
    payload: &[u8],
    name: &str,
    program: &str,
    args: &[String],
    out: Option<&mut ArchiveWriter>,
) -> Result<i32> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::piped());
    if out.is_some() {
        cmd.stdout(Stdio::piped());
    } else {
        cmd.stdout(stderr_stdio()?);
    }

    let mut child = cmd.spawn().map_err(|source| ShoalError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("child stdin not piped"))?;
    let stdout = if out.is_some() {
        Some(
            child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("child stdout not piped"))?,
        )
    } else {
        None
    };

    let streamed = stream_record(payload, stdin, stdout);
    // Reap the child before surfacing any stream error; the pipes are closed
    // by now, so it cannot hang on us.
    let status = child.wait()?;
    let captured = streamed?;
    let exit_code = status.code().unwrap_or(-1);

    if let Some(writer) = out {
        writer.insert(name, &captured)?;
    }
    Ok(exit_code)
}

/// The two-way pipe dance. The child's stdout (when captured) is switched to
/// non-blocking for the duration of the write phase: after every batched
/// write we pull whatever output is already available, so the child never
/// stalls on a full stdout pipe while we stall on its full stdin pipe. Once
/// all input is written, stdin is dropped to signal end-of-input and the
/// remaining output is drained blocking.
fn stream_record(
    payload: &[u8],
    mut stdin: ChildStdin,
    mut stdout: Option<ChildStdout>,
) -> io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut buf = [0u8; WRITE_BATCH];

    if let Some(out) = stdout.as_ref() {
        set_nonblocking(out, true)?;
    }

    let mut written = 0;
    while written < payload.len() {
        let batch_end = usize::min(written + WRITE_BATCH, payload.len());
        match stdin.write(&payload[written..batch_end]) {
            Ok(n) => written += n,
            // The child closed its read end; stop feeding, keep its output.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        if let Some(out) = stdout.as_mut() {
            match out.read(&mut buf) {
                Ok(n) => captured.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
    drop(stdin); // end-of-input

    if let Some(mut out) = stdout {
        set_nonblocking(&out, false)?;
        out.read_to_end(&mut captured)?;
    }
    Ok(captured)
}

fn set_nonblocking<F: AsRawFd>(f: &F, on: bool) -> io::Result<()> {
    let fd = f.as_raw_fd();
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(io_from_nix)?;
    let mut flags = OFlag::from_bits_retain(bits);
    flags.set(OFlag::O_NONBLOCK, on);
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io_from_nix)?;
    Ok(())
}

fn stderr_stdio() -> io::Result<Stdio> {
    let fd = io::stderr().as_fd().try_clone_to_owned()?;
    Ok(Stdio::from(fd))
}

fn io_from_nix(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
