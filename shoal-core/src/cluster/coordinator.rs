use crate::cluster::protocol::{self, Assignment, Report};
use crate::error::{Result, ShoalError};
use std::io::BufReader;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, warn};

/// One completed chunk as reported back by a worker rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub rank: usize,
    pub start: usize,
    pub end: usize,
    pub status: i32,
}

/// Drive the distributed run from the coordinator rank. Spawns one worker
/// subprocess per rank `1..=world` via `make_worker` and serves each from its
/// own thread; all threads claim chunks off a shared cursor, so faster ranks
/// pick up more chunks. The coordinator itself processes no records.
///
/// Ranks that die mid-protocol are logged and abandoned (their unfinished
/// chunk is not retried); the run fails only if every rank fails.
pub fn run<F>(world: usize, total: usize, chunk: usize, make_worker: F) -> Result<Vec<Completion>>
where
    F: Fn(usize) -> Command + Sync,
{
    let cursor = AtomicUsize::new(0);
    let chunk = chunk.max(1);

    let results: Vec<(usize, Result<Vec<Completion>>)> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=world)
            .map(|rank| {
                let cursor = &cursor;
                let make_worker = &make_worker;
                let handle =
                    scope.spawn(move || serve_rank(rank, total, chunk, cursor, make_worker(rank)));
                (rank, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(rank, h)| match h.join() {
                Ok(r) => (rank, r),
                Err(_) => (
                    rank,
                    Err(ShoalError::Protocol("worker service thread panicked".into())),
                ),
            })
            .collect()
    });

    let mut completions = Vec::new();
    let mut last_err = None;
    let mut failed = 0;
    for (rank, result) in results {
        match result {
            Ok(mut c) => completions.append(&mut c),
            Err(e) => {
                warn!(rank, error = %e, "worker rank failed");
                failed += 1;
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) if failed == world => Err(e),
        _ => Ok(completions),
    }
}

fn serve_rank(
    rank: usize,
    total: usize,
    chunk: usize,
    cursor: &AtomicUsize,
    mut cmd: Command,
) -> Result<Vec<Completion>> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    let mut child = cmd.spawn().map_err(|source| ShoalError::Spawn {
        program: "worker".to_string(),
        source,
    })?;

    let result = drive(rank, total, chunk, cursor, &mut child);
    if result.is_err() {
        let _ = child.kill();
    }
    let status = child.wait()?;
    if !status.success() {
        warn!(rank, code = status.code().unwrap_or(-1), "worker exited non-zero");
    }
    result
}

fn drive(
    rank: usize,
    total: usize,
    chunk: usize,
    cursor: &AtomicUsize,
    child: &mut Child,
) -> Result<Vec<Completion>> {
    let mut input = BufReader::new(
        child
            .stdout
            .take()
            .ok_or_else(|| ShoalError::Protocol(format!("rank {rank}: stdout not piped")))?,
    );
    let mut output = child
        .stdin
        .take()
        .ok_or_else(|| ShoalError::Protocol(format!("rank {rank}: stdin not piped")))?;

    match protocol::recv::<Report, _>(&mut input)? {
        Some(Report::Ready) => {}
        other => {
            return Err(ShoalError::Protocol(format!(
                "rank {rank}: expected ready, got {other:?}"
            )));
        }
    }

    let mut completions = Vec::new();
    loop {
        let start = cursor.fetch_add(chunk, Ordering::SeqCst);
        if start >= total {
            protocol::send(&mut output, &Assignment::Shutdown)?;
            break;
        }
        let end = usize::min(start + chunk, total);
        debug!(rank, start, end, "assigning chunk");
        protocol::send(&mut output, &Assignment::Chunk { start, end })?;

        match protocol::recv::<Report, _>(&mut input)? {
            Some(Report::Done { start, end, status }) => {
                if status != 0 {
                    warn!(rank, start, end, status, "chunk failed");
                }
                completions.push(Completion {
                    rank,
                    start,
                    end,
                    status,
                });
            }
            other => {
                return Err(ShoalError::Protocol(format!(
                    "rank {rank}: lost during chunk [{start}, {end}): got {other:?}"
                )));
            }
        }
    }
    // Closing the worker's stdin lets it finish its own merge and exit.
    drop(output);
    Ok(completions)
}
