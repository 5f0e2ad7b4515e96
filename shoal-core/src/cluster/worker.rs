use crate::cluster::protocol::{self, Assignment, Report};
use crate::error::Result;
use std::io::{BufRead, Write};
use tracing::debug;

/// One ledger entry per chunk this rank attempted, in completion order. The
/// ledger is consumed once by the fragment merger after the run loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkResult {
    pub start: usize,
    pub end: usize,
    pub status: i32,
}

/// Worker-rank run loop: announce readiness, then execute the payload
/// callback for every assigned chunk until the coordinator says shutdown (or
/// closes the channel). Chunk failures are reported upstream in the `done`
/// message and recorded locally; they do not break the loop.
pub fn serve<R, W, F>(input: &mut R, output: &mut W, mut payload: F) -> Result<Vec<ChunkResult>>
where
    R: BufRead,
    W: Write,
    F: FnMut(usize, usize) -> i32,
{
    protocol::send(output, &Report::Ready)?;

    let mut ledger = Vec::new();
    loop {
        match protocol::recv::<Assignment, _>(input)? {
            Some(Assignment::Chunk { start, end }) => {
                debug!(start, end, "chunk assigned");
                let status = payload(start, end);
                ledger.push(ChunkResult { start, end, status });
                protocol::send(output, &Report::Done { start, end, status })?;
            }
            Some(Assignment::Shutdown) | None => break,
        }
    }
    Ok(ledger)
}
