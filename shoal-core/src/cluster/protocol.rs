//! Line-delimited control messages between the coordinator and its worker
//! ranks, carried over the workers' stdin/stdout pipes. One JSON object per
//! line; a worker's own stdout is reserved for this channel.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Coordinator to worker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum Assignment {
    Chunk { start: usize, end: usize },
    Shutdown,
}

/// Worker to coordinator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum Report {
    Ready,
    Done { start: usize, end: usize, status: i32 },
}

pub fn send<T: Serialize, W: Write>(w: &mut W, msg: &T) -> Result<()> {
    serde_json::to_writer(&mut *w, msg)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// Read one message; `None` means the peer closed the channel.
pub fn recv<T: DeserializeOwned, R: BufRead>(r: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}
