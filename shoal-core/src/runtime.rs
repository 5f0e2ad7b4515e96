use crate::dispatch;
use crate::store::Archive;
use crate::store::writer::ArchiveWriter;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Base paths of the output archive. Intermediate files hang suffixes off
/// these: `<base>.<rank>.<start>.<end>` per chunk, `<base>.<rank>` per rank,
/// the bare base for the final archive.
#[derive(Clone, Debug)]
pub struct OutputBase {
    pub data: PathBuf,
    pub index: PathBuf,
}

impl OutputBase {
    pub fn fragment(&self, rank: usize, start: usize, end: usize) -> (PathBuf, PathBuf) {
        (
            suffixed(&self.data, &format!("{rank}.{start}.{end}")),
            suffixed(&self.index, &format!("{rank}.{start}.{end}")),
        )
    }

    pub fn rank_archive(&self, rank: usize) -> (PathBuf, PathBuf) {
        (
            suffixed(&self.data, &rank.to_string()),
            suffixed(&self.index, &rank.to_string()),
        )
    }
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", base.display(), suffix))
}

/// Shared context for one rank's payload callback.
pub struct ApplyTask<'a> {
    pub archive: &'a Archive,
    pub program: &'a str,
    pub args: &'a [String],
    pub output: Option<&'a OutputBase>,
    pub rank: usize,
}

/// Process one assigned chunk: records `[start, end)` in ascending order,
/// output captured into this rank-and-range's fragment files. Stops at the
/// first record whose lookup or dispatch fails and reports the chunk failed;
/// whatever was already written stays in the fragment. Returns 0 on success.
pub fn run_chunk(task: &ApplyTask<'_>, start: usize, end: usize) -> i32 {
    let mut writer = match task.output {
        Some(base) => {
            let (data, index) = base.fragment(task.rank, start, end);
            match ArchiveWriter::create(&data, &index) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(rank = task.rank, start, end, error = %e, "cannot open fragment");
                    return 1;
                }
            }
        }
        None => None,
    };

    for i in start..end {
        let entry = match task.archive.index.get(i) {
            Some(e) => e.clone(),
            None => {
                warn!(rank = task.rank, record = i, "record lookup failed");
                return 1;
            }
        };
        let payload = match task.archive.record_payload(&entry) {
            Ok(p) => p,
            Err(e) => {
                warn!(rank = task.rank, name = %entry.name, error = %e, "record lookup failed");
                return 1;
            }
        };
        match dispatch::apply_record(
            payload,
            &entry.name,
            task.program,
            task.args,
            writer.as_mut(),
        ) {
            Ok(code) => {
                // Per-record status line, one per attempt.
                let _ = writeln!(
                    io::stderr(),
                    "{}\t{}\t{}\t{}",
                    entry.name,
                    entry.offset,
                    entry.length,
                    code
                );
            }
            Err(e) => {
                warn!(rank = task.rank, name = %entry.name, error = %e, "record dispatch failed");
                return 1;
            }
        }
    }
    0
}
