use crate::cluster::worker::ChunkResult;
use crate::error::{Result, ShoalError};
use crate::runtime::OutputBase;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Two-level fragment merger. Both levels shell out to the external merge
/// command (`argv + [-d, dst_data, -i, dst_index, src_data, src_index]`),
/// whose exit status gates deletion of the merged inputs. Steps whose inputs
/// are already gone are skipped, so a retry after a prior success is a no-op.
pub struct Merger<'a> {
    /// Program plus leading arguments of the merge command.
    pub command: &'a [String],
    pub base: &'a OutputBase,
}

impl Merger<'_> {
    /// Intra-rank pass: fold every chunk fragment this rank recorded into the
    /// rank-level archive, in ledger order.
    pub fn merge_rank_fragments(&self, rank: usize, ledger: &[ChunkResult]) -> Result<()> {
        let dst = self.base.rank_archive(rank);
        for chunk in ledger {
            let src = self.base.fragment(rank, chunk.start, chunk.end);
            self.merge_step(&dst, &src)?;
        }
        Ok(())
    }

    /// Final pass, run at the coordinator once all workers have exited: fold
    /// each rank-level archive into the bare output base, ranks ascending.
    pub fn merge_ranks(&self, world: usize) -> Result<()> {
        let dst = (self.base.data.clone(), self.base.index.clone());
        for rank in 1..=world {
            let src = self.base.rank_archive(rank);
            self.merge_step(&dst, &src)?;
        }
        Ok(())
    }

    fn merge_step(&self, dst: &(PathBuf, PathBuf), src: &(PathBuf, PathBuf)) -> Result<()> {
        if !src.0.exists() || !src.1.exists() {
            debug!(src = %src.0.display(), "fragment already merged, skipping");
            return Ok(());
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ShoalError::Protocol("empty merge command".into()))?;

        let status = Command::new(program)
            .args(args)
            .arg("-d")
            .arg(&dst.0)
            .arg("-i")
            .arg(&dst.1)
            .arg(&src.0)
            .arg(&src.1)
            .status()
            .map_err(|source| ShoalError::Spawn {
                program: program.clone(),
                source,
            })?;

        if status.success() {
            // Inputs are consumed only after a clean merge.
            for path in [&src.0, &src.1] {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "cannot remove merged fragment");
                }
            }
        } else {
            warn!(
                src = %src.0.display(),
                code = status.code().unwrap_or(-1),
                "merge failed, leaving inputs in place"
            );
        }
        Ok(())
    }
}
