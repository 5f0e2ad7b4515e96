use crate::error::{Result, ShoalError};
use crate::store::index::{Entry, Index};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Read-only view of an archive: the memory-mapped data blob plus its parsed
/// index. Every rank opens its own independent mapping.
pub struct Archive {
    map: Option<Mmap>,
    pub index: Index,
}

impl Archive {
    pub fn open(data_path: &Path, index_path: &Path) -> Result<Self> {
        let f = File::open(data_path)?;
        // A zero-length file cannot be mapped; expose it as an empty slice.
        let map = if f.metadata()?.len() == 0 {
            None
        } else {
            Some(map_readonly(&f)?)
        };
        let index = Index::parse(index_path)?;
        Ok(Archive { map, index })
    }

    pub fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Full stored byte range of a record, terminator included.
    pub fn record_bytes(&self, e: &Entry) -> Result<&[u8]> {
        let start = e.offset as usize;
        let end = start
            .checked_add(e.length as usize)
            .filter(|&end| end <= self.data().len())
            .ok_or_else(|| {
                ShoalError::Format(format!(
                    "record {}: range {}+{} outside data blob of {} bytes",
                    e.name,
                    e.offset,
                    e.length,
                    self.data().len()
                ))
            })?;
        Ok(&self.data()[start..end])
    }

    /// Record content with the trailing terminator byte stripped. This is
    /// what gets delivered to a child program's stdin.
    pub fn record_payload(&self, e: &Entry) -> Result<&[u8]> {
        let bytes = self.record_bytes(e)?;
        match bytes.split_last() {
            Some((_, payload)) => Ok(payload),
            None => Ok(bytes),
        }
    }
}

#[allow(unsafe_code)]
fn map_readonly(f: &File) -> Result<Mmap> {
    // Safety: the archive data file is treated as immutable for the lifetime
    // of the run by every rank.
    Ok(unsafe { Mmap::map(f)? })
}
