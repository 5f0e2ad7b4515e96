use crate::error::Result;
use crate::store::index::{self, Entry, Index};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Append-style writer for an output archive. Each insert lands one record:
/// payload bytes plus the terminator in the data file, one line in the index
/// file, with the running offset threaded across inserts.
pub struct ArchiveWriter {
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
}

impl ArchiveWriter {
    pub fn create(data_path: &Path, index_path: &Path) -> Result<Self> {
        Ok(ArchiveWriter {
            data: BufWriter::new(File::create(data_path)?),
            index: BufWriter::new(File::create(index_path)?),
            offset: 0,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn insert(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.data.write_all(bytes)?;
        self.data.write_all(b"\0")?;
        let length = bytes.len() as u64 + 1;
        index::write_line(
            &mut self.index,
            &Entry {
                name: name.to_string(),
                offset: self.offset,
                length,
            },
        )?;
        self.offset += length;
        // Keep both files current so merge subprocesses see every record.
        self.data.flush()?;
        self.index.flush()?;
        Ok(())
    }
}

/// Additive merge: append the source archive's data onto the destination,
/// rebase the source index offsets past the old destination size, and rewrite
/// the destination index sorted by name. Creates the destination on first use.
pub fn append_archive(
    dst_data: &Path,
    dst_index: &Path,
    src_data: &Path,
    src_index: &Path,
) -> Result<()> {
    let mut dst = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dst_data)?;
    let base = dst.metadata()?.len();
    io::copy(&mut File::open(src_data)?, &mut dst)?;
    dst.flush()?;

    let mut merged = if dst_index.exists() {
        Index::parse(dst_index)?
    } else {
        Index::default()
    };
    for e in Index::parse(src_index)?.entries {
        merged.entries.push(Entry {
            offset: e.offset + base,
            ..e
        });
    }
    merged.sort_by_name();

    let mut out = BufWriter::new(File::create(dst_index)?);
    merged.write_to(&mut out)?;
    out.flush()?;
    Ok(())
}
