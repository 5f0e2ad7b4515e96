use crate::error::{Result, ShoalError};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// One index line: a named byte range into the data blob. `length` counts the
/// trailing terminator byte, so the payload is `length - 1` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
}

/// Ordered record index. Ordinal position is the record index used for
/// chunk assignment; lookups by name binary-search a sorted index.
#[derive(Clone, Debug, Default)]
pub struct Index {
    pub entries: Vec<Entry>,
}

impl Index {
    pub fn parse(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            entries.push(parse_line(&line).ok_or_else(|| {
                ShoalError::Format(format!(
                    "{}:{}: expected name<TAB>offset<TAB>length",
                    path.display(),
                    lineno + 1
                ))
            })?);
        }
        Ok(Index { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Entry> {
        self.entries.get(i)
    }

    pub fn sort_by_name(&mut self) {
        self.entries.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        for e in &self.entries {
            write_line(&mut w, e)?;
        }
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<Entry> {
    let mut fields = line.split('\t');
    let name = fields.next()?.to_string();
    let offset = fields.next()?.parse().ok()?;
    let length = fields.next()?.parse().ok()?;
    if name.is_empty() || fields.next().is_some() {
        return None;
    }
    Some(Entry {
        name,
        offset,
        length,
    })
}

pub fn write_line<W: Write>(mut w: W, e: &Entry) -> Result<()> {
    writeln!(w, "{}\t{}\t{}", e.name, e.offset, e.length)?;
    Ok(())
}
