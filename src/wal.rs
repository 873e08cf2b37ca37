//! Append-only event log backing the table and reservation collections.
//!
//! Record layout: `[u32 LE payload len][bincode Event][u32 LE crc32 of payload]`.
//! A torn or corrupt tail (crash mid-write) ends replay; everything before it
//! is kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from corruption.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

fn write_record(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL record too large"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// Fill `buf`, or report a clean end of data with `Ok(false)`.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// One record's payload, checksum verified. `None` at a clean or torn end.
fn read_record(input: &mut impl Read, path: &Path, seen: usize) -> io::Result<Option<Vec<u8>>> {
    let mut word = [0u8; 4];
    if !read_full(input, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_RECORD_LEN {
        tracing::warn!(path = %path.display(), valid = seen, len, "implausible WAL record length, discarding tail");
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(input, &mut payload)? || !read_full(input, &mut word)? {
        tracing::warn!(path = %path.display(), valid = seen, "WAL ends in a partial record, discarding it");
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        tracing::warn!(path = %path.display(), valid = seen, "WAL checksum mismatch, discarding tail");
        return Ok(None);
    }
    Ok(Some(payload))
}

fn open_for_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn compaction_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

pub struct Wal {
    out: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            out: open_for_append(path)?,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Single durable append. The server writes through the group-commit
    /// pair `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Queue a record. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_record(&mut self.out, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `events` as a fresh log next to `path`, fsynced. Nothing
    /// replaces the live log until `swap_compact_file`.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(compaction_path(path))?);
        for event in events {
            write_record(&mut out, event)?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Move the compacted log over the live one and resume appending to it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compaction_path(&self.path), &self.path)?;
        self.out = open_for_append(&self.path)?;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in log order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let mut input = match File::open(path) {
            Ok(f) => BufReader::new(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut events = Vec::new();
        while let Some(payload) = read_record(&mut input, path, events.len())? {
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(path = %path.display(), valid = events.len(), "undecodable WAL record: {e}");
                    break;
                }
            }
        }
        Ok(events)
    }
}
