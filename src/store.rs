//! Keyed record store.
//!
//! A store at `<db>` is made of three files:
//! - `<db>`: entry payloads, each terminated by a single `\0` byte
//! - `<db>.index`: one `key\toffset\tlength` line per entry, sorted by key,
//!   where `length` includes the terminating `\0`
//! - `<db>.dbtype`: bincode-encoded [`DbType`] tag
//!
//! Readers memory-map the data file and resolve keys by binary search over the
//! index. Writers append to one shard per worker and merge the shards on close.

use log::debug;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Kind of payload held by a store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbType {
    #[default]
    Generic,
    Nucleotides,
    Headers,
    AlignmentResult,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    key: u32,
    offset: u64,
    length: u64,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn index_path(path: &Path) -> PathBuf {
    with_suffix(path, ".index")
}

pub fn dbtype_path(path: &Path) -> PathBuf {
    with_suffix(path, ".dbtype")
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn parse_index_line(line: &str) -> Option<IndexEntry> {
    let mut fields = line.split('\t');
    let key = fields.next()?.parse::<u32>().ok()?;
    let offset = fields.next()?.parse::<u64>().ok()?;
    let length = fields.next()?.parse::<u64>().ok()?;
    Some(IndexEntry {
        key,
        offset,
        length,
    })
}

fn read_index_file(path: &Path) -> io::Result<Vec<IndexEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let entry = parse_index_line(&line).ok_or_else(|| {
            invalid_data(format!(
                "Malformed index line {} in '{}': '{}'",
                line_no + 1,
                path.display(),
                line
            ))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn read_dbtype(path: &Path) -> io::Result<DbType> {
    let dbtype_file = dbtype_path(path);
    if !dbtype_file.exists() {
        return Ok(DbType::Generic);
    }
    let mut reader = BufReader::new(File::open(&dbtype_file)?);
    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()).map_err(|e| {
        invalid_data(format!(
            "Failed to read store type from '{}': {:?}",
            dbtype_file.display(),
            e
        ))
    })
}

fn write_dbtype(path: &Path, dbtype: DbType) -> io::Result<()> {
    let dbtype_file = dbtype_path(path);
    let mut writer = BufWriter::new(File::create(&dbtype_file)?);
    bincode::serde::encode_into_std_write(dbtype, &mut writer, bincode::config::standard())
        .map_err(|e| {
            io::Error::other(format!(
                "Failed to write store type to '{}': {:?}",
                dbtype_file.display(),
                e
            ))
        })?;
    writer.flush()
}

enum DataBuffer {
    Mapped(Mmap),
    Empty,
}

impl DataBuffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            DataBuffer::Mapped(mmap) => &mmap[..],
            DataBuffer::Empty => &[],
        }
    }
}

/// Read-only, randomly accessible view of a record store
pub struct RecordReader {
    entries: Vec<IndexEntry>,
    data: DataBuffer,
    dbtype: DbType,
}

impl RecordReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to open record store '{}': {}", path.display(), e),
            )
        })?;
        let data_len = file.metadata()?.len();
        let data = if data_len == 0 {
            DataBuffer::Empty
        } else {
            // The store is opened read-only and never modified while mapped.
            DataBuffer::Mapped(unsafe { Mmap::map(&file)? })
        };

        let entries = read_index_file(&index_path(path))?;
        for (i, entry) in entries.iter().enumerate() {
            if entry.offset.saturating_add(entry.length) > data_len {
                return Err(invalid_data(format!(
                    "Index entry for key {} in '{}' points past the end of the data file",
                    entry.key,
                    path.display()
                )));
            }
            if i > 0 && entries[i - 1].key >= entry.key {
                return Err(invalid_data(format!(
                    "Index of '{}' is not strictly sorted by key at key {}",
                    path.display(),
                    entry.key
                )));
            }
        }

        let dbtype = read_dbtype(path)?;
        debug!(
            "Opened record store '{}' with {} entries ({:?})",
            path.display(),
            entries.len(),
            dbtype
        );

        Ok(RecordReader {
            entries,
            data,
            dbtype,
        })
    }

    pub fn dbtype(&self) -> DbType {
        self.dbtype
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `key` in the index, `None` if the store has no such key.
    pub fn id_of(&self, key: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&key, |e| e.key).ok()
    }

    pub fn key_at(&self, id: usize) -> u32 {
        self.entries[id].key
    }

    /// Largest key in the store
    pub fn last_key(&self) -> Option<u32> {
        self.entries.last().map(|e| e.key)
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    /// Payload of entry `id`, without its `\0` terminator.
    pub fn data(&self, id: usize) -> &[u8] {
        let entry = &self.entries[id];
        let start = entry.offset as usize;
        let end = start + entry.length.saturating_sub(1) as usize;
        &self.data.as_slice()[start..end]
    }

    pub fn get(&self, key: u32) -> Option<&[u8]> {
        self.id_of(key).map(|id| self.data(id))
    }

    /// Sequence length of entry `id`, ignoring a trailing newline.
    pub fn seq_len(&self, id: usize) -> usize {
        let data = self.data(id);
        match data.last() {
            Some(b'\n') => data.len() - 1,
            _ => data.len(),
        }
    }
}

struct Shard {
    data_path: PathBuf,
    index_path: PathBuf,
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
}

/// Sharded writer: each worker appends to its own shard, shards are merged
/// into a single store by [`RecordWriter::close`].
pub struct RecordWriter {
    path: PathBuf,
    dbtype: DbType,
    shards: Vec<Mutex<Shard>>,
}

impl RecordWriter {
    pub fn create<P: AsRef<Path>>(path: P, shard_count: usize, dbtype: DbType) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let shard_count = shard_count.max(1);

        let mut shards = Vec::with_capacity(shard_count);
        for n in 0..shard_count {
            let data_path = with_suffix(&path, &format!(".{n}"));
            let index_path = with_suffix(&index_path(&path), &format!(".{n}"));
            shards.push(Mutex::new(Shard {
                data: BufWriter::new(File::create(&data_path)?),
                index: BufWriter::new(File::create(&index_path)?),
                data_path,
                index_path,
                offset: 0,
            }));
        }

        Ok(RecordWriter {
            path,
            dbtype,
            shards,
        })
    }

    /// Append one entry to `shard`.
    pub fn write(&self, key: u32, payload: &[u8], shard: usize) -> io::Result<()> {
        let mut shard = self.shards[shard % self.shards.len()]
            .lock()
            .map_err(|_| io::Error::other("Record writer shard lock poisoned"))?;
        shard.data.write_all(payload)?;
        shard.data.write_all(b"\0")?;
        let length = payload.len() as u64 + 1;
        let offset = shard.offset;
        writeln!(shard.index, "{key}\t{offset}\t{length}")?;
        shard.offset += length;
        Ok(())
    }

    /// Merge all shards into the final store and remove the shard files.
    pub fn close(self) -> io::Result<()> {
        let mut merged = BufWriter::new(File::create(&self.path)?);
        let mut entries = Vec::new();
        let mut base_offset = 0u64;

        for shard in self.shards {
            let mut shard = shard
                .into_inner()
                .map_err(|_| io::Error::other("Record writer shard lock poisoned"))?;
            shard.data.flush()?;
            shard.index.flush()?;

            for entry in read_index_file(&shard.index_path)? {
                entries.push(IndexEntry {
                    offset: entry.offset + base_offset,
                    ..entry
                });
            }

            let mut shard_data = File::open(&shard.data_path)?;
            base_offset += io::copy(&mut shard_data, &mut merged)?;

            drop(shard.data);
            drop(shard.index);
            fs::remove_file(&shard.data_path)?;
            fs::remove_file(&shard.index_path)?;
        }
        merged.flush()?;

        entries.sort_by_key(|e| e.key);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(invalid_data(format!(
                "Key {} was written more than once to '{}'",
                pair[0].key,
                self.path.display()
            )));
        }

        let mut index = BufWriter::new(File::create(index_path(&self.path))?);
        for entry in &entries {
            writeln!(index, "{}\t{}\t{}", entry.key, entry.offset, entry.length)?;
        }
        index.flush()?;

        write_dbtype(&self.path, self.dbtype)?;
        debug!(
            "Closed record store '{}' with {} entries",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sharded_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("seqs");

        let writer = RecordWriter::create(&db, 3, DbType::Nucleotides).unwrap();
        writer.write(9, b"ACGT\n", 0).unwrap();
        writer.write(2, b"GG\n", 2).unwrap();
        writer.write(5, b"", 1).unwrap();
        writer.write(0, b"TTTTT\n", 2).unwrap();
        writer.close().unwrap();

        assert!(!with_suffix(&db, ".0").exists());
        assert!(!with_suffix(&index_path(&db), ".2").exists());

        let reader = RecordReader::open(&db).unwrap();
        assert_eq!(reader.dbtype(), DbType::Nucleotides);
        assert_eq!(reader.len(), 4);
        assert_eq!(reader.keys().collect::<Vec<_>>(), vec![0, 2, 5, 9]);
        assert_eq!(reader.last_key(), Some(9));
        assert_eq!(reader.get(9), Some(&b"ACGT\n"[..]));
        assert_eq!(reader.get(5), Some(&b""[..]));
        assert_eq!(reader.get(3), None);
        assert_eq!(reader.id_of(2), Some(1));
        assert_eq!(reader.key_at(3), 9);
        assert_eq!(reader.seq_len(reader.id_of(0).unwrap()), 5);
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("empty");
        RecordWriter::create(&db, 2, DbType::Generic)
            .unwrap()
            .close()
            .unwrap();

        let reader = RecordReader::open(&db).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.last_key(), None);
        assert_eq!(reader.get(0), None);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("dup");
        let writer = RecordWriter::create(&db, 2, DbType::Generic).unwrap();
        writer.write(1, b"a", 0).unwrap();
        writer.write(1, b"b", 1).unwrap();
        let err = writer.close().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_corrupt_index_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("corrupt");
        fs::write(&db, b"abc\0").unwrap();

        fs::write(index_path(&db), "0\t0\t40\n").unwrap();
        assert!(RecordReader::open(&db).is_err());

        fs::write(index_path(&db), "0\tzero\t4\n").unwrap();
        assert!(RecordReader::open(&db).is_err());

        fs::write(index_path(&db), "3\t0\t2\n1\t2\t2\n").unwrap();
        assert!(RecordReader::open(&db).is_err());

        fs::write(index_path(&db), "0\t0\t4\n").unwrap();
        let reader = RecordReader::open(&db).unwrap();
        assert_eq!(reader.dbtype(), DbType::Generic);
        assert_eq!(reader.get(0), Some(&b"abc"[..]));
    }

    #[test]
    fn test_missing_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = RecordReader::open(dir.path().join("absent")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
