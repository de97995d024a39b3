use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::JournalRecord;

/// Frame one record as `[u32 len][bincode payload][u32 crc32]`, little endian.
fn encode_record(writer: &mut impl Write, record: &JournalRecord) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf` completely. `Ok(false)` on a clean or partial end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact record, or `None` at the end of the valid prefix.
fn decode_record(reader: &mut impl Read) -> io::Result<Option<JournalRecord>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload).ok())
}

/// Byte sink under the journal: a `File` outside of tests.
pub trait JournalFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the sink back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append-only reservation journal.
///
/// A crash mid-append leaves a short or corrupt tail; replay stops at the
/// first record that fails its length or checksum and ignores the rest.
/// A failed batch is cut back off the file before the error is returned, so
/// later batches never land behind a torn record.
pub struct Journal<F: JournalFile = File> {
    file: F,
    path: PathBuf,
    /// Bytes known to hold whole, synced records.
    len: u64,
    appends_since_compact: u64,
    /// Set when a failed batch could not be cut back. Every later append fails.
    poisoned: bool,
}

impl<F: JournalFile> Journal<F> {
    /// Write `records` as one batch and fsync. Either every record is durable
    /// or the journal is left exactly as it was.
    pub fn append_batch<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a JournalRecord>,
    ) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("journal unusable after a failed rollback"));
        }
        let mut frames = Vec::new();
        let mut count = 0u64;
        for record in records {
            encode_record(&mut frames, record)?;
            count += 1;
        }
        if frames.is_empty() {
            return Ok(());
        }

        let written = self
            .file
            .write_all(&frames)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync());
        match written {
            Ok(()) => {
                self.len += frames.len() as u64;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self.file.truncate(self.len) {
                    tracing::error!(path = %self.path.display(), "cannot cut back failed journal batch: {cut}");
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    #[cfg(test)]
    fn with_file(file: F, path: PathBuf) -> Self {
        Self {
            file,
            path,
            len: 0,
            appends_since_compact: 0,
            poisoned: false,
        }
    }
}

impl Journal<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
            appends_since_compact: 0,
            poisoned: false,
        })
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("journal.tmp")
    }

    /// Replace the journal with `records`: write a temp file, fsync, rename
    /// over the live file, reopen for appends.
    pub fn compact(&mut self, records: &[JournalRecord]) -> io::Result<()> {
        let tmp_path = Self::compact_path(&self.path);
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in records {
                encode_record(&mut tmp, record)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.len = file.metadata()?.len();
        self.file = file;
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Read back every intact record. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<JournalRecord>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        while let Some(record) = decode_record(&mut reader)? {
            records.push(record);
        }
        Ok(records)
    }
}
