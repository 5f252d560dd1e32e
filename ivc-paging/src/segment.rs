//! The append-only, segmented byte log backing a [`crate::store::PagingStore`]:
//! a directory of `part0`, `part1`, … files, each an uninterpreted stream of
//! concatenated records. Grounded in `ioi-storage::wal`'s buffered-writer and
//! flush-before-read discipline and `ioi-scs::store`'s append-only-log
//! layout, adapted to a single-threaded `RefCell` writer in place of the
//! teacher's `Mutex`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use ivc_types::PagingError;

use crate::config::PagingConfig;
use crate::token::Token;

fn segment_path(dir: &Path, file_id: u8) -> PathBuf {
    dir.join(format!("part{file_id}"))
}

pub struct SegmentedLog {
    dir: PathBuf,
    config: PagingConfig,
    writer_file_id: Cell<u8>,
    writer: RefCell<BufWriter<File>>,
    /// Logical length of the current writer segment, including bytes still
    /// sitting in `writer`'s buffer.
    segment_len: Cell<u64>,
    /// Length of the current writer segment actually flushed to the OS.
    flushed_len: Cell<u64>,
    readers: RefCell<HashMap<u8, File>>,
}

impl SegmentedLog {
    /// Opens (creating if absent) a segmented log in `dir`. Re-derives the
    /// current segment count and the writer's append position purely from
    /// the filesystem — no separate manifest is needed because tokens are
    /// self-describing (file id, offset, length).
    pub fn open(dir: &Path, config: PagingConfig) -> Result<SegmentedLog, PagingError> {
        fs::create_dir_all(dir)?;
        let mut file_id = 0u8;
        while segment_path(dir, file_id + 1).exists() {
            file_id = file_id
                .checked_add(1)
                .expect("segmented log directory already uses all 256 segment ids");
        }
        let path = segment_path(dir, file_id);
        let existing_len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        file.lock_exclusive()?;

        Ok(SegmentedLog {
            dir: dir.to_path_buf(),
            config,
            writer_file_id: Cell::new(file_id),
            writer: RefCell::new(BufWriter::with_capacity(config.writer_buffer_bytes, file)),
            segment_len: Cell::new(existing_len),
            flushed_len: Cell::new(existing_len),
            readers: RefCell::new(HashMap::new()),
        })
    }

    fn flush_writer(&self) -> Result<(), PagingError> {
        let mut w = self.writer.borrow_mut();
        w.flush()?;
        w.get_ref().sync_data()?;
        self.flushed_len.set(self.segment_len.get());
        Ok(())
    }

    fn roll_segment(&self) -> Result<(), PagingError> {
        self.flush_writer()?;
        let next_id = self
            .writer_file_id
            .get()
            .checked_add(1)
            .expect("segmented log exhausted the 256 available segment ids");
        let path = segment_path(&self.dir, next_id);
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        file.lock_exclusive()?;
        *self.writer.borrow_mut() = BufWriter::with_capacity(self.config.writer_buffer_bytes, file);
        self.writer_file_id.set(next_id);
        self.segment_len.set(0);
        self.flushed_len.set(0);
        Ok(())
    }

    /// Appends `bytes` as a single record and returns the token locating it.
    pub fn append(&self, bytes: &[u8]) -> Result<Token, PagingError> {
        assert!(!bytes.is_empty(), "cannot persist an empty record");
        if self.segment_len.get() + bytes.len() as u64 > self.config.segment_max_bytes {
            self.roll_segment()?;
        }
        let file_id = self.writer_file_id.get();
        let offset = self.segment_len.get();
        let token = Token::pack(bytes.len() as u32, file_id, offset as u32);

        self.writer.borrow_mut().write_all(bytes)?;
        self.segment_len.set(offset + bytes.len() as u64);
        Ok(token)
    }

    /// Reads back the record located by `token`. If any of the requested
    /// bytes are still sitting in the writer's buffer, flushes it first —
    /// the same flush-before-read ordering as the teacher's WAL compaction.
    pub fn read(&self, token: Token) -> Result<Vec<u8>, PagingError> {
        let file_id = token.file_id();
        let offset = token.offset() as u64;
        let length = token.length() as u64;

        if file_id == self.writer_file_id.get() && offset + length > self.flushed_len.get() {
            self.flush_writer()?;
        }

        let mut readers = self.readers.borrow_mut();
        if !readers.contains_key(&file_id) {
            let path = segment_path(&self.dir, file_id);
            let file = File::open(&path).map_err(|_| PagingError::MissingSegment(file_id))?;
            readers.insert(file_id, file);
        }
        let file = readers.get_mut(&file_id).expect("just inserted");
        let file_len = file.metadata()?.len();
        if offset + length > file_len {
            return Err(PagingError::TokenOutOfBounds(token.0, file_id));
        }
        let mut buf = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl Drop for SegmentedLog {
    fn drop(&mut self) {
        let _ = self.writer.borrow().get_ref().unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), PagingConfig::default()).unwrap();
        let t1 = log.append(b"hello").unwrap();
        let t2 = log.append(b"world!!").unwrap();
        assert_eq!(log.read(t1).unwrap(), b"hello");
        assert_eq!(log.read(t2).unwrap(), b"world!!");
    }

    #[test]
    fn read_flushes_buffered_bytes_before_reading() {
        let dir = tempdir().unwrap();
        let log = SegmentedLog::open(dir.path(), PagingConfig::default()).unwrap();
        let token = log.append(b"still in the writer buffer").unwrap();
        // Nothing has explicitly flushed yet; read() must do it internally.
        assert_eq!(log.read(token).unwrap(), b"still in the writer buffer");
    }

    #[test]
    fn reopening_an_existing_directory_resumes_appending() {
        let dir = tempdir().unwrap();
        let token = {
            let log = SegmentedLog::open(dir.path(), PagingConfig::default()).unwrap();
            let t = log.append(b"first").unwrap();
            log.read(t).unwrap();
            t
        };
        let log2 = SegmentedLog::open(dir.path(), PagingConfig::default()).unwrap();
        assert_eq!(log2.read(token).unwrap(), b"first");
        let t2 = log2.append(b"second").unwrap();
        assert_eq!(log2.read(t2).unwrap(), b"second");
    }

    #[test]
    fn a_record_larger_than_the_segment_rolls_to_a_new_file() {
        let dir = tempdir().unwrap();
        let config = PagingConfig {
            segment_max_bytes: 16,
            ..PagingConfig::default()
        };
        let log = SegmentedLog::open(dir.path(), config).unwrap();
        let t1 = log.append(b"0123456789").unwrap();
        let t2 = log.append(b"abcdefghij").unwrap();
        assert_eq!(t1.file_id(), 0);
        assert_eq!(t2.file_id(), 1);
        assert_eq!(log.read(t1).unwrap(), b"0123456789");
        assert_eq!(log.read(t2).unwrap(), b"abcdefghij");
    }
}
