/// File-backed block state store (the `.bitmap` file)
///
/// Layout is one status byte per block, stored at byte offset == block
/// index. The file grows sparsely as blocks are recorded; anything past
/// EOF reads back as untried.
use super::{BlockStatus, RangeSummary, StateStore};
use crate::{BlockRange, RescueError, RescueResult};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Chunk size used when summarizing large ranges
const SUMMARY_CHUNK: usize = 64 * 1024;

pub struct FileStateStore {
    file: File,
    path: PathBuf,
    /// fdatasync after every write
    sync_writes: bool,
}

impl FileStateStore {
    /// Open the state file, creating it if it doesn't exist
    pub fn open(path: impl AsRef<Path>) -> RescueResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        tracing::debug!(path = %path.display(), "Opened state store");

        Ok(Self {
            file,
            path,
            sync_writes: false,
        })
    }

    /// Sync every status write to the device, not just the page cache
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length, i.e. one past the highest block ever recorded
    pub fn len(&self) -> RescueResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> RescueResult<bool> {
        Ok(self.len()? == 0)
    }

    fn store_error(block: u64, source: std::io::Error) -> RescueError {
        RescueError::StateStore { block, source }
    }

    /// Read as many bytes as are available at `offset` (short at EOF)
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl StateStore for FileStateStore {
    fn get(&mut self, block: u64) -> RescueResult<BlockStatus> {
        let mut byte = [0u8; 1];
        let read = self
            .read_at(block, &mut byte)
            .map_err(|e| Self::store_error(block, e))?;

        if read == 0 {
            return Ok(BlockStatus::UNTRIED);
        }
        Ok(BlockStatus::from_byte(byte[0]))
    }

    fn set(&mut self, block: u64, status: BlockStatus) -> RescueResult<()> {
        self.file
            .seek(SeekFrom::Start(block))
            .map_err(|e| Self::store_error(block, e))?;
        self.file
            .write_all(&[status.to_byte()])
            .map_err(|e| Self::store_error(block, e))?;

        if self.sync_writes {
            self.file
                .sync_data()
                .map_err(|e| Self::store_error(block, e))?;
        }

        Ok(())
    }

    fn summarize(&mut self, range: BlockRange) -> RescueResult<RangeSummary> {
        let mut summary = RangeSummary::default();
        let mut buf = vec![0u8; SUMMARY_CHUNK];
        let mut block = range.start;

        while block < range.end {
            let want = (range.end - block).min(SUMMARY_CHUNK as u64) as usize;
            let read = self
                .read_at(block, &mut buf[..want])
                .map_err(|e| Self::store_error(block, e))?;

            for &byte in &buf[..read] {
                summary.record(BlockStatus::from_byte(byte));
            }

            if read < want {
                // Past EOF: the rest of the range was never written
                summary.untried += range.end - block - read as u64;
                break;
            }
            block += want as u64;
        }

        Ok(summary)
    }

    fn flush(&mut self) -> RescueResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
