/// Block transfer primitive
///
/// Copies one block from the source stream to the same offset in the
/// destination stream. Every I/O problem here is a per-block condition
/// described by [`TransferError`]; none of them is fatal to the run.
pub mod retry;

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use thiserror::Error;

/// Which side of the copy an error happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Source,
    Destination,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Source => write!(f, "source"),
            Stream::Destination => write!(f, "destination"),
        }
    }
}

/// Destinations that can push written blocks to stable storage
pub trait SyncData {
    /// Make everything written so far durable. In-memory sinks have
    /// nothing to do.
    fn sync_data(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SyncData for std::fs::File {
    fn sync_data(&mut self) -> io::Result<()> {
        std::fs::File::sync_data(self)
    }
}

impl<T> SyncData for io::Cursor<T> {}

impl<T: SyncData + ?Sized> SyncData for &mut T {
    fn sync_data(&mut self) -> io::Result<()> {
        (**self).sync_data()
    }
}

/// Why a single block attempt failed
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("block {block} lies beyond the addressable byte range")]
    OffsetOverflow { block: u64 },

    #[error("{stream} seek to offset {offset} failed: {source}")]
    Seek {
        stream: Stream,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("source read at offset {offset} failed: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("short read at offset {offset}: got {got} of {expected} bytes")]
    ShortRead {
        offset: u64,
        expected: usize,
        got: usize,
    },

    #[error("destination write at offset {offset} failed: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("short write at offset {offset}: put {put} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        expected: usize,
        put: usize,
    },
}

impl TransferError {
    /// Short transfers as opposed to hard I/O errors. Only used for
    /// reporting; both count as a failed attempt.
    pub fn is_short_transfer(&self) -> bool {
        matches!(
            self,
            TransferError::ShortRead { .. } | TransferError::ShortWrite { .. }
        )
    }
}

/// Copies fixed-size blocks between two seekable streams using a single
/// buffer allocated once for the whole run.
pub struct BlockCopier<S, D> {
    source: S,
    destination: D,
    block_size: usize,
    buffer: Vec<u8>,
    last_failure: Option<TransferError>,
}

impl<S: Read + Seek, D: Write + Seek> BlockCopier<S, D> {
    pub fn new(source: S, destination: D, block_size: usize) -> Self {
        Self {
            source,
            destination,
            block_size,
            buffer: vec![0u8; block_size],
            last_failure: None,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Byte offset of `block`, or `None` if it doesn't fit in 64 bits
    pub fn offset_of(&self, block: u64) -> Option<u64> {
        block.checked_mul(self.block_size as u64)
    }

    /// Copy exactly one block. Succeeds only if the full block was read
    /// and the full block was written.
    pub fn copy_block(&mut self, block: u64) -> Result<(), TransferError> {
        let offset = self
            .offset_of(block)
            .ok_or(TransferError::OffsetOverflow { block })?;

        self.source
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TransferError::Seek {
                stream: Stream::Source,
                offset,
                source,
            })?;
        self.destination
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TransferError::Seek {
                stream: Stream::Destination,
                offset,
                source,
            })?;

        let got = fill_buffer(&mut self.source, &mut self.buffer)
            .map_err(|source| TransferError::Read { offset, source })?;
        if got != self.block_size {
            return Err(TransferError::ShortRead {
                offset,
                expected: self.block_size,
                got,
            });
        }

        let put = drain_buffer(&mut self.destination, &self.buffer)
            .map_err(|source| TransferError::Write { offset, source })?;
        if put != self.block_size {
            return Err(TransferError::ShortWrite {
                offset,
                expected: self.block_size,
                put,
            });
        }

        Ok(())
    }

    /// Error from the most recent failed attempt, if any
    pub fn last_failure(&self) -> Option<&TransferError> {
        self.last_failure.as_ref()
    }

    pub(crate) fn set_last_failure(&mut self, failure: Option<TransferError>) {
        self.last_failure = failure;
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Give back the streams
    pub fn into_inner(self) -> (S, D) {
        (self.source, self.destination)
    }
}

impl<S: Read + Seek, D: Write + Seek + SyncData> BlockCopier<S, D> {
    /// Flush the destination and sync it to stable storage
    pub fn sync_destination(&mut self) -> io::Result<()> {
        self.destination.flush()?;
        self.destination.sync_data()
    }
}

/// Read until `buf` is full, EOF, or an error. Returns the bytes read.
fn fill_buffer<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write all of `buf` unless the writer stops accepting bytes
fn drain_buffer<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut put = 0;
    while put < buf.len() {
        match writer.write(&buf[put..]) {
            Ok(0) => break,
            Ok(n) => put += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(put)
}
