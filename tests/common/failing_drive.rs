/// File-backed source drive that fails reads on chosen blocks
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte pattern of a block, so misplaced copies are easy to spot
pub fn block_pattern(block: u64) -> u8 {
    (block % 251) as u8 + 1
}

/// Write a source image of `blocks` patterned blocks to `path`
pub fn write_image(path: &Path, blocks: u64, block_size: usize) -> io::Result<()> {
    let mut file = File::create(path)?;
    for block in 0..blocks {
        file.write_all(&vec![block_pattern(block); block_size])?;
    }
    file.sync_all()
}

pub struct FailingDrive {
    path: PathBuf,
    file: File,
    block_size: u64,
    bad: HashSet<u64>,
    /// Block index of every read call, in order
    pub reads: Vec<u64>,
}

#[allow(dead_code)]
impl FailingDrive {
    pub fn open(path: &Path, block_size: usize, bad: impl IntoIterator<Item = u64>) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: File::open(path)?,
            block_size: block_size as u64,
            bad: bad.into_iter().collect(),
            reads: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn heal_all(&mut self) {
        self.bad.clear();
    }

    pub fn read_count(&self, block: u64) -> usize {
        self.reads.iter().filter(|&&b| b == block).count()
    }
}

impl Read for FailingDrive {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let block = self.file.stream_position()? / self.block_size;
        self.reads.push(block);
        if self.bad.contains(&block) {
            return Err(io::Error::other(format!(
                "simulated medium error at block {}",
                block
            )));
        }
        self.file.read(buf)
    }
}

impl Seek for FailingDrive {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}
