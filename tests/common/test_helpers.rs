/// Common test helper functions
use super::failing_drive::{block_pattern, write_image};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

/// Source image, destination and state file in one temp directory
pub struct RescueWorkspace {
    pub dir: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub state: PathBuf,
    pub blocks: u64,
    pub block_size: usize,
}

#[allow(dead_code)]
impl RescueWorkspace {
    pub fn new(blocks: u64, block_size: usize) -> io::Result<Self> {
        let dir = TempDir::new()?;
        let source = dir.path().join("source.img");
        let destination = dir.path().join("rescued.img");
        let state = dir.path().join("rescued.img.bitmap");
        write_image(&source, blocks, block_size)?;
        Ok(Self {
            dir,
            source,
            destination,
            state,
            blocks,
            block_size,
        })
    }

    /// Destination opened read-write, created and sized like the source
    pub fn open_destination(&self) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.destination)?;
        file.set_len(self.blocks * self.block_size as u64)?;
        Ok(file)
    }

    /// Raw state file bytes, padded with zeros to the block count
    pub fn state_bytes(&self) -> io::Result<Vec<i8>> {
        let mut bytes = match fs::read(&self.state) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        bytes.resize(self.blocks as usize, 0);
        Ok(bytes.into_iter().map(|b| b as i8).collect())
    }

    /// Blocks of the destination whose content matches the source
    pub fn rescued_blocks(&self) -> io::Result<Vec<u64>> {
        let data = fs::read(&self.destination)?;
        Ok(data
            .chunks(self.block_size)
            .enumerate()
            .filter(|(i, chunk)| chunk.iter().all(|&b| b == block_pattern(*i as u64)))
            .map(|(i, _)| i as u64)
            .collect())
    }
}
