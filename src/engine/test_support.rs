/// Fault-injecting in-memory device for engine tests
use crate::engine::{RescueEngine, ScanSettings};
use crate::state::MemoryStateStore;
use crate::transfer::{BlockCopier, SyncData};
use crate::BlockRange;
use std::collections::{HashMap, HashSet};
use std::cell::RefCell;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// Source whose reads fail on a set of bad blocks. Counts read calls per
/// block so tests can tell attempted blocks from skipped ones.
pub struct FaultySource {
    inner: Cursor<Vec<u8>>,
    block_size: u64,
    bad: HashSet<u64>,
    pub reads: HashMap<u64, u32>,
}

impl FaultySource {
    /// `blocks` blocks where block `i` is filled with byte `i + 1`
    pub fn new(blocks: u64, block_size: usize, bad: impl IntoIterator<Item = u64>) -> Self {
        let data = (0..blocks)
            .flat_map(|b| std::iter::repeat((b as u8).wrapping_add(1)).take(block_size))
            .collect();
        Self {
            inner: Cursor::new(data),
            block_size: block_size as u64,
            bad: bad.into_iter().collect(),
            reads: HashMap::new(),
        }
    }

    pub fn heal(&mut self, block: u64) {
        self.bad.remove(&block);
    }

    pub fn attempted(&self, block: u64) -> bool {
        self.reads.contains_key(&block)
    }

    pub fn attempts(&self, block: u64) -> u32 {
        self.reads.get(&block).copied().unwrap_or(0)
    }

    pub fn attempted_blocks(&self) -> Vec<u64> {
        let mut blocks: Vec<u64> = self.reads.keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }
}

impl Read for FaultySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let block = self.inner.position() / self.block_size;
        *self.reads.entry(block).or_insert(0) += 1;
        if self.bad.contains(&block) {
            return Err(io::Error::other(format!("medium error in block {}", block)));
        }
        self.inner.read(buf)
    }
}

impl Seek for FaultySource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Destination that remembers, at every sync, how many blocks held data
pub struct SyncRecordingDisk {
    inner: Cursor<Vec<u8>>,
    block_size: usize,
    pub syncs: Rc<RefCell<Vec<usize>>>,
}

impl SyncRecordingDisk {
    pub fn new(blocks: u64, block_size: usize) -> Self {
        Self {
            inner: Cursor::new(vec![0u8; blocks as usize * block_size]),
            block_size,
            syncs: Rc::default(),
        }
    }

    fn written_blocks(&self) -> usize {
        self.inner
            .get_ref()
            .chunks(self.block_size)
            .filter(|chunk| chunk.iter().any(|&b| b != 0))
            .count()
    }
}

impl Write for SyncRecordingDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SyncRecordingDisk {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl SyncData for SyncRecordingDisk {
    fn sync_data(&mut self) -> io::Result<()> {
        let written = self.written_blocks();
        self.syncs.borrow_mut().push(written);
        Ok(())
    }
}

pub type TestEngine = RescueEngine<FaultySource, Cursor<Vec<u8>>, MemoryStateStore>;

/// Engine over `[0, blocks)` with the given bad blocks and a fresh store
pub fn engine(
    blocks: u64,
    block_size: usize,
    bad: impl IntoIterator<Item = u64>,
    tweak: impl FnOnce(&mut ScanSettings),
) -> TestEngine {
    engine_with_store(blocks, block_size, bad, MemoryStateStore::new(), tweak)
}

pub fn engine_with_store(
    blocks: u64,
    block_size: usize,
    bad: impl IntoIterator<Item = u64>,
    store: MemoryStateStore,
    tweak: impl FnOnce(&mut ScanSettings),
) -> TestEngine {
    let source = FaultySource::new(blocks, block_size, bad);
    let destination = Cursor::new(vec![0u8; blocks as usize * block_size]);
    let mut settings = ScanSettings::new(BlockRange::new(0, blocks).unwrap());
    tweak(&mut settings);
    RescueEngine::new(BlockCopier::new(source, destination, block_size), store, settings)
}

/// Progress reporter that remembers what it was told
#[derive(Clone, Default)]
pub struct RecordingProgress {
    pub updates: Rc<RefCell<Vec<u64>>>,
    pub finishes: Rc<RefCell<Vec<(u64, crate::engine::Counters)>>>,
}

impl crate::ui::ProgressReporter for RecordingProgress {
    fn update(&mut self, block: u64, _range: BlockRange, _counters: &crate::engine::Counters) {
        self.updates.borrow_mut().push(block);
    }

    fn finish(&mut self, block: u64, _range: BlockRange, counters: &crate::engine::Counters) {
        self.finishes.borrow_mut().push((block, *counters));
    }
}
