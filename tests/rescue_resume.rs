/// Integration tests for resumable rescue runs on real files
///
/// Tests the full stack: file-backed source with bad blocks, destination
/// image file, and the `.bitmap` state file carried across runs.
mod common;

use anyhow::Result;
use blockrescue::report::BadBlockLog;
use blockrescue::*;
use common::failing_drive::FailingDrive;
use common::test_helpers::RescueWorkspace;
use std::sync::atomic::Ordering;

const BLOCK_SIZE: usize = 512;

fn open_engine(
    ws: &RescueWorkspace,
    bad: impl IntoIterator<Item = u64>,
    tweak: impl FnOnce(&mut ScanSettings),
) -> Result<RescueEngine<FailingDrive, std::fs::File, FileStateStore>> {
    let source = FailingDrive::open(&ws.source, ws.block_size, bad)?;
    let destination = ws.open_destination()?;
    let store = FileStateStore::open(&ws.state)?;

    let mut settings = ScanSettings::new(BlockRange::new(0, ws.blocks)?);
    tweak(&mut settings);

    Ok(RescueEngine::new(
        BlockCopier::new(source, destination, ws.block_size),
        store,
        settings,
    ))
}

#[test]
fn test_healthy_source_is_copied_exactly() -> Result<()> {
    let ws = RescueWorkspace::new(64, BLOCK_SIZE)?;

    let mut engine = open_engine(&ws, [], |_| {})?;
    let outcome = engine.run()?;

    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.counters, Counters { ok: 64, bad: 0 });
    drop(engine);

    assert_eq!(std::fs::read(&ws.source)?, std::fs::read(&ws.destination)?);
    assert_eq!(ws.state_bytes()?, vec![1; 64]);

    Ok(())
}

#[test]
fn test_failures_are_persisted_and_counted_across_runs() -> Result<()> {
    let ws = RescueWorkspace::new(8, BLOCK_SIZE)?;

    for _ in 0..2 {
        let mut engine = open_engine(&ws, [3, 4, 5], |s| s.retry_count = 2)?;
        engine.run()?;
    }

    // Same picture as the classic two-pass example
    assert_eq!(ws.state_bytes()?, vec![1, 1, 1, -2, -2, -2, 1, 1]);
    assert_eq!(ws.rescued_blocks()?, vec![0, 1, 2, 6, 7]);

    Ok(())
}

#[test]
fn test_resume_only_touches_unrescued_blocks() -> Result<()> {
    let ws = RescueWorkspace::new(16, BLOCK_SIZE)?;

    let mut first = open_engine(&ws, [5, 9], |_| {})?;
    first.run()?;
    drop(first);
    assert_eq!(ws.state_bytes()?[5], -1);
    assert_eq!(ws.state_bytes()?[9], -1);

    // The drive "recovers"; the second run must read only the two gaps
    let mut second = open_engine(&ws, [], |_| {})?;
    let outcome = second.run()?;
    assert_eq!(outcome.counters, Counters { ok: 2, bad: 0 });

    let (copier, _) = second.into_parts();
    let (drive, _) = copier.into_inner();
    let mut touched = drive.reads.clone();
    touched.dedup();
    assert_eq!(touched, vec![5, 9]);

    assert_eq!(ws.state_bytes()?, vec![1; 16]);
    assert_eq!(std::fs::read(&ws.source)?, std::fs::read(&ws.destination)?);

    Ok(())
}

#[test]
fn test_interrupted_run_resumes_where_it_left_off() -> Result<()> {
    let ws = RescueWorkspace::new(10, BLOCK_SIZE)?;

    let mut engine = open_engine(&ws, [], |_| {})?;
    engine.cancel_handle().store(true, Ordering::SeqCst);
    let outcome = engine.run()?;
    drop(engine);

    assert_eq!(outcome.stop, StopReason::Interrupted);
    assert_eq!(ws.state_bytes()?, vec![0; 10]);

    let mut resumed = open_engine(&ws, [], |_| {})?;
    let outcome = resumed.run()?;

    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.counters.ok, 10);

    Ok(())
}

#[test]
fn test_abort_then_skip_pass_then_full_pass() -> Result<()> {
    let ws = RescueWorkspace::new(32, BLOCK_SIZE)?;
    let bad: Vec<u64> = (10..20).collect();

    let mut aborting = open_engine(&ws, bad.clone(), |s| s.abort_on_error = true)?;
    let outcome = aborting.run()?;
    drop(aborting);
    assert_eq!(outcome.stop, StopReason::Aborted { block: 10 });
    assert_eq!(ws.rescued_blocks()?, (0..10).collect::<Vec<_>>());

    // Skipping over the bad stretch still reaches the tail
    let mut skipping = open_engine(&ws, bad.clone(), |s| s.skip = true)?;
    skipping.run()?;
    drop(skipping);
    let rescued = ws.rescued_blocks()?;
    assert!(rescued.contains(&31));
    assert!(!rescued.contains(&15));

    // A plain pass finally visits every remaining block
    let mut full = open_engine(&ws, bad, |_| {})?;
    full.run()?;
    drop(full);
    let state = ws.state_bytes()?;
    assert!((0..10).chain(20..32).all(|b| state[b] == 1));
    assert!((10..20).all(|b| state[b] < 0));

    Ok(())
}

#[test]
fn test_jump_scan_eventually_covers_healthy_source() -> Result<()> {
    let ws = RescueWorkspace::new(40, BLOCK_SIZE)?;

    let mut engine = open_engine(&ws, [], |s| {
        s.jump = 8;
        s.max_jumps = Some(500);
    })?
    .with_seed(99);
    let outcome = engine.run()?;
    drop(engine);

    assert_eq!(outcome.stop, StopReason::JumpLimitReached);
    assert_eq!(outcome.counters.ok, 40);
    assert_eq!(std::fs::read(&ws.source)?, std::fs::read(&ws.destination)?);

    Ok(())
}

#[test]
fn test_state_summary_after_mixed_run() -> Result<()> {
    let ws = RescueWorkspace::new(20, BLOCK_SIZE)?;
    let range = BlockRange::new(0, 20)?;

    let mut engine = open_engine(&ws, [2, 3], |s| {
        s.range = BlockRange::new(0, 10).unwrap();
    })?;
    engine.run()?;

    let summary = engine.store_mut().summarize(range)?;
    assert_eq!(summary.good, 8);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.untried, 10);
    assert_eq!(summary.worst_failures, 1);

    Ok(())
}

#[test]
fn test_bad_block_log_records_each_failed_attempt() -> Result<()> {
    let ws = RescueWorkspace::new(6, BLOCK_SIZE)?;
    let log_path = ws.dir.path().join("bad_blocks.log");

    let mut engine = open_engine(&ws, [1, 4], |_| {})?
        .with_bad_block_log(BadBlockLog::open(ws.source.display().to_string(), &log_path)?);
    engine.run()?;

    let content = std::fs::read_to_string(&log_path)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("Block: 1"));
    assert!(lines[0].contains("Offset: 512"));
    assert!(lines[1].contains("Block: 4"));
    assert!(lines[1].contains("simulated medium error at block 4"));

    Ok(())
}
