#![allow(dead_code)]

/// Common test utilities for integration tests
///
/// - A file-backed source image with injectable bad blocks
/// - Helpers to lay out a rescue workspace in a temp directory
pub mod failing_drive;
pub mod test_helpers;
