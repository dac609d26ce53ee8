pub mod progress;


pub use progress::{NullProgress, ProgressReporter, StatusLine};
