//! Tailing and classification of the clamscan report file.

pub mod classifier;
pub mod state;
pub mod tailer;

pub use classifier::{classify, FieldParseError, FieldUpdate, LineOutcome, ReportField};
pub use state::{ReportState, ScanReport};
pub use tailer::{ReportTailer, DEFAULT_POLL_INTERVAL};
