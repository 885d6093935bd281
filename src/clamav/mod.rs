pub mod client;
pub mod extractor;
pub mod types;

pub use client::{ClamAVClientImpl, ClamAVConnection, DaemonClient};
pub use extractor::{ClamdExtractor, StatsExtractor};
pub use types::{
    Command, DaemonSnapshot, MemoryStats, StatsGroups, ThreadStats, VersionInfo,
};
