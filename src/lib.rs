pub mod clamav;
pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod report;

pub use error::{Error, Result};
