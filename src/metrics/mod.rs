pub mod registry;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clamav::{Command, DaemonClient, DaemonSnapshot, StatsExtractor, StatsGroups};
use crate::error::Result;
use crate::report::ScanReport;

pub use registry::render;

const PONG: &[u8] = b"PONG\n";

/// Gathers both metric trees on demand. Daemon values are fetched fresh on
/// every call; report values come from the tailer's shared state.
pub struct MetricsCollector {
    client: Arc<dyn DaemonClient>,
    extractor: Arc<dyn StatsExtractor>,
    report: ScanReport,
}

impl MetricsCollector {
    pub fn new(
        client: Arc<dyn DaemonClient>,
        extractor: Arc<dyn StatsExtractor>,
        report: ScanReport,
    ) -> Self {
        Self {
            client,
            extractor,
            report,
        }
    }

    pub async fn daemon_snapshot(&self) -> DaemonSnapshot {
        let up = match self.client.send(Command::Ping).await {
            Ok(response) => response == PONG,
            // Unreachable daemon: skip the remaining queries for this scrape.
            Err(_) => return DaemonSnapshot::default(),
        };
        if !up {
            warn!("ClamAV did not answer PING with PONG");
        }

        let stats = match self.client.send(Command::Stats).await {
            Ok(raw) => self.extractor.stats(&String::from_utf8_lossy(&raw)),
            Err(_) => StatsGroups::default(),
        };

        let version = match self.client.send(Command::Version).await {
            Ok(raw) => {
                let version = self
                    .extractor
                    .version(&String::from_utf8_lossy(&raw), Utc::now());
                if version.is_none() {
                    warn!("Unrecognised ClamAV version response");
                }
                version
            }
            Err(_) => None,
        };

        DaemonSnapshot { up, stats, version }
    }

    /// Produces the text exposition for one scrape.
    pub async fn gather(&self) -> Result<String> {
        let daemon = self.daemon_snapshot().await;
        let report = self.report.snapshot().await;
        debug!(
            "Scrape: clamav up={}, report lines={}",
            daemon.up, report.lines_read
        );
        render(&daemon, &report)
    }
}
