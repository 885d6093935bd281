use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::classifier::{classify, LineOutcome};
use super::state::ScanReport;
use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Follows a clamscan report file and feeds every complete line into the
/// shared [`ScanReport`]. A new scan rewriting the file from offset zero is
/// picked up by seeking back to the start.
pub struct ReportTailer {
    path: PathBuf,
    report: ScanReport,
    poll_interval: Duration,
    span: Span,
}

impl ReportTailer {
    pub fn new(path: impl Into<PathBuf>, report: ScanReport) -> Self {
        let path = path.into();
        let span = info_span!("report_tailer", path = %path.display());
        Self {
            path,
            report,
            poll_interval: DEFAULT_POLL_INTERVAL,
            span,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs until the file fails to open or a read fails. Neither case is
    /// retried; the error is left on the report state.
    pub async fn run(self) {
        let span = self.span.clone();
        async move {
            if let Err(e) = self.tail().await {
                error!("Stopped tailing report file: {}", e);
                self.report.record_file_error(&e).await;
            }
        }
        .instrument(span)
        .await
    }

    async fn tail(&self) -> Result<()> {
        debug!("Begin to read file: {:?}", self.path);

        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        let mut cursor: u64 = 0;
        // Bytes of a line whose terminator has not been written yet.
        let mut pending = Vec::new();

        loop {
            let read = reader.read_until(b'\n', &mut pending).await?;
            cursor += read as u64;

            if pending.last() == Some(&b'\n') {
                let line = decode_line(&pending);
                pending.clear();
                self.handle_line(&line).await;
                continue;
            }

            // End of input, with or without a partial line.
            let size = reader.get_ref().metadata().await?.len();
            if cursor > size {
                info!(
                    "Report file truncated ({} bytes, read {}), reading from the start",
                    size, cursor
                );
                reader.seek(SeekFrom::Start(0)).await?;
                cursor = 0;
                pending.clear();
                continue;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn handle_line(&self, line: &str) {
        debug!("New line read: {}", line);

        let outcome = classify(line);
        match &outcome {
            LineOutcome::Parsed(Err(e)) => warn!("Error parsing report line {:?}: {}", line, e),
            LineOutcome::Unknown => warn!("Unknown line: {}", line),
            _ => {}
        }

        self.report.apply(&outcome).await;
    }
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
