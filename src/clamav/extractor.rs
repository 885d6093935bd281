use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, error};

use super::types::{MemoryStats, StatsGroups, ThreadStats, VersionInfo};
use crate::error::Result;

/// Build date format of the VERSION reply, e.g. `Sun Jan 19 09:40:50 2025`.
pub const DATABASE_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Turns raw clamd replies into typed fields.
pub trait StatsExtractor: Send + Sync {
    fn stats(&self, raw: &str) -> StatsGroups;

    /// `now` is the reference point for the database age.
    fn version(&self, raw: &str, now: DateTime<Utc>) -> Option<VersionInfo>;
}

pub struct ClamdExtractor {
    memstats_line: Regex,
    memory_field: Regex,
    threads: Regex,
    queue: Regex,
    version: Regex,
}

impl ClamdExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            memstats_line: Regex::new(r"MEMSTATS:([^\r\n]*)")?,
            memory_field: Regex::new(
                r"\b(heap|mmap|used|free|releasable|pools_used|pools_total)\s+([0-9.]+|N/A)",
            )?,
            threads: Regex::new(
                r"THREADS:\s*live\s+([0-9.]+|N/A)\s+idle\s+([0-9.]+|N/A)\s+max\s+([0-9.]+|N/A)",
            )?,
            queue: Regex::new(r"(?:QUEUE:|FILDES|STATS)\s+([0-9.]+|N/A)")?,
            version: Regex::new(r"(\S+)\s+([0-9][\w.\-]*)/(\d+)(?:/([^\r\n]+))?")?,
        })
    }

    fn memory(&self, raw: &str) -> Option<MemoryStats> {
        let line = self.memstats_line.captures(raw)?;
        let mut memory = MemoryStats::default();

        for caps in self.memory_field.captures_iter(&line[1]) {
            // clamd reports kilobytes
            let bytes = Some(number(&caps[2]) * 1024.0);
            match &caps[1] {
                "heap" => memory.heap = bytes,
                "mmap" => memory.mmap = bytes,
                "used" => memory.used = bytes,
                "free" => memory.free = bytes,
                "releasable" => memory.releasable = bytes,
                "pools_used" => memory.pools_used = bytes,
                "pools_total" => memory.pools_total = bytes,
                _ => {}
            }
        }

        debug!("Memory stats: {:?}", memory);
        Some(memory)
    }

    fn threads(&self, raw: &str) -> Option<ThreadStats> {
        let caps = self.threads.captures(raw)?;
        let threads = ThreadStats {
            live: number(&caps[1]),
            idle: number(&caps[2]),
            max: number(&caps[3]),
        };
        debug!("Thread stats: {:?}", threads);
        Some(threads)
    }

    fn queue(&self, raw: &str) -> Option<f64> {
        let caps = self.queue.captures(raw)?;
        let queue = number(&caps[1]);
        debug!("Queue length: {}", queue);
        Some(queue)
    }
}

impl StatsExtractor for ClamdExtractor {
    fn stats(&self, raw: &str) -> StatsGroups {
        StatsGroups {
            memory: self.memory(raw),
            threads: self.threads(raw),
            queue: self.queue(raw),
        }
    }

    fn version(&self, raw: &str, now: DateTime<Utc>) -> Option<VersionInfo> {
        // Example: ClamAV 1.4.1/27523/Sun Jan 19 09:40:50 2025
        let caps = self.version.captures(raw)?;
        debug!("Version matches: {:?}", caps);

        let database_age_seconds = match caps.get(4) {
            Some(date) => match parse_database_date(date.as_str()) {
                Some(built) => Some(age_seconds(now, built)),
                None => {
                    error!("Error parsing ClamAV database date: {:?}", date.as_str());
                    None
                }
            },
            // No build date in the reply: treat the database as brand new.
            None => Some(0.0),
        };

        Some(VersionInfo {
            clamav: caps[2].to_string(),
            database: caps[3].to_string(),
            database_age_seconds,
        })
    }
}

/// Decimal token or `N/A`; anything unparseable is NaN rather than zero.
fn number(token: &str) -> f64 {
    token.parse().unwrap_or(f64::NAN)
}

fn parse_database_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), DATABASE_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn age_seconds(now: DateTime<Utc>, built: DateTime<Utc>) -> f64 {
    now.signed_duration_since(built).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FULL_STATS: &str = "POOLS: 1\n\nSTATE: VALID PRIMARY\nTHREADS: live 1  idle 0 max 10 idle-timeout 30\nQUEUE: 0 items\n\tSTATS 0.000088 \n\nMEMSTATS: heap N/A mmap N/A used N/A free N/A releasable N/A pools 1 pools_used 1306.837M pools_total 1306.882M\nEND\n";

    fn extractor() -> ClamdExtractor {
        ClamdExtractor::new().unwrap()
    }

    #[test]
    fn test_full_stats_response() {
        let stats = extractor().stats(FULL_STATS);

        let threads = stats.threads.unwrap();
        assert_eq!(threads.live, 1.0);
        assert_eq!(threads.idle, 0.0);
        assert_eq!(threads.max, 10.0);

        assert_eq!(stats.queue, Some(0.0));

        let memory = stats.memory.unwrap();
        assert!(memory.heap.unwrap().is_nan());
        assert!(memory.mmap.unwrap().is_nan());
        assert!(memory.used.unwrap().is_nan());
        assert!(memory.free.unwrap().is_nan());
        assert!(memory.releasable.unwrap().is_nan());
        assert!((memory.pools_used.unwrap() - 1306.837 * 1024.0).abs() < 1e-6);
        assert!((memory.pools_total.unwrap() - 1306.882 * 1024.0).abs() < 1e-6);
    }

    #[test]
    fn test_memory_values_are_scaled_to_bytes() {
        let raw = "MEMSTATS: heap 2.5 mmap 0.000 used 1 free 3 releasable 0.5 pools 1 pools_used 10 pools_total 20\n";
        let memory = extractor().stats(raw).memory.unwrap();

        assert_eq!(memory.heap, Some(2560.0));
        assert_eq!(memory.mmap, Some(0.0));
        assert_eq!(memory.used, Some(1024.0));
        assert_eq!(memory.free, Some(3072.0));
        assert_eq!(memory.releasable, Some(512.0));
        assert_eq!(memory.pools_used, Some(10240.0));
        assert_eq!(memory.pools_total, Some(20480.0));
    }

    #[test]
    fn test_missing_memory_label_stays_unset() {
        let raw = "MEMSTATS: heap 1.0M mmap 2.0M used 3.0M\n";
        let memory = extractor().stats(raw).memory.unwrap();

        assert_eq!(memory.heap, Some(1024.0));
        assert_eq!(memory.free, None);
        assert_eq!(memory.pools_used, None);
        assert_eq!(memory.pools_total, None);
    }

    #[test]
    fn test_stats_without_memstats_omits_memory_group() {
        let raw = "POOLS: 1\nSTATE: VALID PRIMARY\nTHREADS: live 3  idle 2 max 12 idle-timeout 30\nQUEUE: 4 items\nEND\n";
        let stats = extractor().stats(raw);

        assert!(stats.memory.is_none());
        assert_eq!(
            stats.threads,
            Some(ThreadStats {
                live: 3.0,
                idle: 2.0,
                max: 12.0
            })
        );
        assert_eq!(stats.queue, Some(4.0));
    }

    #[test]
    fn test_queue_falls_back_to_alternate_labels() {
        let stats = extractor().stats("FILDES 7\n");
        assert_eq!(stats.queue, Some(7.0));

        let stats = extractor().stats("\tSTATS 0.000088\n");
        assert_eq!(stats.queue, Some(0.000088));

        let stats = extractor().stats("QUEUE: N/A\n");
        assert!(stats.queue.unwrap().is_nan());
    }

    #[test]
    fn test_empty_response_has_no_groups() {
        assert_eq!(extractor().stats(""), StatsGroups::default());
        assert_eq!(extractor().stats("garbage\n"), StatsGroups::default());
    }

    #[test]
    fn test_malformed_threads_are_omitted() {
        let stats = extractor().stats("THREADS: live invalid idle 2 max 5\n");
        assert!(stats.threads.is_none());
    }

    #[test]
    fn test_version_with_build_date() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 9, 40, 50).unwrap();
        let version = extractor()
            .version("ClamAV 1.4.1/27523/Sun Jan 19 09:40:50 2025\n", now)
            .unwrap();

        assert_eq!(version.clamav, "1.4.1");
        assert_eq!(version.database, "27523");
        assert_eq!(version.database_age_seconds, Some(86_400.0));
    }

    #[test]
    fn test_version_age_against_wall_clock() {
        let now = Utc::now();
        let version = extractor()
            .version("ClamAV 1.4.1/27523/Sun Jan 19 09:40:50 2025", now)
            .unwrap();

        let built = Utc.with_ymd_and_hms(2025, 1, 19, 9, 40, 50).unwrap();
        let expected = (Utc::now() - built).num_seconds() as f64;
        assert!((version.database_age_seconds.unwrap() - expected).abs() < 5.0);
    }

    #[test]
    fn test_version_with_single_digit_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 8, 20, 48).unwrap();
        let version = extractor()
            .version("ClamAV 0.103.8/26827/Tue Mar  5 08:20:48 2024", now)
            .unwrap();

        assert_eq!(version.database_age_seconds, Some(0.0));
    }

    #[test]
    fn test_version_without_build_date_has_zero_age() {
        let version = extractor()
            .version("ClamAV 1.0.0/27000\n", Utc::now())
            .unwrap();

        assert_eq!(version.clamav, "1.0.0");
        assert_eq!(version.database, "27000");
        assert_eq!(version.database_age_seconds, Some(0.0));
    }

    #[test]
    fn test_version_with_unparseable_date_omits_age() {
        let version = extractor()
            .version("ClamAV 1.4.1/27523/yesterday-ish", Utc::now())
            .unwrap();

        assert_eq!(version.clamav, "1.4.1");
        assert_eq!(version.database_age_seconds, None);
    }

    #[test]
    fn test_future_build_date_gives_negative_age() {
        let now = Utc.with_ymd_and_hms(2025, 1, 19, 9, 40, 40).unwrap();
        let version = extractor()
            .version("ClamAV 1.4.1/27523/Sun Jan 19 09:40:50 2025", now)
            .unwrap();

        assert_eq!(version.database_age_seconds, Some(-10.0));
    }

    #[test]
    fn test_invalid_version_response() {
        assert!(extractor().version("Invalid format", Utc::now()).is_none());
        assert!(extractor().version("", Utc::now()).is_none());
    }
}
