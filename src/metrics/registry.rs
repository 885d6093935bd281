use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::clamav::DaemonSnapshot;
use crate::error::{Error, Result};
use crate::report::ReportState;

/// Renders one scrape worth of values in the Prometheus text format. A fresh
/// registry is built per call so absent groups simply produce no samples.
pub fn render(daemon: &DaemonSnapshot, report: &ReportState) -> Result<String> {
    let registry = Registry::new();
    register_daemon(&registry, daemon)?;
    register_report(&registry, report)?;
    encode(&registry)
}

pub fn encode(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::Parse(format!("Invalid UTF-8 in metrics: {}", e)))
}

fn gauge(registry: &Registry, name: &str, help: &str, value: f64) -> Result<()> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    gauge.set(value);
    registry.register(Box::new(gauge))?;
    Ok(())
}

fn optional_gauge(registry: &Registry, name: &str, help: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(value) => gauge(registry, name, help, value),
        None => Ok(()),
    }
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let vec = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn register_daemon(registry: &Registry, daemon: &DaemonSnapshot) -> Result<()> {
    gauge(
        registry,
        "clamav_up",
        "Shows UP Status",
        if daemon.up { 1.0 } else { 0.0 },
    )?;

    if let Some(threads) = &daemon.stats.threads {
        gauge(registry, "clamav_threads_live", "Shows live threads", threads.live)?;
        gauge(registry, "clamav_threads_idle", "Shows idle threads", threads.idle)?;
        gauge(registry, "clamav_threads_max", "Shows max threads", threads.max)?;
    }

    optional_gauge(
        registry,
        "clamav_queue_length",
        "Shows queued items",
        daemon.stats.queue,
    )?;

    if let Some(memory) = &daemon.stats.memory {
        let fields = [
            ("clamav_mem_heap_bytes", "Shows heap memory usage in bytes", memory.heap),
            ("clamav_mem_mmap_bytes", "Shows mmap memory usage in bytes", memory.mmap),
            ("clamav_mem_used_bytes", "Shows used memory in bytes", memory.used),
            ("clamav_mem_free_bytes", "Shows free memory in bytes", memory.free),
            (
                "clamav_mem_releasable_bytes",
                "Shows releasable memory in bytes",
                memory.releasable,
            ),
            (
                "clamav_pools_used_bytes",
                "Shows memory used by memory pool allocator for the signature database in bytes",
                memory.pools_used,
            ),
            (
                "clamav_pools_total_bytes",
                "Shows total memory allocated by memory pool allocator for the signature database in bytes",
                memory.pools_total,
            ),
        ];
        for (name, help, value) in fields {
            optional_gauge(registry, name, help, value)?;
        }
    }

    if let Some(version) = &daemon.version {
        gauge_vec(
            registry,
            "clamav_build_info",
            "Shows ClamAV Build Info",
            &["clamav_version", "database_version"],
        )?
        .get_metric_with_label_values(&[version.clamav.as_str(), version.database.as_str()])?
        .set(1.0);
        optional_gauge(
            registry,
            "clamav_database_age",
            "Shows ClamAV signature database age in seconds",
            version.database_age_seconds,
        )?;
    }

    Ok(())
}

fn register_report(registry: &Registry, report: &ReportState) -> Result<()> {
    let available = report.is_available();
    gauge_vec(
        registry,
        "clamscan_report_file",
        "Shows if report file is found",
        &["file_path"],
    )?
    .get_metric_with_label_values(&[report.file_path.as_str()])?
    .set(if available { 1.0 } else { 0.0 });

    if !available {
        return Ok(());
    }

    let lines = gauge_vec(
        registry,
        "clamscan_report_file_count_line",
        "Shows how many lines have been read from the report file",
        &["category"],
    )?;
    for (category, count) in [
        ("total", report.lines_read),
        ("parsed", report.lines_parsed),
        ("ignored", report.lines_ignored),
        ("unknown", report.lines_unknown),
    ] {
        lines
            .get_metric_with_label_values(&[category])?
            .set(count as f64);
    }
    gauge(
        registry,
        "clamscan_last_scan_start_timestamp_seconds",
        "Shows the start time of the last scan as a unix timestamp",
        report.scan_start_time.timestamp() as f64,
    )?;
    gauge(
        registry,
        "clamscan_last_scan_end_timestamp_seconds",
        "Shows the end time of the last scan as a unix timestamp",
        report.scan_end_time.timestamp() as f64,
    )?;
    gauge(
        registry,
        "clamscan_last_scan_duration_seconds",
        "Shows the duration of the last scan in seconds",
        report.scan_duration.as_secs_f64(),
    )?;
    gauge(
        registry,
        "clamscan_last_scan_status",
        "Shows if the last scan reported the host filesystem as OK",
        if report.report_status { 1.0 } else { 0.0 },
    )?;
    gauge(
        registry,
        "clamscan_last_scan_infected_files",
        "Shows the number of infected files found by the last scan",
        report.infected_files as f64,
    )?;
    gauge(
        registry,
        "clamscan_last_scan_errors",
        "Shows the number of errors reported by the last scan",
        report.total_errors as f64,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clamav::{MemoryStats, StatsGroups, ThreadStats, VersionInfo};
    use crate::report::classify;
    use chrono::{TimeZone, Utc};

    fn full_snapshot() -> DaemonSnapshot {
        DaemonSnapshot {
            up: true,
            stats: StatsGroups {
                memory: Some(MemoryStats {
                    heap: Some(f64::NAN),
                    mmap: Some(2048.0),
                    used: Some(4096.0),
                    free: None,
                    releasable: None,
                    pools_used: Some(1024.0),
                    pools_total: Some(3072.0),
                }),
                threads: Some(ThreadStats {
                    live: 1.0,
                    idle: 0.0,
                    max: 10.0,
                }),
                queue: Some(0.0),
            },
            version: Some(VersionInfo {
                clamav: "1.4.1".to_string(),
                database: "27523".to_string(),
                database_age_seconds: Some(86400.0),
            }),
        }
    }

    #[test]
    fn test_render_daemon_metrics() {
        let output = render(&full_snapshot(), &ReportState::new("")).unwrap();

        assert!(output.contains("clamav_up 1\n"));
        assert!(output.contains("clamav_threads_live 1\n"));
        assert!(output.contains("clamav_threads_idle 0\n"));
        assert!(output.contains("clamav_threads_max 10\n"));
        assert!(output.contains("clamav_queue_length 0\n"));
        assert!(output.contains("clamav_mem_heap_bytes NaN\n"));
        assert!(output.contains("clamav_mem_mmap_bytes 2048\n"));
        assert!(output.contains("clamav_pools_total_bytes 3072\n"));
        assert!(!output.contains("clamav_mem_free_bytes"));
        assert!(output.contains(
            "clamav_build_info{clamav_version=\"1.4.1\",database_version=\"27523\"} 1\n"
        ));
        assert!(output.contains("clamav_database_age 86400\n"));
    }

    #[test]
    fn test_render_down_daemon_only_reports_up() {
        let output = render(&DaemonSnapshot::default(), &ReportState::new("")).unwrap();

        assert!(output.contains("clamav_up 0\n"));
        assert!(!output.contains("clamav_threads_live"));
        assert!(!output.contains("clamav_queue_length"));
        assert!(!output.contains("clamav_mem_"));
        assert!(!output.contains("clamav_build_info"));
    }

    #[test]
    fn test_render_without_report_path() {
        let output = render(&DaemonSnapshot::default(), &ReportState::new("")).unwrap();

        assert!(output.contains("clamscan_report_file{file_path=\"\"} 0\n"));
        assert!(!output.contains("clamscan_report_file_count_line"));
        assert!(!output.contains("clamscan_last_scan_status"));
    }

    #[test]
    fn test_render_report_with_file_error() {
        let mut report = ReportState::new("/var/log/clamscan.log");
        report.last_file_error = Some("No such file or directory".to_string());

        let output = render(&DaemonSnapshot::default(), &report).unwrap();
        assert!(output.contains("clamscan_report_file{file_path=\"/var/log/clamscan.log\"} 0\n"));
        assert!(!output.contains("clamscan_last_scan_errors"));
    }

    #[test]
    fn test_render_report_metrics() {
        let mut report = ReportState::new("/var/log/clamscan.log");
        for line in [
            "--------------------------------------",
            "/host-fs: OK",
            "Infected files: 1",
            "Total errors: 2",
            "Time: 3609.617 sec (60 m 9 s)",
            "Start Date: 2025:03:27 16:14:48",
            "End Date:   2025:03:27 17:14:58",
            "Engine version: 1.4.1",
        ] {
            report.apply(&classify(line));
        }

        let output = render(&DaemonSnapshot::default(), &report).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 27, 16, 14, 48).unwrap();

        assert!(output.contains("clamscan_report_file{file_path=\"/var/log/clamscan.log\"} 1\n"));
        assert!(output.contains("clamscan_report_file_count_line{category=\"total\"} 8\n"));
        assert!(output.contains("clamscan_report_file_count_line{category=\"parsed\"} 6\n"));
        assert!(output.contains("clamscan_report_file_count_line{category=\"ignored\"} 1\n"));
        assert!(output.contains("clamscan_report_file_count_line{category=\"unknown\"} 1\n"));
        assert!(output.contains(&format!(
            "clamscan_last_scan_start_timestamp_seconds {}\n",
            start.timestamp()
        )));
        assert!(output.contains("clamscan_last_scan_duration_seconds 3609.617\n"));
        assert!(output.contains("clamscan_last_scan_status 1\n"));
        assert!(output.contains("clamscan_last_scan_infected_files 1\n"));
        assert!(output.contains("clamscan_last_scan_errors 2\n"));
    }

    #[test]
    fn test_render_is_repeatable() {
        let snapshot = full_snapshot();
        let report = ReportState::new("");
        assert!(render(&snapshot, &report).is_ok());
        assert!(render(&snapshot, &report).is_ok());
    }
}
