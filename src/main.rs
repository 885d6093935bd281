use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clamreef_exporter::{
    clamav::{self, ClamAVClientImpl, ClamdExtractor, DaemonClient},
    config::{Config, LogFormat},
    error::{Error, Result},
    exporter,
    metrics::MetricsCollector,
    report::{ReportTailer, ScanReport},
};

#[derive(Debug, Default)]
pub struct Args {
    config_path: Option<PathBuf>,
    clamav_address: Option<String>,
    clamav_port: Option<u16>,
    network: Option<String>,
    report_scan_path: Option<String>,
    listen: Option<String>,
    log_level: Option<String>,
    log_format: Option<String>,
    dry_run: bool,
}

pub async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config_path {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    apply_args(&mut config, args)?;
    config.validate()?;
    Ok(config)
}

/// Command-line flags take precedence over the config file.
pub fn apply_args(config: &mut Config, args: &Args) -> Result<()> {
    match args.network.as_deref().map(str::to_lowercase).as_deref() {
        Some("unix") => {
            let path = args.clamav_address.clone().ok_or_else(|| {
                Error::Config("--clamav-address must name the socket for unix network".to_string())
            })?;
            config.clamav.socket_path = Some(path);
        }
        Some("tcp") => {
            config.clamav.socket_path = None;
            if config.clamav.tcp_host.is_none() {
                config.clamav.tcp_host = Some("localhost".to_string());
            }
            if config.clamav.tcp_port.is_none() {
                config.clamav.tcp_port = Some(3310);
            }
            if let Some(host) = &args.clamav_address {
                config.clamav.tcp_host = Some(host.clone());
            }
        }
        Some(other) => {
            return Err(Error::Config(format!("Invalid network mode: {}", other)));
        }
        None => {
            if let Some(address) = &args.clamav_address {
                if config.clamav.socket_path.is_some() {
                    config.clamav.socket_path = Some(address.clone());
                } else {
                    config.clamav.tcp_host = Some(address.clone());
                }
            }
        }
    }

    if let Some(port) = args.clamav_port {
        config.clamav.tcp_port = Some(port);
    }
    if let Some(path) = &args.report_scan_path {
        config.report.path = Some(path.clone());
    }
    if let Some(listen) = &args.listen {
        config.exporter.listen = listen.clone();
    }
    if let Some(level) = &args.log_level {
        config.exporter.log_level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.exporter.log_format = format.parse()?;
    }

    Ok(())
}

pub async fn check_clamav(client: &dyn DaemonClient) {
    match client.send(clamav::Command::Version).await {
        Ok(raw) => info!("ClamAV version: {}", String::from_utf8_lossy(&raw).trim()),
        Err(e) => warn!("ClamAV is not reachable yet: {}", e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Server is shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let config = load_config(&args).await?;

    init_logging(&config.exporter.log_level, config.exporter.log_format)?;

    info!("Starting ClamReef Exporter v{}", env!("CARGO_PKG_VERSION"));

    if args.dry_run {
        info!("Configuration is valid. Dry run complete.");
        return Ok(());
    }

    let client = Arc::new(ClamAVClientImpl::new(config.connection()?).with_timeout(config.timeout()));
    info!("Polling ClamAV at {}", client.connection());
    check_clamav(client.as_ref()).await;

    let report = ScanReport::new(config.report_path());
    if config.report_path().is_empty() {
        info!("No clamscan report configured");
    } else {
        let tailer = ReportTailer::new(config.report_path(), report.clone())
            .with_poll_interval(config.poll_interval());
        info!("Tailing clamscan report {}", tailer.path().display());
        tokio::spawn(tailer.run());
    }

    let collector = Arc::new(MetricsCollector::new(
        client,
        Arc::new(ClamdExtractor::new()?),
        report,
    ));

    exporter::serve(config.listen_addr()?, collector, shutdown_signal()).await
}

fn parse_args() -> Args {
    let matches = Command::new("clamreef-exporter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("ClamReef Exporter - Prometheus metrics for ClamAV and clamscan reports")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .num_args(1),
        )
        .arg(
            Arg::new("clamav-address")
                .long("clamav-address")
                .value_name("ADDRESS")
                .help("ClamAV host, or socket path with --network unix [default: localhost]")
                .num_args(1),
        )
        .arg(
            Arg::new("clamav-port")
                .long("clamav-port")
                .value_name("PORT")
                .help("ClamAV port to use [default: 3310]")
                .value_parser(clap::value_parser!(u16))
                .num_args(1),
        )
        .arg(
            Arg::new("network")
                .long("network")
                .value_name("MODE")
                .help("Network mode to use, tcp or unix (socket) [default: tcp]")
                .value_parser(["tcp", "unix"])
                .num_args(1),
        )
        .arg(
            Arg::new("report-scan-path")
                .long("report-scan-path")
                .value_name("FILE")
                .help("Path to clamscan report file (leave unset if you don't use clamscan)")
                .num_args(1),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Address to serve metrics on [default: 0.0.0.0:9810]")
                .num_args(1),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .num_args(1),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format (text, json)")
                .num_args(1),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    Args {
        config_path: matches.get_one::<String>("config").map(PathBuf::from),
        clamav_address: matches.get_one::<String>("clamav-address").cloned(),
        clamav_port: matches.get_one::<u16>("clamav-port").copied(),
        network: matches.get_one::<String>("network").cloned(),
        report_scan_path: matches.get_one::<String>("report-scan-path").cloned(),
        listen: matches.get_one::<String>("listen").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
        dry_run: matches.get_flag("dry-run"),
    }
}

fn parse_level(log_level: &str) -> Result<Level> {
    match log_level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(Error::Config(format!("Invalid log level: {}", log_level))),
    }
}

fn init_logging(log_level: &str, format: LogFormat) -> Result<()> {
    let level = parse_level(log_level)?;

    let directive = format!("clamreef_exporter={}", level)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;
    let env_filter = EnvFilter::from_default_env().add_directive(directive);

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}
