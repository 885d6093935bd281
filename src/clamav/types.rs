use std::fmt;

/// Commands understood by the clamd socket. Each is sent in the
/// newline-delimited form, after which clamd closes the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Stats,
    Version,
}

impl Command {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Command::Ping => b"nPING\n",
            Command::Stats => b"nSTATS\n",
            Command::Version => b"nVERSION\n",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Ping => "PING",
            Command::Stats => "STATS",
            Command::Version => "VERSION",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadStats {
    pub live: f64,
    pub idle: f64,
    pub max: f64,
}

/// Memory figures in bytes. `N/A` in the daemon output becomes NaN, a label
/// missing from the MEMSTATS line stays `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStats {
    pub heap: Option<f64>,
    pub mmap: Option<f64>,
    pub used: Option<f64>,
    pub free: Option<f64>,
    pub releasable: Option<f64>,
    pub pools_used: Option<f64>,
    pub pools_total: Option<f64>,
}

/// Groups pulled from a STATS response. A group is `None` when its pattern
/// was not found in the text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsGroups {
    pub memory: Option<MemoryStats>,
    pub threads: Option<ThreadStats>,
    pub queue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub clamav: String,
    pub database: String,
    /// Seconds since the signature database was built. Negative when the
    /// daemon clock is ahead of ours.
    pub database_age_seconds: Option<f64>,
}

/// Everything learned from the daemon during one scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonSnapshot {
    pub up: bool,
    pub stats: StatsGroups,
    pub version: Option<VersionInfo>,
}
