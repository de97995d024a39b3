use std::path::PathBuf;

use chrono_tz::Tz;

/// Process settings, read from `COVERS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub timezone: Tz,
    pub capacity_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let timezone = match lookup("COVERS_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| format!("COVERS_TIMEZONE: {e}"))?,
            None => Tz::UTC,
        };
        Ok(Self {
            bind: lookup("COVERS_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("COVERS_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(7878),
            data_dir: PathBuf::from(lookup("COVERS_DATA_DIR").unwrap_or_else(|| "./data".into())),
            max_connections: lookup("COVERS_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            compact_threshold: lookup("COVERS_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            metrics_port: lookup("COVERS_METRICS_PORT").and_then(|s| s.parse().ok()),
            timezone,
            capacity_file: lookup("COVERS_CAPACITY_FILE").map(PathBuf::from),
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.journal")
    }
}
