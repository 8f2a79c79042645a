use crate::muted_error;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend process settings, used by the front end only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GdbConfig {
    /// Path to gdb executable, `gdb` from `PATH` if not set.
    pub path: Option<PathBuf>,
    /// Extra arguments passed to gdb.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of commands written to the backend and waiting for their results.
    pub max_in_flight: usize,
    /// Number of out-of-band records attached to the next command result.
    pub oob_history: usize,
    /// Timeout for blocking waits of the front end.
    pub command_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            oob_history: 20,
            command_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// File for MI traffic trace.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gdb: GdbConfig,
    pub session: SessionConfig,
    pub trace: TraceConfig,
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/mictl/config.toml";

    pub fn from_toml(data: &str) -> crate::error::Result<Self> {
        Ok(toml::de::from_str(data)?)
    }

    /// Load configuration from file. Without explicit path
    /// `~/.config/mictl/config.toml` is used if it exists, defaults otherwise.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        let data = match path {
            Some(path) => read_to_string(path)?,
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Config::default());
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Ok(Config::default()),
                }
            }
        };
        Self::from_toml(&data)
    }
}
