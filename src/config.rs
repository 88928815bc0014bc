// src/config.rs

//! Manages daemon configuration: loading the key=value file, resolving
//! defaults, and validation. The same loader backs the SIGHUP reload
//! path, so parsing is strict about types but tolerant of unknown keys.

use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tracing::debug;

/// How the daemon reacts when the primary becomes unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FailoverMode {
    /// Keep retrying to find a primary; never promote on our own.
    #[default]
    Manual,
    /// Run the election and promote or re-follow automatically.
    Automatic,
}

/// Log verbosity names accepted in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Err,
    Alert,
    Crit,
    Emerg,
}

impl LogLevel {
    /// The tracing filter directive this level maps onto.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info | LogLevel::Notice => "info",
            LogLevel::Warning => "warn",
            LogLevel::Err | LogLevel::Alert | LogLevel::Crit | LogLevel::Emerg => "error",
        }
    }
}

/// Log destinations accepted in the configuration file. Syslog
/// facilities are validated for compatibility; output itself goes to
/// stderr or to `logfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogFacility {
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
    User,
    #[default]
    Stderr,
}

impl LogFacility {
    /// Whether stderr stays attached after daemonization.
    pub fn keeps_stderr(&self) -> bool {
        matches!(self, LogFacility::Stderr)
    }
}

/// The daemon configuration, one instance per managed node.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cluster: String,
    pub node: i32,
    pub node_name: String,
    pub conninfo: String,
    pub failover: FailoverMode,
    pub priority: i32,
    pub master_response_timeout: u64,
    pub reconnect_attempts: u32,
    pub reconnect_interval: u64,
    pub monitor_interval_secs: u64,
    pub retry_promote_interval_secs: u64,
    pub promote_command: Option<String>,
    pub follow_command: Option<String>,
    pub loglevel: LogLevel,
    pub logfacility: LogFacility,
    pub logfile: Option<PathBuf>,
}

fn default_master_response_timeout() -> u64 {
    60
}
fn default_reconnect_attempts() -> u32 {
    6
}
fn default_reconnect_interval() -> u64 {
    10
}
fn default_monitor_interval_secs() -> u64 {
    2
}
fn default_retry_promote_interval_secs() -> u64 {
    300 // 5 minutes
}

impl Config {
    /// Loads and validates the configuration from a key=value file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Parses the key=value body. Unknown keys are ignored, blank lines
    /// and `#` comments skipped; missing required keys fail validation.
    pub fn parse(content: &str) -> Result<Self> {
        let mut cluster: Option<String> = None;
        let mut node: Option<i32> = None;
        let mut node_name: Option<String> = None;
        let mut conninfo: Option<String> = None;
        let mut failover = FailoverMode::default();
        let mut priority: i32 = 0;
        let mut master_response_timeout = default_master_response_timeout();
        let mut reconnect_attempts = default_reconnect_attempts();
        let mut reconnect_interval = default_reconnect_interval();
        let mut monitor_interval_secs = default_monitor_interval_secs();
        let mut retry_promote_interval_secs = default_retry_promote_interval_secs();
        let mut promote_command: Option<String> = None;
        let mut follow_command: Option<String> = None;
        let mut loglevel = LogLevel::default();
        let mut logfacility = LogFacility::default();
        let mut logfile: Option<PathBuf> = None;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("line {}: expected key=value, got '{}'", lineno + 1, line);
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "cluster" => cluster = Some(value.to_string()),
                "node" => node = Some(parse_typed(key, value, lineno)?),
                "node_name" => node_name = Some(value.to_string()),
                "conninfo" => conninfo = Some(value.to_string()),
                "failover" => failover = parse_typed(key, value, lineno)?,
                "priority" => priority = parse_typed(key, value, lineno)?,
                "master_response_timeout" => {
                    master_response_timeout = parse_typed(key, value, lineno)?
                }
                "reconnect_attempts" => reconnect_attempts = parse_typed(key, value, lineno)?,
                "reconnect_interval" => reconnect_interval = parse_typed(key, value, lineno)?,
                "monitor_interval_secs" => monitor_interval_secs = parse_typed(key, value, lineno)?,
                "retry_promote_interval_secs" => {
                    retry_promote_interval_secs = parse_typed(key, value, lineno)?
                }
                "promote_command" => promote_command = Some(value.to_string()),
                "follow_command" => follow_command = Some(value.to_string()),
                "loglevel" => loglevel = parse_typed(key, value, lineno)?,
                "logfacility" => logfacility = parse_typed(key, value, lineno)?,
                "logfile" => logfile = Some(PathBuf::from(value)),
                _ => debug!("ignoring unknown configuration key '{key}'"),
            }
        }

        let cluster = cluster.ok_or_else(|| anyhow!("required key 'cluster' is missing"))?;
        let node = node.ok_or_else(|| anyhow!("required key 'node' is missing"))?;
        let conninfo = conninfo.ok_or_else(|| anyhow!("required key 'conninfo' is missing"))?;
        if cluster.is_empty() {
            bail!("'cluster' must not be empty");
        }
        if priority < 0 {
            bail!("'priority' must be non-negative, got {priority}");
        }
        let node_name = node_name.unwrap_or_else(|| format!("node{node}"));

        Ok(Config {
            cluster,
            node,
            node_name,
            conninfo,
            failover,
            priority,
            master_response_timeout,
            reconnect_attempts,
            reconnect_interval,
            monitor_interval_secs,
            retry_promote_interval_secs,
            promote_command,
            follow_command,
            loglevel,
            logfacility,
            logfile,
        })
    }

    pub fn master_response_timeout(&self) -> Duration {
        Duration::from_secs(self.master_response_timeout)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn retry_promote_interval(&self) -> Duration {
        Duration::from_secs(self.retry_promote_interval_secs)
    }
}

fn parse_typed<T>(key: &str, value: &str, lineno: usize) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow!("line {}: invalid value '{}' for '{}': {}", lineno + 1, value, key, e))
}
