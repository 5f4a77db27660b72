use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracedbg_proto::BreakConfiguration;

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    Warn,
    Error,
}

/// Where the controller finds its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `host:port`, a bare port, or `unix:/path/to/socket`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How often the console pumps the session, in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_endpoint() -> String {
    "127.0.0.1:5555".to_string()
}

fn default_tick_interval() -> u64 {
    10
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Conditions under which the peer pauses on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreaksConfig {
    #[serde(default = "default_true")]
    pub break_on_error: bool,
    #[serde(default = "default_true")]
    pub break_on_debug_output: bool,
    #[serde(default = "default_true")]
    pub break_on_compiler_error: bool,
    #[serde(default)]
    pub force_debug_context: bool,
    #[serde(default)]
    pub force_debug_context_es: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BreaksConfig {
    fn default() -> Self {
        Self::from(BreakConfiguration::default())
    }
}

impl BreaksConfig {
    /// The wire form pushed to the peer.
    pub fn to_configuration(&self) -> BreakConfiguration {
        BreakConfiguration {
            break_on_error: self.break_on_error,
            break_on_debug_output: self.break_on_debug_output,
            break_on_compiler_error: self.break_on_compiler_error,
            force_debug_context: self.force_debug_context,
            force_debug_context_es: self.force_debug_context_es,
        }
    }
}

impl From<BreakConfiguration> for BreaksConfig {
    fn from(cfg: BreakConfiguration) -> Self {
        Self {
            break_on_error: cfg.break_on_error,
            break_on_debug_output: cfg.break_on_debug_output,
            break_on_compiler_error: cfg.break_on_compiler_error,
            force_debug_context: cfg.force_debug_context,
            force_debug_context_es: cfg.force_debug_context_es,
        }
    }
}

/// Call trace browsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Records fetched per trace page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    100
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Settings for the embedded peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Capacity of the call-history ring.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

fn default_history_len() -> usize {
    1000
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file; stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Entrypoint ids to break on from the first pause.
    #[serde(default)]
    pub breakpoints: Vec<u32>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub breaks: BreaksConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.endpoint, "127.0.0.1:5555");
        assert_eq!(cfg.connection.tick_interval_ms, 10);
        assert!(cfg.breaks.break_on_error);
        assert!(cfg.breaks.break_on_debug_output);
        assert!(cfg.breaks.break_on_compiler_error);
        assert!(!cfg.breaks.force_debug_context);
        assert!(cfg.breakpoints.is_empty());
        assert_eq!(cfg.trace.page_size, 100);
        assert_eq!(cfg.peer.history_len, 1000);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn breaks_convert_to_wire_configuration() {
        let breaks = BreaksConfig {
            break_on_debug_output: false,
            force_debug_context: true,
            ..BreaksConfig::default()
        };
        let wire = breaks.to_configuration();
        assert!(wire.break_on_error);
        assert!(!wire.break_on_debug_output);
        assert!(wire.force_debug_context);
        assert_eq!(BreaksConfig::from(wire), breaks);
    }

    #[test]
    fn serde_roundtrip_custom_values() {
        let cfg = Config {
            connection: ConnectionConfig {
                endpoint: "unix:/tmp/tracedbg.sock".into(),
                tick_interval_ms: 50,
            },
            breakpoints: vec![3, 17],
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/tracedbg.log")),
            },
            ..Config::default()
        };
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn log_level_uses_snake_case() {
        let cfg: Config = toml::from_str("[log]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(cfg.log.level, LogLevel::Warn);
    }
}
