pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{
    BreaksConfig, Config, ConnectionConfig, LogConfig, LogLevel, PeerConfig, TraceConfig,
};
pub use error::ConfigError;
pub use load::{default_config_dir, load_config, load_file, load_from_str};
pub use merge::merge_configs;
pub use validate::validate;
