use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_layer;
use crate::validate::validate;

const CONFIG_FILE: &str = "config.toml";
const PROJECT_DIR: &str = ".tracedbg";

/// Written to `config.toml` the first time a config dir is used.
const DEFAULT_CONFIG_CONTENT: &str = r#"# tracedbg configuration
# Every setting below shows its default; uncomment to change it.

# Entrypoint ids to break on from the first pause.
# breakpoints = []

# [connection]
# endpoint = "127.0.0.1:5555"
# tick_interval_ms = 10

# [breaks]
# break_on_error = true
# break_on_debug_output = true
# break_on_compiler_error = true
# force_debug_context = false
# force_debug_context_es = false

# [trace]
# page_size = 100

# [peer]
# history_len = 1000

# [log]
# level = "info"
# file = "/tmp/tracedbg.log"
"#;

/// `<platform config dir>/tracedbg`, e.g. `~/.config/tracedbg`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tracedbg"))
}

/// Build the effective configuration.
///
/// Layers apply in order over [`Config::default`]:
///
/// 1. `config_dir/config.toml`, created with commented defaults if missing;
/// 2. the nearest `.tracedbg/config.toml` at or above `project_dir`.
///
/// The merged result must pass [`validate`]; the first violation is
/// returned otherwise.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let mut layers = vec![ensure_global_file(config_dir)?];
    layers.extend(project_dir.and_then(find_project_config));

    let mut config = Config::default();
    for path in &layers {
        let text = read(path)?;
        if is_blank(&text) {
            debug!(path = %path.display(), "config layer has no settings");
            continue;
        }
        config = merge_layer(&config, &text, &path.display().to_string())?;
        debug!(path = %path.display(), "merged config layer");
    }
    checked(config)
}

/// Parse and validate one file, with no default layer and nothing created.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = read(path)?;
    let config = toml::from_str(&text).map_err(|e| ConfigError::parse(path.display().to_string(), e))?;
    checked(config)
}

pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config = toml::from_str(toml_str).map_err(|e| ConfigError::parse("<string>", e))?;
    checked(config)
}

fn ensure_global_file(config_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(path);
    }
    let write_err = |source| ConfigError::Write {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(config_dir).map_err(write_err)?;
    fs::write(&path, DEFAULT_CONFIG_CONTENT).map_err(write_err)?;
    info!("created default config at {}", path.display());
    Ok(path)
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// True when every line is empty or a comment.
fn is_blank(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

fn checked(config: Config) -> Result<Config, ConfigError> {
    if let Err(errors) = validate(&config) {
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
    }
    Ok(config)
}
