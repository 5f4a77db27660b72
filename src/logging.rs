//! Subscriber setup for the binary.
//!
//! Logs go to stderr or to a size-rotated file, never to stdout, which the
//! console owns.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use tracedbg_config::{LogConfig, LogLevel};

/// `<data dir>/tracedbg/tracedbg.log`, falling back to the temp dir.
pub fn default_log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tracedbg")
        .join("tracedbg.log")
}

/// Size-triggered rotation: `x.log` becomes `x.log.1`, older generations
/// shift up by one, and anything past `keep` is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_size: u64,
    pub keep: u32,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl LogRotation {
    /// Rotate `path` if it has reached `max_size`. Returns whether it did.
    pub fn rotate(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(meta) if meta.len() >= self.max_size => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }

        if self.keep == 0 {
            fs::remove_file(path)?;
            return Ok(true);
        }
        let oldest = generation(path, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.keep).rev() {
            let from = generation(path, n);
            if from.exists() {
                fs::rename(&from, generation(path, n + 1))?;
            }
        }
        fs::rename(path, generation(path, 1))?;
        Ok(true)
    }
}

/// `path` with `.n` appended to its file name.
fn generation(path: &Path, n: u32) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    path.with_file_name(name)
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Parse a `--log-level` value; case does not matter.
pub fn parse_level(text: &str) -> Result<LevelFilter> {
    text.trim()
        .parse::<LevelFilter>()
        .map_err(|_| anyhow!("unknown log level {text:?} (expected trace, debug, info, warn, error or off)"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level_override`, which takes precedence
/// over `config.level`.
pub fn init(config: &LogConfig, level_override: Option<&str>) -> Result<()> {
    let level = match level_override {
        Some(text) => parse_level(text)?,
        None => level_filter(config.level),
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &config.file {
        None => builder.with_writer(io::stderr).try_init(),
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create log dir {}", dir.display()))?;
            }
            LogRotation::default()
                .rotate(path)
                .with_context(|| format!("cannot rotate {}", path.display()))?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
    };
    installed.map_err(|e| anyhow!("cannot install logger: {e}"))
}
