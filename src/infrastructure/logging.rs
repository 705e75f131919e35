//! Logging system configuration and initialization
//!
//! - File logging next to the executable, previous run rotated aside
//! - Level and per-module filters from the config file, `RUST_LOG` wins
//! - Optional JSON file output
//! - Local-time timestamps

use anyhow::{Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infrastructure::config::defaults;
pub use crate::infrastructure::config::LoggingConfig;

/// Active log file name; earlier runs are renamed with a timestamp suffix
pub const LOG_FILE_NAME: &str = "catalog-curator.log";

// Keeps the non-blocking writers alive for the whole process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Log directory next to the executable, or the user data dir as fallback
pub fn get_log_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| dirs::data_local_dir().map(|d| d.join(defaults::APP_DIR_NAME)))
        .unwrap_or_default()
        .join("logs")
}

/// Build the filter: `RUST_LOG` if set, otherwise the configured level,
/// module filters, and the crate itself at the configured level
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)?;
    if !config.level.eq_ignore_ascii_case("trace") {
        for (module, level) in &config.module_filters {
            filter = filter.add_directive(format!("{module}={level}").parse()?);
        }
    }
    Ok(filter.add_directive(format!("catalog_curator_lib={}", config.level).parse()?))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config)?;

    let log_dir = get_log_directory();
    let file_layer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {}: {e}", log_dir.display()))?;
        rotate_existing_log_file(&log_dir)?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, config.max_files)?;
        }

        let (writer, guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(guard);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_ansi(false);
        Some(if config.json_format {
            layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            layer.with_target(false).boxed()
        })
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        "Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {}", log_dir.display());
    }
    Ok(())
}

/// Rename the previous run's log file with its modification time
fn rotate_existing_log_file(log_dir: &Path) -> Result<()> {
    let current = log_dir.join(LOG_FILE_NAME);
    if !current.exists() {
        return Ok(());
    }

    let modified = std::fs::metadata(&current)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let stamp = chrono::DateTime::<Local>::from(modified).format("%Y%m%dT%H%M%S");
    let stem = LOG_FILE_NAME.trim_end_matches(".log");
    let rotated = log_dir.join(format!("{stem}.{stamp}.log"));

    std::fs::rename(&current, &rotated).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {e}",
            current.display(),
            rotated.display()
        )
    })
}

/// Delete the oldest `.log` files beyond `max_files`; returns how many were removed
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = max_files as usize;
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Catalog Curator System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {}", current_dir.display());
    }
    info!("Log directory: {}", get_log_directory().display());
}
