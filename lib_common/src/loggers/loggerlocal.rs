//! # Local Logger Setup
//!
//! Installs a `fern` dispatcher behind the `log` facade: a timestamped
//! `[date][target][LEVEL] message` format chained to stdout and to a fresh
//! per-run file `<app>_<timestamp>.log` in the log directory.
//!
//! Before the new file is created, older log files of the same application are
//! pruned so that only the most recent previous run is kept.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::LevelFilter;
use thiserror::Error;

/// Failures while installing the logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory or file could not be created.
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
    /// A global logger is already installed.
    #[error("logger already initialised: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Maps a level name to a filter. Unknown names mean `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Path of the log file a run started now would write to.
pub fn log_file_path(app_name: &str, log_dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    log_dir.join(format!("{}_{}.log", app_name, stamp))
}

/// Deletes every `<app_name>_*.log` file in `log_dir` except the most recently
/// modified one. Returns how many files were removed.
pub fn cleanup_old_logs(app_name: &str, log_dir: &Path) -> std::io::Result<usize> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    // Newest first; ties broken by name, which embeds the timestamp.
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(1) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

/// # Setup Logging
///
/// Creates `log_dir` if needed, prunes old logs, and installs the global
/// logger. Returns the path of the new log file.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf, LoggerError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }
    cleanup_old_logs(app_name, log_dir)?;

    let log_path = log_file_path(app_name, log_dir);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level(" warn "), LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn test_cleanup_keeps_newest_of_same_app() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (i, name) in ["relay_a.log", "relay_b.log", "relay_c.log"].iter().enumerate() {
            let path = dir.path().join(name);
            let file = fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs(100 - i as u64 * 10)).unwrap();
        }
        fs::write(dir.path().join("other_a.log"), "x").unwrap();
        fs::write(dir.path().join("relay_notes.txt"), "x").unwrap();

        assert_eq!(cleanup_old_logs("relay", dir.path()).unwrap(), 2);
        assert!(dir.path().join("relay_c.log").exists());
        assert!(!dir.path().join("relay_a.log").exists());
        assert!(dir.path().join("other_a.log").exists());
        assert!(dir.path().join("relay_notes.txt").exists());
    }

    #[test]
    fn test_log_file_path_is_inside_dir() {
        let path = log_file_path("relay", Path::new("/tmp/logs"));
        assert!(path.starts_with("/tmp/logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("relay_") && name.ends_with(".log"));
    }
}
