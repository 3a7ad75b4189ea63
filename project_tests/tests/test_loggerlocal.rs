use lib_common::loggers::setup_logging;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_setup_logging_writes_file_and_prunes_old_runs() {
    // Create a temporary directory holding two logs of earlier runs
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir = temp_dir.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    fs::write(log_dir.join("test_app_2020-01-01_00-00-00.log"), "old").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(log_dir.join("test_app_2020-01-02_00-00-00.log"), "newer").unwrap();
    fs::write(log_dir.join("unrelated.log"), "keep").unwrap();

    let log_path = setup_logging("test_app", &log_dir, "debug").expect("logger setup failed");

    log::info!("This is an info message");
    log::warn!("This is a warning message");
    log::debug!("This is a debug message");
    log::trace!("This trace message is filtered out");
    log::logger().flush();

    let contents = fs::read_to_string(&log_path).expect("Failed to read log file contents");
    assert!(contents.contains("[INFO] This is an info message"), "Info message not found in log file");
    assert!(contents.contains("[WARN] This is a warning message"), "Warning message not found in log file");
    assert!(contents.contains("This is a debug message"), "Debug message not found in log file");
    assert!(!contents.contains("trace message"), "Trace message should be filtered");

    // Only the most recent earlier run survives, next to the new file
    assert!(!log_dir.join("test_app_2020-01-01_00-00-00.log").exists());
    assert!(log_dir.join("test_app_2020-01-02_00-00-00.log").exists());
    assert!(log_dir.join("unrelated.log").exists());

    // A second global logger cannot be installed
    assert!(setup_logging("test_app", &log_dir, "info").is_err());
}
