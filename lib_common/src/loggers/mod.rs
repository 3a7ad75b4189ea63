/// Role-coloured console lines for events.
pub mod console;
/// `fern` setup with stdout and per-run log files.
pub mod loggerlocal;

pub use console::{describe, event_line, paint, role_color};
pub use loggerlocal::{cleanup_old_logs, parse_level, setup_logging, LoggerError};
