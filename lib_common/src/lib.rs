//! # lib_common
//!
//! Shared library of the live event relay workspace. Modules are gated by
//! Cargo features named after their folders; `full` (the default) enables all
//! of them.
//!
//! | module         | feature        |
//! |----------------|----------------|
//! | `utils`        | always         |
//! | `events`       | `events`       |
//! | `ingestors`    | `ingestors`    |
//! | `core`         | `core`         |
//! | `presentation` | `presentation` |
//! | `loggers`      | `loggers`      |

pub mod utils;

#[cfg(feature = "events")]
pub mod events;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "presentation")]
pub mod presentation;

#[cfg(feature = "loggers")]
pub mod loggers;

pub use utils::sanitize;
