//! # Utilities Module
//!
//! General-purpose helpers shared by the relay server and the overlay
//! clients. Nothing in here pulls in an optional dependency, so the module is
//! always compiled regardless of the enabled feature set.
//!
//! ## Contained Modules:
//!
//! - **`text_sanitizer`**: the total, idempotent cleanup applied to every piece
//!   of untrusted free text before it is broadcast or displayed.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Entity decoding and control/invisible character stripping.
pub mod text_sanitizer;

pub use text_sanitizer::{decode_html_entities, sanitize, sanitize_opt};
