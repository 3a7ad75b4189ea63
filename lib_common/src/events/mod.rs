//! # Events Module
//!
//! The normalized event vocabulary of the relay (`chat`, `gift`, `follow`,
//! `share`) and the rules that turn raw upstream payloads into it.
//!
//! - **`model`**: [`Event`] and [`Role`], with their JSON wire format.
//! - **`normalize`**: role inference, field defaulting and sanitization of
//!   upstream payloads.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Event and role types plus their wire format.
pub mod model;
/// Raw upstream payload → [`Event`] conversion.
pub mod normalize;

pub use model::{Event, Role};
pub use normalize::{
    infer_role, infer_role_or_default, normalize_chat, normalize_follow, normalize_gift,
    normalize_share, NormalizeError,
};
