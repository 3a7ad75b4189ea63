//! # Normalized Event Model
//!
//! The wire format shared by the relay server and every display client. Each
//! message is a JSON object with a mandatory `type` discriminator:
//!
//! ```json
//! {"type":"chat","user":"Bob","comment":"hi&bye","role":"moderator"}
//! {"type":"gift","user":"Ann","gift":"Rose","amount":5}
//! {"type":"follow","user":"carol"}
//! {"type":"share","user":"dave"}
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::sanitize;

/// # Chat Role
///
/// The audience role of a chat author. Never supplied verbatim by the
/// platform; it is inferred from several signals (see
/// [`crate::events::normalize::infer_role`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Moderator of the anchor's room.
    Moderator,
    /// Paying subscriber of the anchor.
    Subscriber,
    /// Follows the anchor.
    Follower,
    /// Has badges or a top-gifter rank but no stronger signal.
    Friend,
    /// Fallback.
    #[default]
    User,
}

impl Role {
    /// Lowercase wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Subscriber => "subscriber",
            Role::Follower => "follower",
            Role::Friend => "friend",
            Role::User => "user",
        }
    }

    /// Lenient parse used on the display side. Accepts the short `mod`/`sub`
    /// aliases; anything unknown degrades to [`Role::User`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "moderator" | "mod" => Role::Moderator,
            "subscriber" | "sub" => Role::Subscriber,
            "follower" => Role::Follower,
            "friend" => Role::Friend,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.as_deref().map(Role::from_label).unwrap_or_default())
    }
}

fn default_amount() -> u32 {
    1
}

/// # Relay Event
///
/// One normalized live event. Field names on the wire follow the overlay
/// protocol (`comment`, `gift`) rather than the Rust field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// A chat comment.
    Chat {
        /// Display name of the author.
        user: String,
        /// Comment body.
        #[serde(rename = "comment")]
        text: String,
        /// Inferred audience role.
        #[serde(default)]
        role: Role,
    },
    /// A gift, possibly repeated.
    Gift {
        /// Display name of the sender.
        user: String,
        /// Name of the gift.
        #[serde(rename = "gift")]
        gift_name: String,
        /// Repeat count, at least 1.
        #[serde(default = "default_amount")]
        amount: u32,
    },
    /// Someone followed the anchor.
    Follow {
        /// Handle of the new follower.
        user: String,
    },
    /// Someone shared the live room.
    Share {
        /// Handle of the sharer.
        user: String,
    },
}

impl Event {
    /// The wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Chat { .. } => "chat",
            Event::Gift { .. } => "gift",
            Event::Follow { .. } => "follow",
            Event::Share { .. } => "share",
        }
    }

    /// Author / actor of the event.
    pub fn user(&self) -> &str {
        match self {
            Event::Chat { user, .. }
            | Event::Gift { user, .. }
            | Event::Follow { user }
            | Event::Share { user } => user,
        }
    }

    /// Serializes to the canonical JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Re-applies the sanitizer to every free-text field and clamps the gift
    /// amount to at least 1. Display clients call this on everything they
    /// receive, whatever the server already did.
    pub fn sanitized(self) -> Self {
        match self {
            Event::Chat { user, text, role } => Event::Chat {
                user: sanitize(&user),
                text: sanitize(&text),
                role,
            },
            Event::Gift {
                user,
                gift_name,
                amount,
            } => Event::Gift {
                user: sanitize(&user),
                gift_name: sanitize(&gift_name),
                amount: amount.max(1),
            },
            Event::Follow { user } => Event::Follow {
                user: sanitize(&user),
            },
            Event::Share { user } => Event::Share {
                user: sanitize(&user),
            },
        }
    }
}
