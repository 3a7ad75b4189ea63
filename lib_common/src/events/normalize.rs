//! # Upstream Payload Normalization
//!
//! Turns raw upstream payloads (arbitrary, possibly partial JSON objects as
//! emitted by the live-platform client library) into [`Event`]s.
//!
//! Missing fields degrade to defaults instead of failing the event. The only
//! event that is ever dropped is a chat whose comment is empty once sanitized.

use serde_json::Value;
use thiserror::Error;

use crate::events::model::{Event, Role};
use crate::utils::sanitize;

/// Placeholder used when an event carries no usable user name.
pub const UNKNOWN_USER: &str = "unknown";

/// Placeholder used when a gift carries no usable name.
pub const UNKNOWN_GIFT: &str = "unknown";

/// Errors raised while reading role signals. These never escape
/// [`infer_role_or_default`]; they only exist so tests can see why a payload
/// fell back to [`Role::User`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// A signal had an unexpected shape.
    #[error("malformed role signal `{field}`: expected {expected}")]
    MalformedSignal {
        /// Name of the offending field.
        field: &'static str,
        /// What the field should have been.
        expected: &'static str,
    },
}

/// JavaScript-style truthiness, which is how the upstream flags are meant to
/// be read (`1`, `"yes"` and `true` all count).
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn positive_number(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f > 0.0).unwrap_or(false),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f > 0.0).unwrap_or(false),
        _ => false,
    }
}

/// # Infer Role
///
/// Evaluates the role signals in strict priority order:
///
/// 1.  `isModerator` or `userIdentity.isModeratorOfAnchor` → moderator
/// 2.  `userIdentity.isFollowerOfAnchor` → follower
/// 3.  `isSubscriber`, `userIdentity.isSubscriberOfAnchor` or
///     `subscribingMonths > 0` → subscriber
/// 4.  any `userBadges` entry or a `topGifterRank` → moderator when a badge is
///     tagged as a moderator badge, friend otherwise
/// 5.  user
///
/// Returns an error when a signal container has the wrong shape.
pub fn infer_role(raw: &Value) -> Result<Role, NormalizeError> {
    let payload = raw.as_object().ok_or(NormalizeError::MalformedSignal {
        field: "payload",
        expected: "an object",
    })?;

    let identity = match payload.get("userIdentity") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(NormalizeError::MalformedSignal {
                field: "userIdentity",
                expected: "an object",
            })
        }
    };
    let identity_flag = |name: &str| identity.map(|map| truthy(map.get(name))).unwrap_or(false);

    if truthy(payload.get("isModerator")) || identity_flag("isModeratorOfAnchor") {
        return Ok(Role::Moderator);
    }

    if identity_flag("isFollowerOfAnchor") {
        return Ok(Role::Follower);
    }

    if truthy(payload.get("isSubscriber"))
        || identity_flag("isSubscriberOfAnchor")
        || positive_number(payload.get("subscribingMonths"))
    {
        return Ok(Role::Subscriber);
    }

    let badges: &[Value] = match payload.get("userBadges") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            return Err(NormalizeError::MalformedSignal {
                field: "userBadges",
                expected: "an array",
            })
        }
    };

    if !badges.is_empty() || truthy(payload.get("topGifterRank")) {
        let has_mod_badge = badges.iter().any(|badge| {
            badge.get("type").and_then(Value::as_str) == Some("moderator")
                || badge.get("name").and_then(Value::as_str) == Some("Moderator")
        });
        return Ok(if has_mod_badge { Role::Moderator } else { Role::Friend });
    }

    Ok(Role::User)
}

/// Role inference that never fails: malformed signals are logged and the
/// author is treated as a plain user.
pub fn infer_role_or_default(raw: &Value) -> Role {
    infer_role(raw).unwrap_or_else(|e| {
        log::warn!("Failed to detect role ({}), fallback to user", e);
        Role::User
    })
}

fn non_empty_str<'a>(raw: &'a Value, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Sanitized display name: `nickname`, falling back to `uniqueId`.
fn display_name(raw: &Value) -> String {
    let name = non_empty_str(raw, "nickname")
        .or_else(|| non_empty_str(raw, "uniqueId"))
        .map(sanitize)
        .unwrap_or_default();
    if name.is_empty() {
        UNKNOWN_USER.to_string()
    } else {
        name
    }
}

/// Sanitized handle from `uniqueId`, as used by follow and share events.
fn unique_id(raw: &Value) -> String {
    let id = raw
        .get("uniqueId")
        .and_then(Value::as_str)
        .map(sanitize)
        .unwrap_or_default();
    if id.is_empty() {
        UNKNOWN_USER.to_string()
    } else {
        id
    }
}

/// Normalizes a raw chat payload. Returns `None` when the comment is empty
/// after sanitization; such events are noise and must not be broadcast.
pub fn normalize_chat(raw: &Value) -> Option<Event> {
    let text = raw
        .get("comment")
        .and_then(Value::as_str)
        .map(sanitize)
        .unwrap_or_default();
    if text.is_empty() {
        log::debug!("Dropping chat event with empty comment after sanitization");
        return None;
    }

    Some(Event::Chat {
        user: display_name(raw),
        text,
        role: infer_role_or_default(raw),
    })
}

/// Normalizes a raw gift payload. `repeatCount` defaults to 1 when absent,
/// zero or not a positive integer. A missing or blank `giftName` becomes
/// [`UNKNOWN_GIFT`].
pub fn normalize_gift(raw: &Value) -> Event {
    let amount = raw
        .get("repeatCount")
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(1);

    let gift_name = raw
        .get("giftName")
        .and_then(Value::as_str)
        .map(sanitize)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_GIFT.to_string());

    Event::Gift {
        user: display_name(raw),
        gift_name,
        amount,
    }
}

/// Normalizes a raw follow payload.
pub fn normalize_follow(raw: &Value) -> Event {
    Event::Follow { user: unique_id(raw) }
}

/// Normalizes a raw share payload.
pub fn normalize_share(raw: &Value) -> Event {
    Event::Share { user: unique_id(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_moderator_beats_subscriber() {
        let raw = json!({
            "isSubscriber": true,
            "subscribingMonths": 4,
            "userIdentity": {"isModeratorOfAnchor": true}
        });
        assert_eq!(infer_role(&raw), Ok(Role::Moderator));
    }

    #[test]
    fn test_follower_beats_subscriber() {
        let raw = json!({
            "isSubscriber": true,
            "userIdentity": {"isFollowerOfAnchor": true}
        });
        assert_eq!(infer_role(&raw), Ok(Role::Follower));
    }

    #[test]
    fn test_subscriber_signals() {
        assert_eq!(infer_role(&json!({"isSubscriber": true})), Ok(Role::Subscriber));
        assert_eq!(
            infer_role(&json!({"userIdentity": {"isSubscriberOfAnchor": 1}})),
            Ok(Role::Subscriber)
        );
        assert_eq!(infer_role(&json!({"subscribingMonths": 2})), Ok(Role::Subscriber));
        assert_eq!(infer_role(&json!({"subscribingMonths": 0})), Ok(Role::User));
    }

    #[test]
    fn test_badges_and_gifter_rank() {
        assert_eq!(
            infer_role(&json!({"userBadges": [{"type": "moderator"}]})),
            Ok(Role::Moderator)
        );
        assert_eq!(
            infer_role(&json!({"userBadges": [{"name": "Moderator"}]})),
            Ok(Role::Moderator)
        );
        assert_eq!(
            infer_role(&json!({"userBadges": [{"type": "gifter", "name": "Lv 12"}]})),
            Ok(Role::Friend)
        );
        assert_eq!(infer_role(&json!({"topGifterRank": 3})), Ok(Role::Friend));
        assert_eq!(infer_role(&json!({"userBadges": []})), Ok(Role::User));
    }

    #[test]
    fn test_malformed_signals_fall_back_to_user() {
        let raw = json!({"userBadges": "oops"});
        assert!(matches!(
            infer_role(&raw),
            Err(NormalizeError::MalformedSignal { field: "userBadges", .. })
        ));
        assert_eq!(infer_role_or_default(&raw), Role::User);

        let raw = json!({"userIdentity": 7});
        assert!(infer_role(&raw).is_err());
        assert_eq!(infer_role_or_default(&raw), Role::User);

        assert_eq!(infer_role_or_default(&json!("not an object")), Role::User);
    }

    #[test]
    fn test_chat_normalization() {
        let raw = json!({"nickname": "Bob", "comment": "hi&amp;bye", "isModerator": true});
        assert_eq!(
            normalize_chat(&raw),
            Some(Event::Chat {
                user: "Bob".into(),
                text: "hi&bye".into(),
                role: Role::Moderator
            })
        );
    }

    #[test]
    fn test_chat_user_falls_back_to_unique_id() {
        let raw = json!({"nickname": "", "uniqueId": "bob_01", "comment": "yo"});
        assert_eq!(normalize_chat(&raw).unwrap().user(), "bob_01");

        let raw = json!({"comment": "yo"});
        assert_eq!(normalize_chat(&raw).unwrap().user(), UNKNOWN_USER);
    }

    #[test]
    fn test_empty_after_sanitize_chat_is_dropped() {
        assert_eq!(normalize_chat(&json!({"nickname": "a", "comment": "\u{200B}\u{200B}"})), None);
        assert_eq!(normalize_chat(&json!({"nickname": "a", "comment": "  \u{0007} "})), None);
        assert_eq!(normalize_chat(&json!({"nickname": "a"})), None);
    }

    #[test]
    fn test_gift_amount_defaults() {
        let gift = normalize_gift(&json!({"uniqueId": "ann", "giftName": "Rose", "repeatCount": 5}));
        assert_eq!(
            gift,
            Event::Gift {
                user: "ann".into(),
                gift_name: "Rose".into(),
                amount: 5
            }
        );
        for raw in [
            json!({"giftName": "Rose"}),
            json!({"giftName": "Rose", "repeatCount": 0}),
            json!({"giftName": "Rose", "repeatCount": null}),
            json!({"giftName": "Rose", "repeatCount": "lots"}),
        ] {
            assert!(matches!(normalize_gift(&raw), Event::Gift { amount: 1, .. }));
        }
    }

    #[test]
    fn test_gift_without_name_uses_placeholder() {
        for raw in [
            json!({"nickname": "Ann", "repeatCount": 2}),
            json!({"nickname": "Ann", "giftName": "\u{200B} ", "repeatCount": 2}),
        ] {
            assert_eq!(
                normalize_gift(&raw),
                Event::Gift {
                    user: "Ann".into(),
                    gift_name: "unknown".into(),
                    amount: 2
                }
            );
        }
    }

    #[test]
    fn test_follow_and_share_use_unique_id() {
        assert_eq!(
            normalize_follow(&json!({"uniqueId": "carol", "nickname": "Carol!"})),
            Event::Follow { user: "carol".into() }
        );
        assert_eq!(normalize_share(&json!({})), Event::Share { user: UNKNOWN_USER.into() });
    }
}
