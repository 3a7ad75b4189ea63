//! # Console Event Lines
//!
//! Role-coloured one-line descriptions of events, used by the relay's log
//! output and by the terminal overlay.

use colored::{Color, ColoredString, Colorize};

use crate::events::{Event, Role};

/// Console colour associated with a chat role.
pub fn role_color(role: Role) -> Color {
    match role {
        Role::Moderator => Color::Magenta,
        Role::Subscriber => Color::Blue,
        Role::Follower => Color::Green,
        Role::Friend => Color::Cyan,
        Role::User => Color::White,
    }
}

/// Paints `text` in the colour of `role`.
pub fn paint(text: &str, role: Role) -> ColoredString {
    text.color(role_color(role))
}

/// Plain, uncoloured description of an event.
pub fn describe(event: &Event) -> String {
    match event {
        Event::Chat { user, text, role } => format!("[{}] {}: {}", role, user, text),
        Event::Gift {
            user,
            gift_name,
            amount,
        } => format!("[gift] {} sent {} x{}", user, gift_name, amount),
        Event::Follow { user } => format!("[follow] {} followed", user),
        Event::Share { user } => format!("[share] {} shared the live", user),
    }
}

/// [`describe`], coloured: chats by role, gifts yellow, follows green, shares cyan.
pub fn event_line(event: &Event) -> String {
    let line = describe(event);
    let colored = match event {
        Event::Chat { role, .. } => paint(&line, *role),
        Event::Gift { .. } => line.yellow(),
        Event::Follow { .. } => line.green(),
        Event::Share { .. } => line.cyan(),
    };
    colored.to_string()
}
