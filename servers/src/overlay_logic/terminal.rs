//! A [`Surface`] that prints to the terminal. Lines cannot be taken back once
//! printed, so removals are only logged.

use colored::Colorize;
use lib_common::events::Role;
use lib_common::loggers::paint;
use lib_common::presentation::{DisplayLine, GiftCard, LineKind, Surface};

pub struct TerminalSurface;

fn badge(role: Role) -> &'static str {
    match role {
        Role::Moderator => "MOD",
        Role::Subscriber => "SUB",
        Role::Follower => "FOLL",
        Role::Friend => "FRIEND",
        Role::User => "USER",
    }
}

pub fn render_line(line: &DisplayLine) -> String {
    match &line.kind {
        LineKind::Chat { role } => format!(
            "{} {} > {}",
            paint(&format!("[{}]", badge(*role)), *role).bold(),
            line.user.bold(),
            line.text
        ),
        LineKind::Follow => format!("{}", format!("* {} followed you!", line.user).green()),
        LineKind::Share => format!("{}", format!("~ {} shared your live!", line.user).cyan()),
    }
}

pub fn render_gift(card: &GiftCard) -> String {
    format!(
        "{} {} sent {} x{}!",
        "[GIFT]".yellow().bold(),
        card.user.bold(),
        card.gift_name.yellow(),
        card.amount
    )
}

impl Surface for TerminalSurface {
    fn show_line(&self, line: &DisplayLine) {
        println!("{}", render_line(line));
    }

    fn remove_line(&self, id: u64) {
        log::debug!("Line #{} scrolled out", id);
    }

    fn show_gift(&self, card: &GiftCard) {
        println!("{}", render_gift(card));
    }

    fn fade_gift(&self, id: u64) {
        log::debug!("Gift #{} fading", id);
    }

    fn remove_gift(&self, id: u64) {
        log::debug!("Gift #{} removed", id);
    }
}
