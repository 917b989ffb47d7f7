//! Text preparation for the terminal front end.
//!
//! Transcripts hold replies verbatim; everything here runs at print time.

use crate::session::{Message, Role};
use rand::seq::IndexedRandom;
use regex::Regex;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

static INLINE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\((.+?)\\\)").expect("valid inline math regex"));
static DISPLAY_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\\[(.+?)\\\]").expect("valid display math regex"));

const GREETINGS: &[&str] = &[
    "How can I help you today?",
    "Ask me a question",
    "What can I do for you?",
    "How may I assist you?",
    "What would you like to know?",
    "Ready to help with anything",
    "What's on your mind?",
    "How can I be of service?",
    "What can I help you with?",
    "Ask me anything",
    "What would you like to explore?",
    "How can I make your day better?",
];

/// A greeting for an empty conversation.
#[must_use]
pub fn greeting() -> &'static str {
    GREETINGS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(GREETINGS[0])
}

/// Rewrite LaTeX delimiters to markdown math: `\( x \)` to `$ x $` and
/// `\[ x \]` (possibly multi-line) to `$$ x $$`.
#[must_use]
pub fn normalize_math(text: &str) -> String {
    let text = INLINE_MATH.replace_all(text, "$$${1}$$");
    DISPLAY_MATH
        .replace_all(&text, "$$$$${1}$$$$")
        .into_owned()
}

/// Tighten markdown tables: rows are trimmed and blank lines between rows
/// dropped. A blank line that ends a table is kept.
#[must_use]
pub fn fix_tables(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut inside_table = false;

    for (i, line) in lines.iter().enumerate() {
        if line.contains('|') {
            inside_table = true;
            out.push(line.trim());
            continue;
        }
        if inside_table && line.trim().is_empty() {
            let next_is_row = lines[i + 1..]
                .iter()
                .find(|l| !l.trim().is_empty())
                .is_some_and(|l| l.contains('|'));
            if next_is_row {
                continue;
            }
        }
        inside_table = false;
        out.push(line);
    }
    out.join("\n")
}

/// Reply text as it should be printed.
#[must_use]
pub fn prepare_reply(text: &str) -> String {
    fix_tables(&normalize_math(text))
}

/// First line of `title`, cut to `max_width` terminal columns.
#[must_use]
pub fn truncate_title(title: &str, max_width: usize) -> String {
    let line = title.lines().next().unwrap_or_default().trim();
    if line.width() <= max_width {
        return line.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let budget = max_width - 1;
    let mut out = String::new();
    let mut used = 0;
    for g in line.graphemes(true) {
        let w = g.width();
        if used + w > budget {
            break;
        }
        out.push_str(g);
        used += w;
    }
    out.push('…');
    out
}

/// One transcript entry, labelled by speaker.
#[must_use]
pub fn format_message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you> {}", message.content),
        Role::Assistant => format!("assistant> {}", prepare_reply(&message.content)),
    }
}
