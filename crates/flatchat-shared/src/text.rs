//! Message text normalization.
//!
//! Stored messages are kept in their canonical rendered form, so whatever a
//! client sends is normalized once, before it reaches the log. The
//! [`TextNormalizer`] trait is the seam for that; [`HtmlNormalizer`] is the
//! stock implementation (trim, smileys to emoji, HTML escaping, length cap).

use crate::constants::MAX_MESSAGE_CHARS;

/// Turns raw client text into the form that gets persisted.
///
/// An empty return value means "nothing to post".
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;

    /// Upper bound on the length of a normalized message, in characters.
    fn max_chars(&self) -> usize;
}

/// Longer variants first so `:-)` is not eaten by `:)` halfway.
const SMILEYS: &[(&str, &str)] = &[
    (":-)", "\u{1F60A}"),
    (":)", "\u{1F60A}"),
    (";-)", "\u{1F609}"),
    (";)", "\u{1F609}"),
    (":-D", "\u{1F604}"),
    (":D", "\u{1F604}"),
    (":-(", "\u{1F641}"),
    (":(", "\u{1F641}"),
    (":-P", "\u{1F61B}"),
    (":P", "\u{1F61B}"),
    (":-O", "\u{1F62E}"),
    (":O", "\u{1F62E}"),
    (":-|", "\u{1F610}"),
    (":|", "\u{1F610}"),
    (":-/", "\u{1F615}"),
    (":/", "\u{1F615}"),
];

#[derive(Debug, Clone)]
pub struct HtmlNormalizer {
    max_chars: usize,
}

impl HtmlNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for HtmlNormalizer {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_CHARS)
    }
}

impl TextNormalizer for HtmlNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let text = smileys_to_emoji(raw.trim());

        // Escape per character and stop before an entity would cross the
        // cap, so the result never ends in a torn `&am`.
        let mut out = String::with_capacity(text.len());
        let mut count = 0usize;
        for c in text.chars() {
            let unit = escape_char(c);
            let len = unit.chars().count();
            if count + len > self.max_chars {
                break;
            }
            out.push_str(&unit);
            count += len;
        }
        out.trim_end().to_string()
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }
}

/// HTML-escape `text` without any other rewriting.
///
/// For text the server composes itself, such as join and leave notices that
/// embed a nickname.
pub fn escape_html(text: &str) -> String {
    text.chars().map(escape_char).collect()
}

/// Replace ASCII smileys with their emoji.
///
/// None of the smiley characters are HTML-special, so running this before
/// escaping cannot mangle an entity.
pub fn smileys_to_emoji(text: &str) -> String {
    let mut out = text.to_string();
    for (from, to) in SMILEYS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

fn escape_char(c: char) -> String {
    match c {
        '&' => "&amp;".to_string(),
        '<' => "&lt;".to_string(),
        '>' => "&gt;".to_string(),
        '"' => "&quot;".to_string(),
        '\'' => "&#039;".to_string(),
        // Control characters (newlines included) would break the line log
        // and the client rendering alike.
        c if c.is_control() => " ".to_string(),
        c => c.to_string(),
    }
}
