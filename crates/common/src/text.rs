//! Message length limits.
//!
//! Lengths are measured in UTF-16 code units, which is how the Bot API
//! counts them.

use std::borrow::Cow;

/// Maximum length of a text message.
pub const TEXT_LIMIT: usize = 4096;

/// Maximum length of a media caption.
pub const CAPTION_LIMIT: usize = 1024;

/// Marker appended to shortened text.
pub const ELLIPSIS: char = '…';

/// Length of `text` in UTF-16 code units.
#[must_use]
pub fn units(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Longest prefix of `text` that is at most `max_units` long, cut on a char
/// boundary.
#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_units: usize) -> &str {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        used += c.len_utf16();
        if used > max_units {
            return &text[..idx];
        }
    }
    text
}

/// `text` unchanged when it fits in `max_units`, otherwise a prefix ending
/// in [`ELLIPSIS`] that fits.
#[must_use]
pub fn fit(text: &str, max_units: usize) -> Cow<'_, str> {
    if units(text) <= max_units {
        return Cow::Borrowed(text);
    }
    let keep = max_units.saturating_sub(ELLIPSIS.len_utf16());
    let mut shortened = truncate_at_char_boundary(text, keep).trim_end().to_string();
    if max_units > 0 {
        shortened.push(ELLIPSIS);
    }
    Cow::Owned(shortened)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_utf8_and_utf16() {
        let text = format!("{}л{}", "a".repeat(4095), "z");
        let truncated = truncate_at_char_boundary(&text, 4096);
        assert_eq!(units(truncated), 4096);
        assert!(truncated.ends_with('л'));

        // Astral chars take two units and are never split.
        assert_eq!(truncate_at_char_boundary("ab😀", 3), "ab");
        assert_eq!(truncate_at_char_boundary("ab😀", 4), "ab😀");
    }

    #[test]
    fn fit_marks_shortened_text() {
        assert_eq!(fit("short", 10), "short");
        let long = "x".repeat(TEXT_LIMIT + 10);
        let fitted = fit(&long, TEXT_LIMIT);
        assert_eq!(units(&fitted), TEXT_LIMIT);
        assert!(fitted.ends_with(ELLIPSIS));
        assert_eq!(fit("abc", 0), "");
    }
}
