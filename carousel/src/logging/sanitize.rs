//! Terminal control-sequence stripping.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// ESC, one byte in `@`..`_`, parameter bytes `0`..`?`, intermediate bytes
/// ` `..`/`, and a final byte in `@`..`~`.
#[allow(clippy::expect_used)]
static ANSI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("ANSI pattern is a valid regex")
});

/// Removes terminal control sequences from `text`.
///
/// Borrows when there is nothing to strip.
#[must_use]
pub fn sanitize(text: &str) -> Cow<'_, str> {
    ANSI_PATTERN.replace_all(text, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_color_codes() {
        assert_eq!(sanitize("\x1b[31mHello\x1b[0m"), "Hello");
    }

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(sanitize("plain text"), Cow::Borrowed("plain text")));
    }

    #[test]
    fn test_strips_cursor_and_erase_sequences() {
        assert_eq!(sanitize("\x1b[2K\x1b[1GProgress 40%"), "Progress 40%");
        assert_eq!(sanitize("\x1b[1;32m✓\x1b[0m done"), "✓ done");
    }

    #[test]
    fn test_strips_two_byte_escape() {
        // ESC followed directly by a final byte in the Fe range.
        assert_eq!(sanitize("a\x1bMb"), "ab");
    }

    #[test]
    fn test_lone_escape_is_kept() {
        assert_eq!(sanitize("tail\x1b"), "tail\x1b");
    }
}
