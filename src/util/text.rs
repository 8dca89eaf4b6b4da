use std::borrow::Cow;
use std::time::Duration;

/// Marker appended to descriptions that were cut short
const ELLIPSIS: &str = "...";

/// Truncates an episode description to at most `max_chars` characters.
///
/// When the text is longer than the limit, the first `max_chars` characters
/// are kept, trailing whitespace is trimmed, and `"..."` is appended. Shorter
/// text is returned trimmed but otherwise whole. Counting is per Unicode
/// scalar value, so multi-byte characters are never split.
///
/// # Examples
///
/// ```
/// use podcast_bot::util::truncate_description;
///
/// assert_eq!(truncate_description("Short and sweet", 50), "Short and sweet");
/// assert_eq!(truncate_description("Hello wonderful world", 6), "Hello...");
/// ```
pub fn truncate_description(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", s[..cut].trim(), ELLIPSIS),
        None => s.trim().to_string(),
    }
}

/// Replaces typographic ("smart") quotes with their ASCII counterparts.
///
/// Returns `Cow::Borrowed` when there is nothing to replace.
pub fn unsmart_quotes(s: &str) -> Cow<'_, str> {
    if !s.contains(['\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}']) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.chars()
            .map(|c| match c {
                '\u{2018}' | '\u{2019}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                other => other,
            })
            .collect(),
    )
}

/// Strips control characters and ANSI escape sequences from feed text.
///
/// Feed descriptions occasionally carry stray C0 bytes or terminal escapes
/// pasted from other tools; neither belongs in a social post. Tab, newline
/// and carriage return are kept.
///
/// Returns `Cow::Borrowed` when the input is already clean.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI: parameters until a final byte in 0x40..=0x7e
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: until BEL or ESC-backslash
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\x1b'
}

/// Formats an episode duration as `"{H}h {M}m {S}s"`.
///
/// Hours are not capped, so a 26-hour marathon renders as `26h 0m 0s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncate_under_limit_is_whole() {
        assert_eq!(truncate_description("  Whole text \n", 100), "Whole text");
    }

    #[test]
    fn test_truncate_exact_limit_has_no_ellipsis() {
        assert_eq!(truncate_description("12345", 5), "12345");
    }

    #[test]
    fn test_truncate_over_limit_appends_ellipsis() {
        assert_eq!(truncate_description("123456", 5), "12345...");
    }

    #[test]
    fn test_truncate_trims_before_ellipsis() {
        assert_eq!(truncate_description("Hello world", 6), "Hello...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_description("日本語テスト", 3), "日本語...");
        assert_eq!(truncate_description("café ☕ time", 6), "café ☕...");
    }

    #[test]
    fn test_truncate_zero_limit() {
        assert_eq!(truncate_description("abc", 0), "...");
        assert_eq!(truncate_description("", 0), "");
    }

    proptest! {
        #[test]
        fn prop_truncated_text_is_bounded(s in "\\PC{0,300}", max in 0usize..200) {
            let out = truncate_description(&s, max);
            prop_assert!(out.chars().count() <= max + ELLIPSIS.chars().count());
        }

        #[test]
        fn prop_short_text_never_gets_ellipsis(s in "[a-z]{0,40}") {
            let out = truncate_description(&s, 40);
            prop_assert_eq!(out, s.trim().to_string());
        }
    }

    #[test]
    fn test_unsmart_quotes() {
        let result = unsmart_quotes("\u{201C}It\u{2019}s here,\u{201D} she said");
        assert_eq!(result, "\"It's here,\" she said");
    }

    #[test]
    fn test_unsmart_quotes_borrowed_when_plain() {
        let result = unsmart_quotes("plain 'quotes'");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Episode 12:\tguests\nand news";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_removes_controls() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x7f!"), "hello!");
    }

    #[test]
    fn test_strip_removes_ansi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m text"), "Red text");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
        assert_eq!(strip_control_chars("bare\x1bescape"), "bareescape");
    }

    #[test]
    fn test_strip_keeps_unicode() {
        assert_eq!(strip_control_chars("日本語 \x1b[1m太字\x1b[0m"), "日本語 太字");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0h 0m 0s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(26 * 3600)), "26h 0m 0s");
    }
}
