//! Control-character escaping for user-supplied values in log lines.

/// Longest value, in characters, written to a log line.
pub const MAX_LOG_VALUE_CHARS: usize = 200;

/// Renders a value so it cannot forge or break a log line.
///
/// Control characters (CR, LF, ESC and friends) are replaced by their escaped
/// form and the result is cut at [`MAX_LOG_VALUE_CHARS`] characters.
#[must_use]
pub fn sanitize_for_log(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_LOG_VALUE_CHARS + 3));
    for (count, ch) in value.chars().enumerate() {
        if count == MAX_LOG_VALUE_CHARS {
            out.push_str("...");
            break;
        }
        if ch.is_control() {
            out.extend(ch.escape_default());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(sanitize_for_log("hello world"), "hello world");
    }

    #[test]
    fn test_newlines_escaped() {
        let forged = "ok\n2024-01-01 INFO admin logged in";
        let clean = sanitize_for_log(forged);
        assert!(!clean.contains('\n'));
        assert!(clean.starts_with("ok\\n"));
    }

    #[test]
    fn test_escape_sequences_escaped() {
        assert_eq!(sanitize_for_log("\u{1b}[31mred\r"), "\\u{1b}[31mred\\r");
    }

    #[test]
    fn test_truncated() {
        let long = "x".repeat(MAX_LOG_VALUE_CHARS + 50);
        let clean = sanitize_for_log(&long);
        assert_eq!(clean.chars().count(), MAX_LOG_VALUE_CHARS + 3);
        assert!(clean.ends_with("..."));
    }

    #[test]
    fn test_multibyte_not_split() {
        let long = "é".repeat(MAX_LOG_VALUE_CHARS + 1);
        assert!(sanitize_for_log(&long).ends_with("é..."));
    }
}
