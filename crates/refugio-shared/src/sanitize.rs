//! Sanitization and validation for user-supplied text.
//!
//! Sanitizers are lossy on purpose: they strip or escape markup-significant
//! characters, trim whitespace, and cap length, in that order. Validators
//! judge the result against protocol bounds.

use crate::constants::{
    MAX_MESSAGE_CHARS, NICKNAME_MAX, NICKNAME_MIN, PIN_LENGTH, ROOM_CAPACITY_MAX,
    ROOM_CAPACITY_MIN, ROOM_NAME_MAX, ROOM_NAME_MIN,
};

/// Strip markup-significant characters from a nickname, trim, and cap.
pub fn sanitize_nickname(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '\'' | '"'))
        .collect();
    stripped.trim().chars().take(NICKNAME_MAX).collect()
}

/// HTML-escape a message, trim, and cap the length.
pub fn sanitize_message(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            other => escaped.push(other),
        }
    }

    let trimmed = escaped.trim();
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        trimmed.chars().take(MAX_MESSAGE_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

pub fn valid_room_name(name: &str) -> bool {
    let len = name.trim().chars().count();
    (ROOM_NAME_MIN..=ROOM_NAME_MAX).contains(&len)
}

pub fn valid_capacity(capacity: usize) -> bool {
    (ROOM_CAPACITY_MIN..=ROOM_CAPACITY_MAX).contains(&capacity)
}

pub fn valid_nickname(nickname: &str) -> bool {
    let len = nickname.chars().count();
    (NICKNAME_MIN..=NICKNAME_MAX).contains(&len)
}

/// A PIN is exactly six ASCII digits.
pub fn valid_pin_format(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_stripped_trimmed_and_capped() {
        assert_eq!(sanitize_nickname("  ana  "), "ana");
        assert_eq!(sanitize_nickname("<script>ana</script>"), "scriptana/script");
        assert_eq!(sanitize_nickname("a\"n'a"), "ana");

        let long = "x".repeat(40);
        assert_eq!(sanitize_nickname(&long).chars().count(), NICKNAME_MAX);
    }

    #[test]
    fn message_is_escaped_trimmed_and_capped() {
        assert_eq!(sanitize_message("  hola  "), "hola");
        assert_eq!(
            sanitize_message("<b>hola</b>"),
            "&lt;b&gt;hola&lt;&#x2F;b&gt;"
        );
        assert_eq!(sanitize_message(r#"a"b'c"#), "a&quot;b&#x27;c");

        let long = "y".repeat(MAX_MESSAGE_CHARS + 100);
        assert_eq!(sanitize_message(&long).chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn whitespace_only_message_sanitizes_to_empty() {
        assert_eq!(sanitize_message("   \t\n  "), "");
    }

    #[test]
    fn room_name_bounds() {
        assert!(!valid_room_name("ab"));
        assert!(valid_room_name("abc"));
        assert!(valid_room_name(&"n".repeat(50)));
        assert!(!valid_room_name(&"n".repeat(51)));
        // Trimmed length is what counts.
        assert!(!valid_room_name("  a  "));
    }

    #[test]
    fn capacity_bounds() {
        assert!(!valid_capacity(0));
        assert!(!valid_capacity(1));
        assert!(valid_capacity(2));
        assert!(valid_capacity(50));
        assert!(!valid_capacity(51));
    }

    #[test]
    fn nickname_bounds() {
        assert!(!valid_nickname("ab"));
        assert!(valid_nickname("ana"));
        assert!(valid_nickname(&"n".repeat(20)));
        assert!(!valid_nickname(&"n".repeat(21)));
    }

    #[test]
    fn pin_format_is_exactly_six_digits() {
        assert!(valid_pin_format("000000"));
        assert!(valid_pin_format("483920"));
        assert!(!valid_pin_format("48392"));
        assert!(!valid_pin_format("4839201"));
        assert!(!valid_pin_format("48392a"));
        assert!(!valid_pin_format("48 392"));
        assert!(!valid_pin_format(""));
    }
}
