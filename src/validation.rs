//! Input validation and sanitation
//!
//! Nicknames and room names are checked against a fixed character set;
//! free text is stripped of control characters and markup-escaped.

use crate::error::ChatError;

/// Longest accepted nickname, in characters
pub const MAX_NICKNAME_LENGTH: usize = 30;

/// Longest accepted room name, in characters
pub const MAX_ROOM_NAME_LENGTH: usize = 50;

fn is_nickname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-' | '[' | ']' | '(' | ')')
}

fn is_room_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '#' | ' ' | '_' | '.' | '-')
}

/// Validate and sanitize a raw nickname
pub fn validate_nickname(raw: &str) -> Result<String, ChatError> {
    let nickname = raw.trim();
    if nickname.is_empty() {
        return Err(ChatError::InvalidNickname(
            "Nickname cannot be empty".to_string(),
        ));
    }
    if nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(ChatError::InvalidNickname(format!(
            "Nickname too long (max {} characters)",
            MAX_NICKNAME_LENGTH
        )));
    }
    if !nickname.chars().all(is_nickname_char) {
        return Err(ChatError::InvalidNickname(
            "Nickname contains invalid characters".to_string(),
        ));
    }
    Ok(sanitize(nickname))
}

/// Validate and sanitize a raw room name
pub fn validate_room_name(raw: &str) -> Result<String, ChatError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ChatError::InvalidRoomName(
            "Room name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_ROOM_NAME_LENGTH {
        return Err(ChatError::InvalidRoomName(format!(
            "Room name too long (max {} characters)",
            MAX_ROOM_NAME_LENGTH
        )));
    }
    if !name.chars().all(is_room_name_char) {
        return Err(ChatError::InvalidRoomName(
            "Room name contains invalid characters".to_string(),
        ));
    }
    Ok(sanitize(name))
}

/// Strip control characters (tab and newline survive), escape markup and trim
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' | '\n' => out.push(c),
            c if c.is_ascii_control() => {}
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Cut `text` to at most `max_bytes` without splitting a character
pub fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_nicknames() {
        assert_eq!(validate_nickname("alice").unwrap(), "alice");
        assert_eq!(validate_nickname("  Bob_(2).x-[y] ").unwrap(), "Bob_(2).x-[y]");
    }

    #[test]
    fn test_nickname_rejects_markup() {
        let err = validate_nickname("bad<name>").unwrap_err();
        assert_eq!(
            err,
            ChatError::InvalidNickname("Nickname contains invalid characters".to_string())
        );
    }

    #[test]
    fn test_nickname_length() {
        assert!(validate_nickname(&"a".repeat(30)).is_ok());
        assert!(matches!(
            validate_nickname(&"a".repeat(31)),
            Err(ChatError::InvalidNickname(_))
        ));
        assert!(matches!(
            validate_nickname("   "),
            Err(ChatError::InvalidNickname(_))
        ));
    }

    #[test]
    fn test_room_names() {
        assert_eq!(validate_room_name("#lobby").unwrap(), "#lobby");
        assert_eq!(validate_room_name("dev talk-2.0").unwrap(), "dev talk-2.0");
        assert!(validate_room_name("room!").is_err());
        assert!(validate_room_name("(room)").is_err());
        assert!(validate_room_name(&"r".repeat(51)).is_err());
        assert!(validate_room_name("").is_err());
    }

    #[test]
    fn test_sanitize_strips_controls_and_escapes() {
        assert_eq!(sanitize("hi\x07 <b>&\"'"), "hi &lt;b&gt;&amp;&quot;&#x27;");
        assert_eq!(sanitize("  keep\ttab  "), "keep\ttab");
        assert_eq!(sanitize("\x1b[31m"), "[31m");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_to_boundary("hello", 10), "hello");
        assert_eq!(truncate_to_boundary("hello", 3), "hel");
        // 'é' is two bytes
        assert_eq!(truncate_to_boundary("aé", 2), "a");
    }
}
