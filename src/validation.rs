//! Input sanitization and parsing helpers shared by the route handlers.
//! Everything here is pure so it can be tested without a database.

use chrono::{NaiveDate, NaiveDateTime};

/// Character caps applied to free-text fields on the way in.
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_TAGS_LEN: usize = 500;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Normalize line endings, drop NUL/control characters (newline and tab
/// survive), trim, HTML-escape, and cap the length in characters.
pub fn sanitize_text(value: &str, max_length: usize) -> String {
    let normalized = value.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = normalized
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let escaped = escape_html(cleaned.trim());
    escaped.chars().take(max_length).collect()
}

/// Tags keep their commas but lose markup-significant characters entirely.
pub fn sanitize_tags(tags: &str) -> String {
    sanitize_text(tags, MAX_TAGS_LEN)
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\''))
        .collect()
}

/// Priorities outside 0..=3 silently clamp to 0 rather than erroring.
pub fn clamp_priority(priority: Option<i64>) -> i64 {
    match priority {
        Some(p) if (0..=3).contains(&p) => p,
        _ => 0,
    }
}

/// Accepts `YYYY-MM-DDTHH:MM` and `YYYY-MM-DDTHH:MM:SS[.fff]`.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Lowercased, trimmed address when the shape is plausible.
pub fn validate_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || email.len() > 254 {
        return None;
    }
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return None;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || ".-".contains(c));
    (local_ok && domain_ok).then_some(email)
}

pub fn validate_password(password: &str) -> bool {
    !password.contains('\0') && (8..=128).contains(&password.len())
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_text_strips_controls_and_escapes() {
        assert_eq!(sanitize_text("  hi\x00 <b>there</b> ", 100), "hi &lt;b&gt;there&lt;/b&gt;");
        assert_eq!(sanitize_text("line1\r\nline2", 100), "line1\nline2");
    }

    #[test]
    fn sanitize_text_caps_length() {
        assert_eq!(sanitize_text("abcdef", 3), "abc");
    }

    #[test]
    fn sanitize_tags_keeps_commas_and_escapes_markup() {
        assert_eq!(sanitize_tags("maths,year-10"), "maths,year-10");
        assert_eq!(sanitize_tags("<b>,a'b"), "&lt;b&gt;,a&#x27;b");
    }

    #[test]
    fn priority_clamps_out_of_range_to_zero() {
        assert_eq!(clamp_priority(Some(2)), 2);
        assert_eq!(clamp_priority(Some(3)), 3);
        assert_eq!(clamp_priority(Some(4)), 0);
        assert_eq!(clamp_priority(Some(-1)), 0);
        assert_eq!(clamp_priority(None), 0);
    }

    #[test]
    fn parses_both_datetime_shapes() {
        assert!(parse_datetime("2026-03-02T09:30").is_some());
        assert!(parse_datetime("2026-03-02T09:30:15").is_some());
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("2026-13-02T09:30").is_none());
    }

    #[test]
    fn parses_plain_dates() {
        assert_eq!(
            parse_date("2026-02-01"),
            NaiveDate::from_ymd_opt(2026, 2, 1)
        );
        assert!(parse_date("2026/02/01").is_none());
    }

    #[test]
    fn email_is_lowercased_and_checked() {
        assert_eq!(
            validate_email(" Alice@Example.COM "),
            Some("alice@example.com".to_string())
        );
        assert!(validate_email("no-at-sign").is_none());
        assert!(validate_email("two@@example.com").is_none());
        assert!(validate_email("x@nodot").is_none());
    }

    #[test]
    fn password_bounds() {
        assert!(validate_password("longenough"));
        assert!(!validate_password("short"));
        assert!(!validate_password(&"x".repeat(129)));
        assert!(!validate_password("has\0null-byte"));
    }
}
