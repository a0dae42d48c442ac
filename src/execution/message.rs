//! Engine error text -> message fit for an end user.

use regex::Regex;
use std::sync::OnceLock;

static SQL_ERROR: OnceLock<Option<Regex>> = OnceLock::new();

fn sql_error_pattern() -> Option<&'static Regex> {
    SQL_ERROR
        .get_or_init(|| Regex::new(r#"error while executing SQL "(.*)":(.*)"#).ok())
        .as_ref()
}

/// Collapse the message to one line and, when the engine reports
/// `error while executing SQL "<sql>": <cause>`, put the cause first.
pub fn user_friendly_message(raw: &str) -> String {
    let one_line: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    if let Some(caps) = sql_error_pattern().and_then(|re| re.captures(&one_line)) {
        let sql = caps.get(1).map_or("", |m| m.as_str()).trim();
        let cause = caps.get(2).map_or("", |m| m.as_str()).trim();
        return format!("{cause}\nwhile executing SQL: \"{sql}\"");
    }

    one_line
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cause_moved_ahead_of_sql() {
        let raw = "Error: error while executing SQL \"select * from\nfoo\": From line 1, column 15: Table 'FOO' not found";
        assert_eq!(
            user_friendly_message(raw),
            "From line 1, column 15: Table 'FOO' not found\nwhile executing SQL: \"select * from foo\""
        );
    }

    #[test]
    fn test_plain_message_flattened() {
        assert_eq!(
            user_friendly_message("Scan row\tcount exceeded\nthreshold"),
            "Scan row count exceeded threshold"
        );
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(user_friendly_message(""), "");
    }

    proptest! {
        #[test]
        fn prop_result_has_newline_only_when_rewritten(raw in "[a-zA-Z \t\n]{0,40}") {
            let msg = user_friendly_message(&raw);
            prop_assert!(!msg.contains('\n'));
            prop_assert!(!msg.contains('\t'));
            prop_assert_eq!(msg.chars().count(), raw.chars().count());
        }
    }
}
