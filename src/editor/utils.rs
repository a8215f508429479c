use once_cell::sync::Lazy;
use regex::Regex;

use super::errors::{EditorError, EditorResult};

/// Template names end up in file names and URLs
pub fn valid_template_name(name: &str) -> bool {
    static VALIDATOR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z\d_\-.]+( [A-Za-z\d_\-.]+)*$").unwrap());

    VALIDATOR.is_match(name) && !name.starts_with('.')
}

/// Double-quote a FortiOS CLI string argument, escaping embedded quotes and backslashes
pub fn quote(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);

    escaped.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped.push('"');

    escaped
}

/// Cuts `s` to at most `limit` characters
pub fn truncate_name(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Parses a checkbox-like value
pub fn parse_flag(value: &str) -> EditorResult<bool> {
    match value {
        "true" | "yes" | "enable" | "on" => Ok(true),
        "false" | "no" | "disable" | "off" => Ok(false),
        _ => Err(EditorError::InvalidSelection(format!(
            "expected a boolean, got: {}",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {

    use super::{parse_flag, quote, truncate_name, valid_template_name};
    use assert2::check;
    use rstest::rstest;

    #[rstest]
    #[case("regular", "\"regular\"")]
    #[case("with space", "\"with space\"")]
    #[case("with'single'quotes", "\"with'single'quotes\"")]
    #[case("with \"double\" quotes", "\"with \\\"double\\\" quotes\"")]
    #[case("back\\slash", "\"back\\\\slash\"")]
    fn test_quoting(#[case] input: &str, #[case] expected: &str) {
        let result = quote(input);
        check!(result.as_str() == expected);
    }

    #[rstest]
    #[case("", false)]
    #[case(" leading-space", false)]
    #[case("trailing-space ", false)]
    #[case("branch office", true)]
    #[case("../etc", false)]
    #[case("a/b", false)]
    #[case(".hidden", false)]
    #[case("dc-edge_v2.1", true)]
    fn test_valid_template_name(#[case] input: &str, #[case] expected: bool) {
        check!(valid_template_name(input) == expected);
    }

    #[test]
    fn test_truncate_name() {
        check!(truncate_name("short", 32) == "short");
        check!(truncate_name("abcdefghij", 4) == "abcd");
        check!(truncate_name("ééé", 2) == "éé");
    }

    #[rstest]
    #[case("true", Some(true))]
    #[case("enable", Some(true))]
    #[case("no", Some(false))]
    #[case("off", Some(false))]
    #[case("1", None)]
    fn test_parse_flag(#[case] input: &str, #[case] expected: Option<bool>) {
        match expected {
            Some(v) => {
                check!(parse_flag(input).unwrap() == v);
            }
            None => {
                check!(parse_flag(input).is_err());
            }
        }
    }
}
