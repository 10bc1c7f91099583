use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Drop lines that are empty or whitespace-only
pub fn strip_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON APIs and hand-edited files disagree on whether numbers are quoted
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

/// Deserialize an optional `u32` given either as a JSON number or a numeric string
pub fn de_opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    match Option::<NumberOrString>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => u32::try_from(n).map(Some).map_err(D::Error::custom),
        Some(NumberOrString::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
    }
}

/// Deserialize an identifier that may arrive as a number or a string
pub fn de_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(n) => Ok(n.to_string()),
        NumberOrString::Text(s) => Ok(s),
    }
}
