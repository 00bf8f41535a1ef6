use std::fmt::Display;
use std::str::FromStr;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case insensitive,
/// surrounding whitespace ignored)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an environment value, naming the variable in the error
pub fn parse_env<T>(key: &str, raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| format!("Invalid {key} environment variable: {e}"))
}
