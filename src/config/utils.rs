use std::env;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read an environment variable, treating blank values as unset.
///
/// Deployment templates often export every variable even when the value is
/// empty, so an empty string must not shadow the YAML value or default.
pub fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional environment variable into `T`, naming the variable in the error.
pub fn parse_env<T>(name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable: {e}")),
        None => Ok(None),
    }
}
