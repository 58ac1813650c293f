/// Get environment variable with PROMWAY_ prefix, falling back to unprefixed version
///
/// `PROMWAY_{key}` wins over `{key}`, so a shared deployment can scope its
/// settings without breaking plain variable names.
///
/// # Examples
///
/// ```rust,ignore
/// // Checks PROMWAY_METRICS_PREFIX first, then METRICS_PREFIX
/// let prefix = get_env_with_prefix("METRICS_PREFIX");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("PROMWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a boolean flag from the environment, keeping `default` on bad input
pub fn get_env_bool(key: &str, default: bool) -> bool {
    get_env_with_prefix(key)
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

/// Split a comma separated environment value, dropping empty entries
pub fn get_env_list(key: &str) -> Option<Vec<String>> {
    get_env_with_prefix(key).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}
