//! Shared validation helpers.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `url` uses one of the schemes the tunnel accepts.
pub(crate) fn validate_ws_url(errors: &mut Vec<String>, name: &str, url: &str) {
    const SCHEMES: [&str; 4] = ["ws://", "wss://", "http://", "https://"];
    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        errors.push(format!("{name} = {url:?} must start with ws://, wss://, http:// or https://"));
    }
}
