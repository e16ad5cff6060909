//! URL utilities for consistent endpoint construction
//!
//! This module normalizes base URLs so that appending API endpoints never
//! produces double slashes, regardless of how the server address was
//! configured.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use ollama_chat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434///"), "http://localhost:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and an endpoint path
///
/// # Examples
///
/// ```
/// use ollama_chat::utils::url::api_url;
///
/// assert_eq!(
///     api_url("http://localhost:11434", "api/chat"),
///     "http://localhost:11434/api/chat"
/// );
/// assert_eq!(
///     api_url("http://localhost:11434/", "/api/tags"),
///     "http://localhost:11434/api/tags"
/// );
/// ```
pub fn api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:11434"),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_base_url("http://localhost:11434/"),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_base_url("http://192.168.1.20:11434///"),
            "http://192.168.1.20:11434"
        );
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            api_url("http://localhost:11434", "api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            api_url("http://localhost:11434/", "api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            api_url("http://localhost:11434", "/api/version"),
            "http://localhost:11434/api/version"
        );
    }
}
