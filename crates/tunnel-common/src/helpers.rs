//! Common helper functions for Tunnel.

/// Read a boolean flag from the environment (`1`, `true`, `yes`, `on`).
pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Strip whitespace and trailing slashes from a base URL.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_bool_default() {
        assert!(env_bool("TUNNEL_TEST_FLAG_THAT_IS_NEVER_SET", true));
        assert!(!env_bool("TUNNEL_TEST_FLAG_THAT_IS_NEVER_SET", false));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url(" http://localhost:8010/ "),
            "http://localhost:8010"
        );
        assert_eq!(normalize_base_url("http://a//"), "http://a");
    }
}
