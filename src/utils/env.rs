/// Get environment variable with GANGWAY_ prefix, falling back to unprefixed version
///
/// Checks `GANGWAY_{key}` first, then `{key}`, so deployments can either
/// namespace their settings or reuse conventional names like `PORT`.
///
/// # Examples
///
/// ```rust,ignore
/// // Checks GANGWAY_PENDING_STEP_UP_SECS first, then PENDING_STEP_UP_SECS
/// let timeout = get_env_with_prefix("PENDING_STEP_UP_SECS");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("GANGWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a prefixed environment variable, ignoring values that fail to parse.
pub fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("GANGWAY_ENV_TEST_VAR", "prefixed_value");
        }
        assert_eq!(
            get_env_with_prefix("ENV_TEST_VAR"),
            Some("prefixed_value".to_string())
        );
        unsafe {
            std::env::remove_var("GANGWAY_ENV_TEST_VAR");
        }

        unsafe {
            std::env::set_var("ENV_FALLBACK_TEST_VAR", "unprefixed_value");
        }
        assert_eq!(
            get_env_with_prefix("ENV_FALLBACK_TEST_VAR"),
            Some("unprefixed_value".to_string())
        );
        unsafe {
            std::env::remove_var("ENV_FALLBACK_TEST_VAR");
        }

        assert_eq!(get_env_with_prefix("NON_EXISTENT_GANGWAY_VAR"), None);
    }

    #[test]
    fn test_parse_env_with_prefix() {
        unsafe {
            std::env::set_var("GANGWAY_PARSE_TEST_NUM", " 42 ");
            std::env::set_var("GANGWAY_PARSE_TEST_BAD", "forty-two");
        }
        assert_eq!(parse_env_with_prefix::<u32>("PARSE_TEST_NUM"), Some(42));
        assert_eq!(parse_env_with_prefix::<u32>("PARSE_TEST_BAD"), None);
        unsafe {
            std::env::remove_var("GANGWAY_PARSE_TEST_NUM");
            std::env::remove_var("GANGWAY_PARSE_TEST_BAD");
        }
    }
}
