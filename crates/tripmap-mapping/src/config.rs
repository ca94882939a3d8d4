//! Engine configuration

/// Configuration for the transform engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// First path segment routed to the `config` value provider (default: `$config`)
    pub config_prefix: String,
    /// First path segment routed to the cache store (default: `$cache`)
    pub cache_prefix: String,
    /// Leading character of any other reserved first segment (default: `$`)
    pub reserved_marker: char,
    /// Return action failures to the caller instead of writing `null` (default: false)
    pub fail_on_action_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_prefix: "$config".to_string(),
            cache_prefix: "$cache".to_string(),
            reserved_marker: '$',
            fail_on_action_error: false,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config provider prefix
    #[must_use]
    pub fn config_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_prefix = prefix.into();
        self
    }

    /// Set the cache prefix
    #[must_use]
    pub fn cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    /// Set the reserved marker character
    #[must_use]
    pub fn reserved_marker(mut self, marker: char) -> Self {
        self.reserved_marker = marker;
        self
    }

    /// Propagate action failures as errors
    #[must_use]
    pub fn fail_on_action_error(mut self, fail: bool) -> Self {
        self.fail_on_action_error = fail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.config_prefix, "$config");
        assert_eq!(config.cache_prefix, "$cache");
        assert_eq!(config.reserved_marker, '$');
        assert!(!config.fail_on_action_error);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .config_prefix("@cfg")
            .cache_prefix("@memo")
            .reserved_marker('@')
            .fail_on_action_error(true);
        assert_eq!(config.config_prefix, "@cfg");
        assert_eq!(config.cache_prefix, "@memo");
        assert_eq!(config.reserved_marker, '@');
        assert!(config.fail_on_action_error);
    }
}
