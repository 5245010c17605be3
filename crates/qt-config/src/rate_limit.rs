use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Upper bound on in-flight fetches across all providers.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Upper bound on in-flight fetches for a single provider.
    #[serde(default = "default_per_provider")]
    pub per_provider: usize,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_per_provider() -> usize {
    2
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            per_provider: default_per_provider(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_correct() {
        let r = RateLimitConfig::default();
        assert_eq!(r.max_concurrency, 4);
        assert_eq!(r.per_provider, 2);
    }

    #[test]
    fn serde_missing_fields_uses_defaults() {
        let r: RateLimitConfig = toml::from_str("max_concurrency = 8\n").unwrap();
        assert_eq!(r.max_concurrency, 8);
        assert_eq!(r.per_provider, 2);
    }
}
