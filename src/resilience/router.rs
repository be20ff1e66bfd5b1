//! Model selection by tier and input size.

use crate::config::ModelConfig;

/// Which tier a call runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// First choice; size-routed between large and small models.
    Primary,
    /// Used once after the primary tier has exhausted its retries.
    Fallback,
}

/// Picks a model name for a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRouter {
    large: String,
    small: String,
    fallback: String,
    threshold_chars: usize,
}

impl ModelRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        large: impl Into<String>,
        small: impl Into<String>,
        fallback: impl Into<String>,
        threshold_chars: usize,
    ) -> Self {
        Self {
            large: large.into(),
            small: small.into(),
            fallback: fallback.into(),
            threshold_chars,
        }
    }

    /// Model for `tier` given an input of `input_chars` characters.
    ///
    /// Inputs strictly longer than the threshold go to the large model.
    #[must_use]
    pub fn route(&self, tier: ModelTier, input_chars: usize) -> &str {
        match tier {
            ModelTier::Fallback => &self.fallback,
            ModelTier::Primary if input_chars > self.threshold_chars => &self.large,
            ModelTier::Primary => &self.small,
        }
    }
}

impl From<&ModelConfig> for ModelRouter {
    fn from(config: &ModelConfig) -> Self {
        Self::new(
            config.large_model.clone(),
            config.small_model.clone(),
            config.fallback_model.clone(),
            config.routing_threshold_chars,
        )
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn router() -> ModelRouter {
        ModelRouter::new("large", "small", "fallback", 8_000)
    }

    #[test_case(ModelTier::Primary, 100, "small" ; "short log")]
    #[test_case(ModelTier::Primary, 8_000, "small" ; "at threshold")]
    #[test_case(ModelTier::Primary, 8_001, "large" ; "above threshold")]
    #[test_case(ModelTier::Fallback, 50_000, "fallback" ; "fallback ignores size")]
    fn test_route(tier: ModelTier, chars: usize, expected: &str) {
        assert_eq!(router().route(tier, chars), expected);
    }

    #[test]
    fn test_default_uses_configured_models() {
        let r = ModelRouter::default();
        assert_eq!(
            r.route(ModelTier::Primary, 100_000),
            crate::config::DEFAULT_PRIMARY_MODEL
        );
        assert_eq!(
            r.route(ModelTier::Fallback, 0),
            crate::config::DEFAULT_FALLBACK_MODEL
        );
    }
}
