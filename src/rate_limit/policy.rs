use super::{RateLimitRule, RuleError};

/// Default rule plus per-path overrides. The longest matching path prefix
/// wins.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    default: RateLimitRule,
    endpoints: Vec<(String, RateLimitRule)>,
}

impl RateLimitPolicy {
    pub fn new(default: RateLimitRule) -> Self {
        Self {
            default,
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, path: impl Into<String>, rule: RateLimitRule) -> Self {
        self.endpoints.push((path.into(), rule));
        self.endpoints.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Parses `path=algorithm:max:window;path=...`. Blank entries are skipped.
    pub fn with_endpoint_rules(mut self, rules: &str) -> Result<Self, RuleError> {
        for entry in rules.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (path, rule) = entry
                .split_once('=')
                .ok_or_else(|| RuleError::Malformed(entry.to_string()))?;
            self = self.with_endpoint(path.trim(), rule.parse()?);
        }
        Ok(self)
    }

    pub fn default_rule(&self) -> &RateLimitRule {
        &self.default
    }

    pub fn rule_for(&self, path: &str) -> &RateLimitRule {
        self.endpoints
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, rule)| rule)
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::rate_limit::RateLimitAlgorithm;

    fn default_rule() -> RateLimitRule {
        RateLimitRule::new(RateLimitAlgorithm::SlidingWindow, 100, Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let policy = RateLimitPolicy::new(default_rule())
            .with_endpoint_rules(
                "/api/auth=fixed_window:20:60; /api/auth/logout=token_bucket:2:10;",
            )
            .unwrap();

        assert_eq!(
            policy.rule_for("/api/auth/logout").algorithm,
            RateLimitAlgorithm::TokenBucket
        );
        assert_eq!(
            policy.rule_for("/api/auth/check-token").algorithm,
            RateLimitAlgorithm::FixedWindow
        );
        assert_eq!(policy.rule_for("/api/keywords/related"), &default_rule());
    }

    #[test]
    fn malformed_entries_are_errors() {
        assert!(
            RateLimitPolicy::new(default_rule())
                .with_endpoint_rules("/api/auth")
                .is_err()
        );
        assert!(
            RateLimitPolicy::new(default_rule())
                .with_endpoint_rules("/api/auth=nope:1:1")
                .is_err()
        );
        assert!(
            RateLimitPolicy::new(default_rule())
                .with_endpoint_rules("  ")
                .is_ok()
        );
    }
}
