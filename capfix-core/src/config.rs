//! Tunable knobs for the suggestion pipeline and the generative service.
//!
//! Both structs deserialize from TOML tables (`[suggest]`, `[service]`) with
//! every field optional. Values that make no sense (zero batch sizes,
//! non-positive ratios) are reset to their defaults by `sanitized()`.

use serde::Deserialize;

use crate::validate::AcceptanceLimits;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Pipeline limits. See field docs for defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Segments considered per run; the rest are ignored. Default 80.
    pub max_segments: usize,
    /// Segments per diagnosis request. Default 12.
    pub diagnosis_batch_size: usize,
    /// Diagnosis requests in flight at once. Default 4.
    pub diagnosis_concurrency: usize,
    /// Upper bound on rewrite targets and on returned candidates. Default 24.
    pub max_selected: usize,
    /// Floor on rewrite targets once padding applies. Default 6.
    pub min_selected: usize,
    /// Transcripts with fewer working segments than this are never padded. Default 10.
    pub padding_threshold: usize,
    pub max_char_delta: usize,
    pub max_length_ratio: f64,
    pub min_length_ratio: f64,
    pub temperature: f32,
    pub model: String,
    /// Per-request deadline in milliseconds. Default 60 000.
    pub request_timeout_ms: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        let limits = AcceptanceLimits::default();
        Self {
            max_segments: 80,
            diagnosis_batch_size: 12,
            diagnosis_concurrency: 4,
            max_selected: 24,
            min_selected: 6,
            padding_threshold: 10,
            max_char_delta: limits.max_char_delta,
            max_length_ratio: limits.max_ratio,
            min_length_ratio: limits.min_ratio,
            temperature: 0.2,
            model: DEFAULT_MODEL.to_owned(),
            request_timeout_ms: 60_000,
        }
    }
}

impl SuggestConfig {
    /// Replaces out-of-range values with defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let positive = |value: usize, fallback: usize| if value > 0 { value } else { fallback };
        let ratio = |value: f64, fallback: f64| if value.is_finite() && value > 0.0 { value } else { fallback };

        self.max_segments = positive(self.max_segments, defaults.max_segments);
        self.diagnosis_batch_size = positive(self.diagnosis_batch_size, defaults.diagnosis_batch_size);
        self.diagnosis_concurrency = positive(self.diagnosis_concurrency, defaults.diagnosis_concurrency);
        self.max_selected = positive(self.max_selected, defaults.max_selected);
        self.min_selected = self.min_selected.min(self.max_selected);
        self.max_char_delta = positive(self.max_char_delta, defaults.max_char_delta);
        self.max_length_ratio = ratio(self.max_length_ratio, defaults.max_length_ratio);
        self.min_length_ratio = ratio(self.min_length_ratio, defaults.min_length_ratio);
        if self.min_length_ratio > self.max_length_ratio {
            self.min_length_ratio = defaults.min_length_ratio;
            self.max_length_ratio = defaults.max_length_ratio;
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            self.temperature = defaults.temperature;
        }
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
        self.request_timeout_ms = if self.request_timeout_ms > 0 {
            self.request_timeout_ms
        } else {
            defaults.request_timeout_ms
        };
        self
    }

    pub fn acceptance_limits(&self) -> AcceptanceLimits {
        AcceptanceLimits {
            max_char_delta: self.max_char_delta,
            max_ratio: self.max_length_ratio,
            min_ratio: self.min_length_ratio,
        }
    }
}

/// Where and how to reach the chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_restores_defaults() {
        let config = SuggestConfig {
            max_segments: 0,
            diagnosis_batch_size: 0,
            max_selected: 4,
            min_selected: 9,
            max_length_ratio: -1.0,
            min_length_ratio: f64::NAN,
            model: " ".into(),
            request_timeout_ms: 0,
            ..SuggestConfig::default()
        }
        .sanitized();

        let defaults = SuggestConfig::default();
        assert_eq!(config.max_segments, defaults.max_segments);
        assert_eq!(config.diagnosis_batch_size, defaults.diagnosis_batch_size);
        assert_eq!(config.min_selected, 4);
        assert_eq!(config.max_length_ratio, defaults.max_length_ratio);
        assert_eq!(config.min_length_ratio, defaults.min_length_ratio);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout_ms, defaults.request_timeout_ms);
    }

    #[test]
    fn limits_follow_config() {
        let config = SuggestConfig { max_char_delta: 12, ..SuggestConfig::default() };
        assert_eq!(config.acceptance_limits().max_char_delta, 12);
    }
}
