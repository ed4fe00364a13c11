//! Per-request model settings and token accounting

use serde::{Deserialize, Serialize};

/// Token usage reported by a provider.
///
/// Usage is additive, so a turn that makes several model calls can sum them:
///
/// ```
/// use rig_taskerbot::llm::TokenUsage;
///
/// let mut turn = TokenUsage::default();
/// turn += TokenUsage::new(120, 30);
/// turn += TokenUsage::new(200, 45);
/// assert_eq!(turn.total_tokens, 395);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }

    pub fn from_rig_usage(usage: &rig::completion::Usage) -> Self {
        Self::new(usage.input_tokens, usage.output_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Sampling overrides for a single model call.
///
/// The planner, validator and responder each pass their own config so that
/// one provider instance can serve all three roles.
///
/// ```
/// use rig_taskerbot::llm::LLMConfig;
///
/// let planning = LLMConfig::new("gpt-4o-mini").with_temperature(0.1);
/// assert_eq!(planning.temperature, Some(0.1));
/// assert_eq!(planning.max_tokens, None);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LLMConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl LLMConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}
