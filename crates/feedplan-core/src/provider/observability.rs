//! Per-invocation records and cost estimation.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One backend invocation: a primary attempt or the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub backend: String,
    pub model: String,
    /// 1-based attempt number; the fallback records the attempt after the
    /// last primary attempt.
    pub attempt: u32,
    pub latency_ms: u64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
    pub fallback: bool,
}

/// Receiver for invocation records.
///
/// `record` must not block; implementations that do I/O hand the record
/// off to a background task.
pub trait ObservabilitySink: Send + Sync {
    fn record(&self, record: InvocationRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn record(&self, _record: InvocationRecord) {}
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<InvocationRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<InvocationRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, record: InvocationRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    pub const FREE: ModelPricing = ModelPricing::new(0.0, 0.0);

    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) * self.input_per_million
            + f64::from(completion_tokens) * self.output_per_million)
            / 1_000_000.0
    }
}

// More specific prefixes first: "claude-3-5-haiku" must not match "claude-3-haiku".
const ANTHROPIC_PRICING: [(&str, ModelPricing); 4] = [
    ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0)),
    ("claude-3-5-haiku", ModelPricing::new(1.0, 5.0)),
    ("claude-3-haiku", ModelPricing::new(0.25, 1.25)),
    ("claude-3-opus", ModelPricing::new(15.0, 75.0)),
];

/// Price table entry for a backend/model pair.
///
/// Local backends are free; unknown hosted models have no price.
pub fn pricing_for(backend: &str, model: &str) -> Option<ModelPricing> {
    match backend {
        "ollama" | "static" => Some(ModelPricing::FREE),
        _ => ANTHROPIC_PRICING
            .iter()
            .find(|(prefix, _)| model.contains(prefix))
            .map(|(_, pricing)| *pricing),
    }
}

/// Estimated cost, when both the price and the token counts are known.
pub fn estimate_cost(
    backend: &str,
    model: &str,
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
) -> Option<f64> {
    let pricing = pricing_for(backend, model)?;
    if pricing == ModelPricing::FREE {
        return Some(0.0);
    }
    Some(pricing.cost(prompt_tokens?, completion_tokens?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_model_match() {
        let p = pricing_for("anthropic", "claude-3-5-haiku-20241022").unwrap();
        assert_eq!(p, ModelPricing::new(1.0, 5.0));
        let p = pricing_for("anthropic", "claude-3-haiku-20240307").unwrap();
        assert_eq!(p, ModelPricing::new(0.25, 1.25));
        assert!(pricing_for("anthropic", "gpt-4o").is_none());
    }

    #[test]
    fn cost_estimate() {
        let cost = estimate_cost("anthropic", "claude-3-5-sonnet-latest", Some(1_000_000), Some(100_000))
            .unwrap();
        assert!((cost - 4.5).abs() < 1e-9);
        assert_eq!(estimate_cost("anthropic", "claude-3-5-sonnet", None, Some(10)), None);
        assert_eq!(estimate_cost("ollama", "llama3", None, None), Some(0.0));
        assert_eq!(estimate_cost("static", "static", None, None), Some(0.0));
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        for attempt in 1..=2 {
            sink.record(InvocationRecord {
                backend: "anthropic".into(),
                model: "m".into(),
                attempt,
                latency_ms: 0,
                prompt_tokens: None,
                completion_tokens: None,
                cost_usd: None,
                error: None,
                fallback: false,
            });
        }
        let attempts: Vec<_> = sink.records().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
    }
}
