use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// A structured value together with the usage it cost to produce.
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    pub value: T,
    pub usage: TokenUsage,
}
