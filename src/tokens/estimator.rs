//! Token estimation using tiktoken, with a character-ratio fallback

use crate::config::TokenizerKind;
use serde_json::Value;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, p50k_base, r50k_base, CoreBPE};
use tracing::warn;

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens of a JSON value in its compact serialized form
    fn estimate_value(&self, value: &Value) -> usize {
        self.estimate(&value.to_string())
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Tiktoken-based token estimator
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
    encoding: &'static str,
}

impl TiktokenEstimator {
    /// Create an estimator for the given BPE encoding
    pub fn new(kind: TokenizerKind) -> anyhow::Result<Self> {
        let (bpe, encoding) = match kind {
            TokenizerKind::Cl100kBase => (cl100k_base()?, "cl100k_base"),
            TokenizerKind::P50kBase => (p50k_base()?, "p50k_base"),
            TokenizerKind::R50kBase => (r50k_base()?, "r50k_base"),
            TokenizerKind::Heuristic => {
                anyhow::bail!("heuristic tokenizer has no BPE encoding")
            }
        };
        Ok(Self {
            bpe: Arc::new(bpe),
            encoding,
        })
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &'static str {
        self.encoding
    }
}

/// Character-ratio estimator (fallback, `len / chars_per_token`)
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }

    fn name(&self) -> &'static str {
        "char_ratio"
    }
}

/// Build the configured estimator, falling back to the character ratio
/// when the BPE tables cannot be loaded
pub fn build_estimator(kind: TokenizerKind) -> Arc<dyn TokenEstimator> {
    if kind == TokenizerKind::Heuristic {
        return Arc::new(CharRatioEstimator::default());
    }

    match TiktokenEstimator::new(kind) {
        Ok(estimator) => Arc::new(estimator),
        Err(e) => {
            warn!("Tokenizer {:?} unavailable ({}), using len/4 heuristic", kind, e);
            Arc::new(CharRatioEstimator::default())
        }
    }
}
