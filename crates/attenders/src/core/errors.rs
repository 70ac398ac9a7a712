//! Error types emitted by attenders.
//!
//! Every variant is a precondition violation: none is retried or coerced
//! into default weights inside this crate.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The attender cannot honour the requested option.
    #[error("{attender} does not support {option}")]
    UnsupportedConfiguration {
        attender: &'static str,
        option: &'static str,
    },
    /// Weights or contexts were requested before a sentence was bound.
    #[error("{attender} has no bound sentence; call bind() first")]
    UnboundSentence { attender: &'static str },
    /// The lattice-biased attender scored a sentence it never saw start.
    #[error("no lattice bias for the current sentence; on_sentence_start() was not called")]
    MissingLatticeBias,
    /// A batch element has no valid source position.
    #[error("mask row {batch_index} has no valid position")]
    DegenerateMask { batch_index: usize },
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("invalid tensor shape: {context}")]
    InvalidShape { context: String },
    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A Candle failure propagated to the caller.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}

impl AttentionError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        Self::InvalidShape {
            context: context.into(),
        }
    }
}

impl From<std::io::Error> for AttentionError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AttentionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::de::Error> for AttentionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
