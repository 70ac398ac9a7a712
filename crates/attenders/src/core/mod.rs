//! Core traits and types shared across attenders.
//!
//! Tensors are batch-first. A bound [`SequenceEncoding`] holds the source
//! matrix shaped `[batch, dim, seq_len]`; queries are `[batch, state_dim]`;
//! weights come back as `[batch, seq_len]` and contexts as `[batch, dim]`.
//! Every variant returns the same [`AttentionWeights`] type, so callers never
//! have to care which orientation a scoring function produces internally.

pub mod config;
pub mod errors;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::batching::truncate_batch;
use crate::encoding::SequenceEncoding;

pub use config::{
    AttenderConfig, AttenderDefaults, AttentionSettings, BilinearConfig, DotConfig, MlpConfig,
};
pub use errors::AttentionError;

/// Per-step state threaded between weight and context computation.
///
/// None of the built-in attenders keep per-step state; the type exists so
/// stateful variants (coverage, alignment history) can slot into the same
/// interface.
#[derive(Debug, Clone, Default)]
pub struct AttenderState;

/// Normalised attention distribution over source positions.
#[derive(Debug, Clone)]
pub struct AttentionWeights {
    probs: Tensor,
    mask_applied: bool,
}

impl AttentionWeights {
    /// Wraps a `[batch, seq_len]` probability tensor.
    ///
    /// `mask_applied` records whether padded positions were suppressed before
    /// normalisation.
    pub fn new(probs: Tensor, mask_applied: bool) -> Result<Self, AttentionError> {
        if probs.rank() != 2 {
            return Err(AttentionError::shape(format!(
                "attention weights must be [batch, seq_len], got {:?}",
                probs.dims()
            )));
        }
        Ok(Self {
            probs,
            mask_applied,
        })
    }

    pub fn as_tensor(&self) -> &Tensor {
        &self.probs
    }

    pub fn into_tensor(self) -> Tensor {
        self.probs
    }

    /// The weights as `[batch, seq_len, 1]` column vectors.
    pub fn as_column(&self) -> Result<Tensor, AttentionError> {
        Ok(self.probs.unsqueeze(2)?)
    }

    pub fn batch_size(&self) -> usize {
        self.probs.dims()[0]
    }

    pub fn seq_len(&self) -> usize {
        self.probs.dims()[1]
    }

    /// Copies the weights to the host, one row per batch element.
    pub fn to_vec2(&self) -> Result<Vec<Vec<f32>>, AttentionError> {
        Ok(self.probs.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }

    /// Whether padded positions were suppressed before normalisation.
    ///
    /// Only the bilinear attender returns `false`.
    pub fn mask_applied(&self) -> bool {
        self.mask_applied
    }
}

/// Unified interface for attention over an encoded source sentence.
///
/// `bind` must be called once per sentence before any weights or contexts are
/// requested; doing otherwise yields [`AttentionError::UnboundSentence`].
pub trait Attender: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Binds a new source sentence, replacing the previous one and rebuilding
    /// any cached projections.
    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError>;

    /// The currently bound sentence.
    fn encoding(&self) -> Result<&SequenceEncoding, AttentionError>;

    /// Computes normalised attention weights for `query` (`[batch, state_dim]`).
    fn compute_weights(
        &self,
        query: &Tensor,
        state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError>;

    /// Computes the context vector `I · weights` for each batch element.
    ///
    /// When `weights` is `None` they are computed from `query` first.
    fn compute_context(
        &self,
        query: &Tensor,
        state: Option<&AttenderState>,
        weights: Option<&AttentionWeights>,
    ) -> Result<Tensor, AttentionError> {
        match weights {
            Some(weights) => weighted_sum(self.encoding()?, weights),
            None => {
                let weights = self.compute_weights(query, state)?;
                weighted_sum(self.encoding()?, &weights)
            }
        }
    }

    /// Advances the attender state after a step. Stateless attenders return `None`.
    fn update(
        &self,
        _state: Option<&AttenderState>,
        _weights: &AttentionWeights,
    ) -> Option<AttenderState> {
        None
    }
}

/// Linear combination of source vectors, `[batch, dim]`.
///
/// Weights produced under batch truncation cover only the leading batch
/// elements; the encoding is narrowed to match.
pub fn weighted_sum(
    encoding: &SequenceEncoding,
    weights: &AttentionWeights,
) -> Result<Tensor, AttentionError> {
    if weights.seq_len() != encoding.seq_len() {
        return Err(AttentionError::shape(format!(
            "weights cover {} positions but the sentence has {}",
            weights.seq_len(),
            encoding.seq_len()
        )));
    }
    let batch = weights.batch_size();
    if batch > encoding.batch_size() {
        return Err(AttentionError::shape(format!(
            "weights batch {batch} exceeds sentence batch {}",
            encoding.batch_size()
        )));
    }
    let matrix = truncate_batch(encoding.as_tensor(), batch)?;
    let column = weights.as_column()?.to_dtype(matrix.dtype())?;
    Ok(matrix.matmul(&column)?.squeeze(2)?)
}

/// Checks a query is `[batch, state_dim]` and returns its batch size.
pub(crate) fn validate_query(
    attender: &'static str,
    query: &Tensor,
    state_dim: usize,
) -> Result<usize, AttentionError> {
    match query.dims() {
        [batch, dim] if *dim == state_dim && *batch > 0 => Ok(*batch),
        dims => Err(AttentionError::shape(format!(
            "{attender}: query must be [batch, {state_dim}], got {dims:?}"
        ))),
    }
}

/// Softmax over the position axis.
pub(crate) fn normalize(scores: &Tensor) -> Result<Tensor, AttentionError> {
    Ok(softmax_last_dim(&scores.contiguous()?)?)
}
