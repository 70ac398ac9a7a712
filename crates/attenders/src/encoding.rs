//! Encoded source sentences as consumed by attenders.

use candle_core::Tensor;

use crate::batching::truncate_batch;
use crate::core::AttentionError;
use crate::masks::Mask;

/// Batched encoder output, `[batch, dim, seq_len]`, plus an optional mask.
///
/// Each source position's vector serves both as key and as value. The
/// encoding is immutable once built; attenders clone the (reference counted)
/// tensor when they bind it.
#[derive(Debug, Clone)]
pub struct SequenceEncoding {
    matrix: Tensor,
    mask: Option<Mask>,
}

impl SequenceEncoding {
    /// Wraps an encoder output shaped `[batch, dim, seq_len]`.
    pub fn new(matrix: Tensor, mask: Option<Mask>) -> Result<Self, AttentionError> {
        let (batch, _dim, seq_len) = matrix.dims3().map_err(|_| {
            AttentionError::shape(format!(
                "encoding must be [batch, dim, seq_len], got {:?}",
                matrix.dims()
            ))
        })?;
        if batch == 0 || seq_len == 0 {
            return Err(AttentionError::shape(
                "encoding batch and seq_len must be non-zero",
            ));
        }
        if let Some(mask) = &mask {
            if mask.batch_size() != batch || mask.seq_len() != seq_len {
                return Err(AttentionError::shape(format!(
                    "mask [{}, {}] does not match encoding batch {batch} / seq_len {seq_len}",
                    mask.batch_size(),
                    mask.seq_len()
                )));
            }
            layers::checks::expect_same_device("mask", mask.validity(), "encoding", &matrix)?;
        }
        Ok(Self {
            matrix: matrix.contiguous()?,
            mask,
        })
    }

    /// Stacks per-position encoder states, each `[batch, dim]`, along the
    /// position axis.
    pub fn from_positions(states: &[Tensor], mask: Option<Mask>) -> Result<Self, AttentionError> {
        if states.is_empty() {
            return Err(AttentionError::shape("cannot build an encoding from zero positions"));
        }
        let matrix = Tensor::stack(states, 2)?;
        Self::new(matrix, mask)
    }

    /// The `[batch, dim, seq_len]` source matrix.
    pub fn as_tensor(&self) -> &Tensor {
        &self.matrix
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.matrix.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.matrix.dims()[1]
    }

    pub fn seq_len(&self) -> usize {
        self.matrix.dims()[2]
    }

    /// Keeps only the first `batch` sentences.
    pub fn truncate(&self, batch: usize) -> Result<Self, AttentionError> {
        let mask = self.mask.as_ref().map(|m| m.truncate(batch)).transpose()?;
        Ok(Self {
            matrix: truncate_batch(&self.matrix, batch)?,
            mask,
        })
    }
}
