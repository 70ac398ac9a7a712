//! Builders for padding masks used to drop padded source positions.
//!
//! Every mask keeps two `[batch, seq_len]` tensors with dtype
//! [`MASK_DTYPE`](super::MASK_DTYPE): the validity table itself and its
//! complement, from which additive biases are derived.

use candle_core::{Device, Tensor};

use crate::core::AttentionError;
use crate::masks::MASK_DTYPE;

/// Per-batch-element validity over source positions.
///
/// Every batch element must have at least one valid position; constructors
/// reject degenerate rows with [`AttentionError::DegenerateMask`].
#[derive(Debug, Clone)]
pub struct Mask {
    validity: Tensor,
    padding: Tensor,
    rows: Vec<Vec<bool>>,
    padded: usize,
}

impl Mask {
    /// Builds a mask from a `[batch, seq_len]` tensor where zero marks padding.
    pub fn from_validity(validity: &Tensor) -> Result<Self, AttentionError> {
        let (batch, seq_len) = validity
            .dims2()
            .map_err(|_| AttentionError::shape("mask must have shape [batch, seq_len]"))?;
        let values = validity.to_dtype(MASK_DTYPE)?.to_vec2::<f32>()?;
        let rows: Vec<Vec<bool>> = values
            .iter()
            .map(|row| row.iter().map(|&v| v != 0.0).collect())
            .collect();
        Self::from_rows(validity.device(), rows, batch, seq_len)
    }

    /// Constructs a mask from per-batch valid lengths.
    ///
    /// Lengths beyond `seq_len` are clamped.
    pub fn from_lengths(
        device: &Device,
        lengths: &[usize],
        seq_len: usize,
    ) -> Result<Self, AttentionError> {
        let rows = lengths
            .iter()
            .map(|&valid| {
                let valid = valid.min(seq_len);
                (0..seq_len).map(|pos| pos < valid).collect()
            })
            .collect();
        Self::from_rows(device, rows, lengths.len(), seq_len)
    }

    /// Constructs a mask from boolean padding indicators.
    ///
    /// Each inner slice corresponds to a batch element and must share the same
    /// length. `true` indicates a padded position.
    pub fn from_booleans(device: &Device, padding: &[Vec<bool>]) -> Result<Self, AttentionError> {
        let seq_len = padding.first().map(Vec::len).unwrap_or(0);
        if let Some(row) = padding.iter().find(|row| row.len() != seq_len) {
            return Err(AttentionError::shape(format!(
                "all padding rows must share seq_len {seq_len}, found {}",
                row.len()
            )));
        }
        let rows = padding
            .iter()
            .map(|row| row.iter().map(|&is_padding| !is_padding).collect())
            .collect();
        Self::from_rows(device, rows, padding.len(), seq_len)
    }

    fn from_rows(
        device: &Device,
        rows: Vec<Vec<bool>>,
        batch: usize,
        seq_len: usize,
    ) -> Result<Self, AttentionError> {
        if let Some(batch_index) = rows.iter().position(|row| !row.iter().any(|&v| v)) {
            return Err(AttentionError::DegenerateMask { batch_index });
        }

        let mut valid = Vec::with_capacity(batch * seq_len);
        let mut pad = Vec::with_capacity(batch * seq_len);
        for row in &rows {
            for &is_valid in row {
                valid.push(if is_valid { 1f32 } else { 0f32 });
                pad.push(if is_valid { 0f32 } else { 1f32 });
            }
        }
        let padded = pad.iter().filter(|&&p| p != 0.0).count();

        Ok(Self {
            validity: Tensor::from_vec(valid, (batch, seq_len), device)?,
            padding: Tensor::from_vec(pad, (batch, seq_len), device)?,
            rows,
            padded,
        })
    }

    /// The `[batch, seq_len]` validity table (`1.0` = real position).
    pub fn validity(&self) -> &Tensor {
        &self.validity
    }

    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    pub fn seq_len(&self) -> usize {
        self.validity.dims()[1]
    }

    /// Whether `position` of `batch_index` holds a real token.
    pub fn is_valid(&self, batch_index: usize, position: usize) -> bool {
        self.rows
            .get(batch_index)
            .and_then(|row| row.get(position))
            .copied()
            .unwrap_or(false)
    }

    /// Number of padded entries across the whole batch.
    pub fn padded_positions(&self) -> usize {
        self.padded
    }

    pub fn has_padding(&self) -> bool {
        self.padded > 0
    }

    /// `multiplicator` at padded positions, `0.0` elsewhere.
    pub fn additive_bias(&self, multiplicator: f64) -> Result<Tensor, AttentionError> {
        Ok(self.padding.affine(multiplicator, 0.0)?)
    }

    /// Adds the padding bias to `[batch, seq_len]` scores.
    ///
    /// Scores are returned untouched when nothing is padded.
    pub fn add_to_scores(
        &self,
        scores: &Tensor,
        multiplicator: f64,
    ) -> Result<Tensor, AttentionError> {
        if scores.dims() != self.validity.dims() {
            return Err(AttentionError::shape(format!(
                "scores {:?} do not match mask {:?}",
                scores.dims(),
                self.validity.dims()
            )));
        }
        if !self.has_padding() {
            return Ok(scores.clone());
        }
        let bias = self.additive_bias(multiplicator)?.to_dtype(scores.dtype())?;
        Ok(scores.add(&bias)?)
    }

    /// Keeps only the first `batch` elements.
    pub fn truncate(&self, batch: usize) -> Result<Self, AttentionError> {
        if batch > self.batch_size() {
            return Err(AttentionError::shape(format!(
                "cannot truncate mask of batch {} to {batch}",
                self.batch_size()
            )));
        }
        if batch == self.batch_size() {
            return Ok(self.clone());
        }
        let rows = self.rows[..batch].to_vec();
        let padded = rows.iter().flatten().filter(|&&v| !v).count();
        Ok(Self {
            validity: self.validity.narrow(0, 0, batch)?,
            padding: self.padding.narrow(0, 0, batch)?,
            rows,
            padded,
        })
    }
}
