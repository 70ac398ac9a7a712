//! Decoder batch truncation.
//!
//! Batches are sorted so that sentences finish from the back. Once a trailing
//! sentence is done the decoder stops feeding it, which shows up here as a
//! query with a smaller batch than the bound encoding. Truncation narrows
//! every per-step input to the smallest batch among them, always keeping the
//! leading elements. Re-inserting the dropped elements downstream is the
//! caller's job ([`pad_batch`]).

use candle_core::Tensor;

use crate::core::AttentionError;
use crate::masks::Mask;

/// Keeps the first `batch` entries along dim 0.
pub fn truncate_batch(tensor: &Tensor, batch: usize) -> Result<Tensor, AttentionError> {
    let current = tensor.dims().first().copied().unwrap_or(0);
    if batch > current {
        return Err(AttentionError::shape(format!(
            "cannot truncate batch {current} to {batch}"
        )));
    }
    if batch == current {
        return Ok(tensor.clone());
    }
    Ok(tensor.narrow(0, 0, batch)?)
}

/// Narrows `query`, `projections`, and `mask` to their common smallest batch.
pub fn truncate_batches(
    query: &Tensor,
    projections: &Tensor,
    mask: Option<&Mask>,
) -> Result<(Tensor, Tensor, Option<Mask>), AttentionError> {
    let mut sizes = vec![query.dims()[0], projections.dims()[0]];
    if let Some(mask) = mask {
        sizes.push(mask.batch_size());
    }
    if sizes.contains(&0) {
        return Err(AttentionError::shape("batch sizes must be non-zero"));
    }
    let active = sizes.iter().copied().min().unwrap_or(0);
    let mask = mask.map(|m| m.truncate(active)).transpose()?;
    Ok((
        truncate_batch(query, active)?,
        truncate_batch(projections, active)?,
        mask,
    ))
}

/// Number of leading batch elements whose target-side mask still has a valid
/// position at or after `step`.
///
/// Elements are assumed sorted by decreasing length; the count stops at the
/// first finished element.
pub fn active_batch_size(target_mask: &Mask, step: usize) -> usize {
    (0..target_mask.batch_size())
        .take_while(|&b| (step..target_mask.seq_len()).any(|pos| target_mask.is_valid(b, pos)))
        .count()
}

/// Re-expands a truncated `[active, ...]` result to `full_batch` rows by
/// appending zero rows.
pub fn pad_batch(tensor: &Tensor, full_batch: usize) -> Result<Tensor, AttentionError> {
    let dims = tensor.dims();
    let active = dims.first().copied().unwrap_or(0);
    if active > full_batch {
        return Err(AttentionError::shape(format!(
            "batch {active} already exceeds {full_batch}"
        )));
    }
    if active == full_batch {
        return Ok(tensor.clone());
    }
    let mut filler_dims = dims.to_vec();
    filler_dims[0] = full_batch - active;
    let filler = Tensor::zeros(filler_dims, tensor.dtype(), tensor.device())?;
    Ok(Tensor::cat(&[tensor, &filler], 0)?)
}
