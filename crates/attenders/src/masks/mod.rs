//! Padding masks and the additive biases derived from them.
//!
//! A [`Mask`] is a `[batch, seq_len]` validity table (`1.0` real position,
//! `0.0` padding). Masks are only ever applied additively: padded scores are
//! pushed towards `-inf` by a large negative multiplicator before the softmax,
//! so padded weights become negligible without a renormalisation pass.

pub mod padding;

use candle_core::DType;

/// Dtype shared by validity tables and additive biases.
pub const MASK_DTYPE: DType = DType::F32;

/// Bias added at padded positions by the MLP and dot-product attenders.
pub const MASK_BIAS: f64 = -100.0;

/// Bias added at padded positions by the lattice-biased attender, whose
/// scores carry log-probability priors of much larger magnitude.
pub const LATTICE_MASK_BIAS: f64 = -1e10;

/// Lattice prior for positions past the end of a lattice. Same magnitude as
/// [`LATTICE_MASK_BIAS`].
pub const LATTICE_PADDING_BIAS: f32 = LATTICE_MASK_BIAS as f32;

pub use padding::Mask;

#[cfg(test)]
mod tests;
