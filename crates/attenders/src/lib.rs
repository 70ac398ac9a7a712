//! Attention mechanisms for sequence-to-sequence decoders.
//!
//! Given an encoded source sentence (batched, possibly padded) and a decoder
//! query at each output step, an [`Attender`] produces a distribution over
//! source positions and the matching context vector. Four scoring functions
//! are provided:
//!
//! * [`MlpAttender`]: additive attention, with optional decoder batch
//!   truncation.
//! * [`DotAttender`]: (scaled) dot-product attention.
//! * [`BilinearAttender`]: `keyᵗ · Wa · query`. It does **not** mask padding.
//! * [`LatticeBiasedMlpAttender`]: additive attention plus per-position lattice
//!   node log-probabilities.
//!
//! The lifecycle is the same for all of them: build an attender (directly or
//! through [`AttentionSettings`]), [`bind`](Attender::bind) each source
//! sentence, then open an [`AttentionSession`] and query it once per decoder
//! step. The session keeps the [`AttentionTrace`] for that sentence.
//!
//! Tensors are batch-first: encodings `[batch, dim, seq_len]`, masks and
//! weights `[batch, seq_len]`, queries `[batch, state_dim]`, contexts
//! `[batch, dim]`.

pub mod batching;
pub mod core;
pub mod encoding;
pub mod masks;
pub mod session;
pub mod variants;

pub use crate::core::{
    weighted_sum, Attender, AttenderConfig, AttenderDefaults, AttenderState, AttentionError,
    AttentionSettings, AttentionWeights, BilinearConfig, DotConfig, MlpConfig,
};
pub use encoding::SequenceEncoding;
pub use masks::Mask;
pub use session::{AttentionSession, AttentionTrace};
pub use variants::{
    AnyAttender, BilinearAttender, DotAttender, Lattice, LatticeBias, LatticeBiasedMlpAttender,
    LatticeNode, MlpAttender,
};
