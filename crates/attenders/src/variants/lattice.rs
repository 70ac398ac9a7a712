//! Additive attention over lattice inputs, biased toward confident nodes.
//!
//! The attender reuses [`MlpAttender`]'s parameters and projections and only
//! changes the last scoring step: each position's score gains the node's
//! marginal log-probability, and padding is suppressed with
//! [`LATTICE_MASK_BIAS`] instead of the usual `-100`.
//!
//! The bias comes from a separate, earlier event than [`Attender::bind`]: the
//! lattice source announces each sentence through
//! [`LatticeBiasedMlpAttender::on_sentence_start`] before the encoding exists.

use std::sync::OnceLock;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;

use crate::batching::truncate_batch;
use crate::core::{
    normalize, Attender, AttenderState, AttentionError, AttentionWeights, MlpConfig,
};
use crate::encoding::SequenceEncoding;
use crate::masks::{LATTICE_MASK_BIAS, LATTICE_PADDING_BIAS};
use crate::variants::mlp::{MlpAttender, RawScores};

/// The part of a lattice node the attender consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeNode {
    pub marginal_log_prob: f32,
}

/// Topologically ordered lattice nodes for one batch element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lattice {
    pub nodes: Vec<LatticeNode>,
}

impl Lattice {
    pub fn new(nodes: Vec<LatticeNode>) -> Self {
        Self { nodes }
    }

    pub fn from_log_probs(log_probs: &[f32]) -> Self {
        Self::new(
            log_probs
                .iter()
                .map(|&marginal_log_prob| LatticeNode { marginal_log_prob })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Per-sentence `[batch, seq_len]` table of node log-probabilities.
///
/// Built on the host when the sentence starts; the tensor is materialised
/// once, on first use.
#[derive(Debug)]
pub struct LatticeBias {
    values: Vec<f32>,
    batch: usize,
    seq_len: usize,
    tensor: OnceLock<Tensor>,
}

impl LatticeBias {
    /// Lays out one row per lattice, padded to the longest lattice.
    pub fn from_lattices(lattices: &[Lattice]) -> Self {
        let seq_len = lattices.iter().map(Lattice::len).max().unwrap_or(0);
        let batch = lattices.len();
        let mut values = vec![LATTICE_PADDING_BIAS; batch * seq_len];
        for (b, lattice) in lattices.iter().enumerate() {
            for (pos, node) in lattice.nodes.iter().enumerate() {
                values[b * seq_len + pos] = node.marginal_log_prob;
            }
        }
        Self {
            values,
            batch,
            seq_len,
            tensor: OnceLock::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Host-side bias at (`batch_index`, `position`).
    pub fn value(&self, batch_index: usize, position: usize) -> Option<f32> {
        if batch_index < self.batch && position < self.seq_len {
            Some(self.values[batch_index * self.seq_len + position])
        } else {
            None
        }
    }

    /// The bias as a `[batch, seq_len]` tensor on `device`.
    pub fn tensor(&self, device: &Device) -> Result<Tensor, AttentionError> {
        if let Some(tensor) = self.tensor.get() {
            return Ok(tensor.to_device(device)?);
        }
        log::debug!(
            "attenders::lattice materialising bias batch={} seq_len={}",
            self.batch,
            self.seq_len
        );
        let tensor = Tensor::from_slice(&self.values, (self.batch, self.seq_len), device)?;
        // A concurrent initialiser may win the race; both tensors are identical.
        let _ = self.tensor.set(tensor.clone());
        Ok(tensor)
    }

    /// The bias widened to `seq_len` positions.
    ///
    /// A padded batch can be longer than its longest lattice; the extra
    /// positions get [`LATTICE_PADDING_BIAS`].
    pub fn padded_tensor(&self, device: &Device, seq_len: usize) -> Result<Tensor, AttentionError> {
        if seq_len < self.seq_len {
            return Err(AttentionError::shape(format!(
                "lattice bias covers {} positions, cannot fit it to {seq_len}",
                self.seq_len
            )));
        }
        if seq_len == self.seq_len {
            return self.tensor(device);
        }
        let filler = Tensor::full(
            LATTICE_PADDING_BIAS,
            (self.batch, seq_len - self.seq_len),
            device,
        )?;
        if self.seq_len == 0 {
            return Ok(filler);
        }
        Ok(Tensor::cat(&[&self.tensor(device)?, &filler], 1)?)
    }
}

/// MLP attender whose scores are shifted by lattice node confidences.
#[derive(Debug)]
pub struct LatticeBiasedMlpAttender {
    mlp: MlpAttender,
    bias: Option<LatticeBias>,
}

impl LatticeBiasedMlpAttender {
    pub const NAME: &'static str = "LatticeBiasedMlpAttender";

    pub fn new(config: MlpConfig, vb: VarBuilder) -> Result<Self, AttentionError> {
        Ok(Self::from_mlp(MlpAttender::new(config, vb)?))
    }

    /// Wraps an existing MLP attender, sharing its parameters.
    pub fn from_mlp(mlp: MlpAttender) -> Self {
        Self { mlp, bias: None }
    }

    pub fn config(&self) -> &MlpConfig {
        self.mlp.config()
    }

    /// Records the bias for the sentence about to be decoded, replacing the
    /// previous sentence's.
    pub fn on_sentence_start(&mut self, lattices: &[Lattice]) {
        let bias = LatticeBias::from_lattices(lattices);
        log::debug!(
            "attenders::lattice sentence start batch={} seq_len={}",
            bias.batch_size(),
            bias.seq_len()
        );
        self.bias = Some(bias);
    }

    pub fn bias(&self) -> Option<&LatticeBias> {
        self.bias.as_ref()
    }
}

impl Attender for LatticeBiasedMlpAttender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError> {
        self.mlp.bind(encoding)
    }

    fn encoding(&self) -> Result<&SequenceEncoding, AttentionError> {
        self.mlp
            .encoding()
            .map_err(|_| AttentionError::UnboundSentence {
                attender: Self::NAME,
            })
    }

    fn compute_weights(
        &self,
        query: &Tensor,
        _state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError> {
        let RawScores { scores, mask } = self.mlp.raw_scores(Self::NAME, query)?;
        let bias = self.bias.as_ref().ok_or(AttentionError::MissingLatticeBias)?;

        let encoding = self.encoding()?;
        if bias.batch_size() != encoding.batch_size() || bias.seq_len() > encoding.seq_len() {
            return Err(AttentionError::shape(format!(
                "lattice bias [{}, {}] does not fit sentence [{}, {}]",
                bias.batch_size(),
                bias.seq_len(),
                encoding.batch_size(),
                encoding.seq_len()
            )));
        }

        let scores = match &mask {
            Some(mask) => mask.add_to_scores(&scores, LATTICE_MASK_BIAS)?,
            None => scores,
        };
        let (active, _) = scores.dims2()?;
        let prior = bias.padded_tensor(scores.device(), encoding.seq_len())?;
        let prior = truncate_batch(&prior, active)?.to_dtype(scores.dtype())?;
        AttentionWeights::new(normalize(&scores.add(&prior)?)?, true)
    }
}
