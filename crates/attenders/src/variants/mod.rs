//! Concrete attenders and the tagged union used by the configuration factory.

pub mod bilinear;
pub mod dot;
pub mod lattice;
pub mod mlp;

use candle_core::Tensor;

use crate::core::{Attender, AttenderState, AttentionError, AttentionWeights};
use crate::encoding::SequenceEncoding;

pub use bilinear::BilinearAttender;
pub use dot::DotAttender;
pub use lattice::{Lattice, LatticeBias, LatticeBiasedMlpAttender, LatticeNode};
pub use mlp::MlpAttender;

/// Any of the built-in attenders.
#[derive(Debug)]
pub enum AnyAttender {
    Mlp(MlpAttender),
    Dot(DotAttender),
    Bilinear(BilinearAttender),
    LatticeBiasedMlp(LatticeBiasedMlpAttender),
}

impl AnyAttender {
    fn inner(&self) -> &dyn Attender {
        match self {
            AnyAttender::Mlp(a) => a,
            AnyAttender::Dot(a) => a,
            AnyAttender::Bilinear(a) => a,
            AnyAttender::LatticeBiasedMlp(a) => a,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Attender {
        match self {
            AnyAttender::Mlp(a) => a,
            AnyAttender::Dot(a) => a,
            AnyAttender::Bilinear(a) => a,
            AnyAttender::LatticeBiasedMlp(a) => a,
        }
    }

    /// Forwards the sentence-start event. Only the lattice-biased attender
    /// listens; the others ignore it.
    pub fn on_sentence_start(&mut self, lattices: &[Lattice]) {
        if let AnyAttender::LatticeBiasedMlp(attender) = self {
            attender.on_sentence_start(lattices);
        }
    }
}

impl Attender for AnyAttender {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError> {
        self.inner_mut().bind(encoding)
    }

    fn encoding(&self) -> Result<&SequenceEncoding, AttentionError> {
        self.inner().encoding()
    }

    fn compute_weights(
        &self,
        query: &Tensor,
        state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError> {
        self.inner().compute_weights(query, state)
    }

    fn compute_context(
        &self,
        query: &Tensor,
        state: Option<&AttenderState>,
        weights: Option<&AttentionWeights>,
    ) -> Result<Tensor, AttentionError> {
        self.inner().compute_context(query, state, weights)
    }

    fn update(
        &self,
        state: Option<&AttenderState>,
        weights: &AttentionWeights,
    ) -> Option<AttenderState> {
        self.inner().update(state, weights)
    }
}
