//! Per-sentence decoding sessions and the attention trace they record.
//!
//! Attenders are stateless between steps. A session borrows a bound attender
//! for the lifetime of one sentence and logs every weight vector it
//! computes, which is what visualisation and coverage-style analyses read
//! afterwards. Rebinding needs `&mut` access to the attender, so a session
//! can never straddle two sentences.

use candle_core::{DType, Tensor};

use crate::core::{Attender, AttenderState, AttentionError, AttentionWeights};

/// Ordered weights computed during one decoding session.
#[derive(Debug, Clone, Default)]
pub struct AttentionTrace {
    steps: Vec<AttentionWeights>,
}

impl AttentionTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[AttentionWeights] {
        &self.steps
    }

    pub fn get(&self, step: usize) -> Option<&AttentionWeights> {
        self.steps.get(step)
    }

    pub(crate) fn push(&mut self, weights: AttentionWeights) {
        self.steps.push(weights);
    }

    /// Step-by-position alignment for one batch element.
    ///
    /// Steps at which the element had already been truncated away are
    /// skipped, so the matrix has one row per step the element took part in.
    pub fn alignment_matrix(&self, batch_index: usize) -> Result<Vec<Vec<f32>>, AttentionError> {
        let mut rows = Vec::with_capacity(self.steps.len());
        for weights in &self.steps {
            if batch_index < weights.batch_size() {
                let row = weights
                    .as_tensor()
                    .get(batch_index)?
                    .to_dtype(DType::F32)?
                    .to_vec1::<f32>()?;
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// A bound attender plus the trace of the sentence being decoded.
pub struct AttentionSession<'a, A: Attender + ?Sized> {
    attender: &'a A,
    trace: AttentionTrace,
}

impl<'a, A: Attender + ?Sized> AttentionSession<'a, A> {
    /// Starts a session; fails if the attender has no bound sentence.
    pub fn new(attender: &'a A) -> Result<Self, AttentionError> {
        attender.encoding()?;
        Ok(Self {
            attender,
            trace: AttentionTrace::default(),
        })
    }

    pub fn attender(&self) -> &'a A {
        self.attender
    }

    /// Computes and records the weights for one decoder step.
    pub fn compute_weights(
        &mut self,
        query: &Tensor,
        state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError> {
        let weights = self.attender.compute_weights(query, state)?;
        self.trace.push(weights.clone());
        Ok(weights)
    }

    /// Computes the context; weights computed here are recorded too.
    pub fn compute_context(
        &mut self,
        query: &Tensor,
        state: Option<&AttenderState>,
        weights: Option<&AttentionWeights>,
    ) -> Result<Tensor, AttentionError> {
        match weights {
            Some(weights) => self.attender.compute_context(query, state, Some(weights)),
            None => {
                let weights = self.compute_weights(query, state)?;
                self.attender.compute_context(query, state, Some(&weights))
            }
        }
    }

    pub fn update(
        &self,
        state: Option<&AttenderState>,
        weights: &AttentionWeights,
    ) -> Option<AttenderState> {
        self.attender.update(state, weights)
    }

    pub fn trace(&self) -> &AttentionTrace {
        &self.trace
    }

    /// Ends the session and hands back its trace.
    pub fn finish(self) -> AttentionTrace {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DotConfig;
    use crate::encoding::SequenceEncoding;
    use crate::masks::Mask;
    use crate::variants::DotAttender;
    use candle_core::Device;

    fn bound_attender() -> Result<DotAttender, AttentionError> {
        let device = Device::Cpu;
        let mut attender = DotAttender::new(DotConfig {
            scale: false,
            truncate_dec_batches: false,
        })?;
        let matrix = Tensor::new(
            &[[[1f32, 0.0, 0.5], [0.0, 1.0, 0.5]], [[2f32, 0.0, 0.0], [0.0, 2.0, 0.0]]],
            &device,
        )?;
        let mask = Mask::from_lengths(&device, &[3, 2], 3)?;
        attender.bind(SequenceEncoding::new(matrix, Some(mask))?)?;
        Ok(attender)
    }

    #[test]
    fn session_requires_bound_attender() -> Result<(), AttentionError> {
        let attender = DotAttender::new(DotConfig::default())?;
        let err = AttentionSession::new(&attender).err().unwrap();
        assert!(matches!(err, AttentionError::UnboundSentence { .. }));
        Ok(())
    }

    #[test]
    fn trace_records_every_computed_step() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let attender = bound_attender()?;
        let mut session = AttentionSession::new(&attender)?;

        let q1 = Tensor::new(&[[1f32, 0.0], [1.0, 0.0]], &device)?;
        let q2 = Tensor::new(&[[0f32, 1.0], [0.0, 1.0]], &device)?;
        let w1 = session.compute_weights(&q1, None)?;
        session.compute_context(&q2, None, None)?;
        // Supplying weights does not record a new step.
        session.compute_context(&q1, None, Some(&w1))?;

        let trace = session.finish();
        assert_eq!(trace.len(), 2);
        let alignment = trace.alignment_matrix(1)?;
        assert_eq!(alignment.len(), 2);
        assert_eq!(alignment[0].len(), 3);
        assert!(alignment[0][2] < 1e-8);
        assert!(trace.alignment_matrix(5)?.is_empty());
        Ok(())
    }

    #[test]
    fn rebinding_starts_a_fresh_trace() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let mut attender = bound_attender()?;
        let query = Tensor::new(&[[1f32, 0.0], [1.0, 0.0]], &device)?;
        {
            let mut session = AttentionSession::new(&attender)?;
            session.compute_weights(&query, None)?;
            assert_eq!(session.trace().len(), 1);
        }
        let matrix = Tensor::new(&[[[1f32, 0.0], [0.0, 1.0]], [[1f32, 1.0], [1.0, 1.0]]], &device)?;
        attender.bind(SequenceEncoding::new(matrix, None)?)?;
        let session = AttentionSession::new(&attender)?;
        assert!(session.trace().is_empty());
        Ok(())
    }
}
