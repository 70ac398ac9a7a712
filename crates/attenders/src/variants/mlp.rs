//! Additive attention (Bahdanau et al., 2014).
//!
//! `score_i = U · tanh(W·I[:, i] + b + V·query)`. The `W·I + b` half does not
//! depend on the query and is computed once per sentence in [`bind`].
//!
//! [`bind`]: Attender::bind

use candle_core::Tensor;
use candle_nn::VarBuilder;
use layers::checks;

use crate::batching::truncate_batches;
use crate::core::{
    normalize, validate_query, Attender, AttenderState, AttentionError, AttentionWeights,
    MlpConfig,
};
use crate::encoding::SequenceEncoding;
use crate::masks::{Mask, MASK_BIAS};

/// Pre-mask scores for the active part of the batch.
#[derive(Debug)]
pub(crate) struct RawScores {
    /// `[active_batch, seq_len]`
    pub scores: Tensor,
    /// The sentence mask narrowed to the active batch.
    pub mask: Option<Mask>,
}

#[derive(Debug, Clone)]
struct BoundSentence {
    encoding: SequenceEncoding,
    /// `W·I + b`, laid out `[batch, seq_len, hidden]`.
    projected: Tensor,
}

/// Additive (MLP) attender with optional decoder batch truncation.
#[derive(Debug)]
pub struct MlpAttender {
    config: MlpConfig,
    w: Tensor,
    v: Tensor,
    b: Tensor,
    u: Tensor,
    sentence: Option<BoundSentence>,
}

impl MlpAttender {
    pub const NAME: &'static str = "MlpAttender";

    /// Allocates `W`, `V`, `b`, and `U` through `vb`.
    pub fn new(config: MlpConfig, vb: VarBuilder) -> Result<Self, AttentionError> {
        config.validate()?;
        let (hidden, input, state) = (config.hidden_dim, config.input_dim, config.state_dim);
        let w = config.param_init.get(&vb, (hidden, input), "W")?;
        let v = config.param_init.get(&vb, (hidden, state), "V")?;
        let b = config.bias_init.get(&vb, hidden, "b")?;
        let u = config.param_init.get(&vb, (1, hidden), "U")?;
        Self::from_parameters(config, w, v, b, u)
    }

    /// Builds the attender from already initialised parameters.
    ///
    /// Shapes: `w` `[hidden, input]`, `v` `[hidden, state]`, `b` `[hidden]`,
    /// `u` `[1, hidden]`.
    pub fn from_parameters(
        config: MlpConfig,
        w: Tensor,
        v: Tensor,
        b: Tensor,
        u: Tensor,
    ) -> Result<Self, AttentionError> {
        config.validate()?;
        let (hidden, input, state) = (config.hidden_dim, config.input_dim, config.state_dim);
        checks::expect_shape("mlp.W", &w, &[hidden, input])?;
        checks::expect_shape("mlp.V", &v, &[hidden, state])?;
        checks::expect_shape("mlp.b", &b, &[hidden])?;
        checks::expect_shape("mlp.U", &u, &[1, hidden])?;
        for (name, param) in [("mlp.W", &w), ("mlp.V", &v), ("mlp.b", &b), ("mlp.U", &u)] {
            checks::expect_dtype_in(name, param, checks::FLOAT_DTYPES)?;
        }

        log::info!(
            "attenders::mlp init input_dim={} state_dim={} hidden_dim={} truncate_dec_batches={}",
            input,
            state,
            hidden,
            config.truncate_dec_batches
        );

        Ok(Self {
            config,
            w,
            v,
            b,
            u,
            sentence: None,
        })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    fn project(&self, encoding: &SequenceEncoding) -> Result<Tensor, AttentionError> {
        let (batch, dim, seq_len) = encoding.as_tensor().dims3()?;
        if dim != self.config.input_dim {
            return Err(AttentionError::shape(format!(
                "{}: encoding dim {dim} does not match input_dim {}",
                Self::NAME,
                self.config.input_dim
            )));
        }
        let flat = encoding
            .as_tensor()
            .to_dtype(self.w.dtype())?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch * seq_len, dim))?;
        let affine = flat.matmul(&self.w.t()?)?.broadcast_add(&self.b)?;
        // The affine step runs on the flattened view; restore the per-sentence
        // layout explicitly so a singleton batch or hidden dim never collapses.
        Ok(affine.reshape((batch, seq_len, self.config.hidden_dim))?)
    }

    /// Scores every source position before masking and normalisation.
    pub(crate) fn raw_scores(
        &self,
        attender: &'static str,
        query: &Tensor,
    ) -> Result<RawScores, AttentionError> {
        let sentence = self
            .sentence
            .as_ref()
            .ok_or(AttentionError::UnboundSentence { attender })?;
        let query_batch = validate_query(attender, query, self.config.state_dim)?;
        let mask = sentence.encoding.mask();

        let (query, projected, mask) = if self.config.truncate_dec_batches {
            truncate_batches(query, &sentence.projected, mask)?
        } else {
            if query_batch != sentence.encoding.batch_size() {
                return Err(AttentionError::shape(format!(
                    "{attender}: query batch {query_batch} does not match sentence batch {}",
                    sentence.encoding.batch_size()
                )));
            }
            (query.clone(), sentence.projected.clone(), mask.cloned())
        };

        let (batch, seq_len, hidden) = projected.dims3()?;
        let query = query.to_dtype(projected.dtype())?;
        let state_proj = query.matmul(&self.v.t()?)?.unsqueeze(1)?;
        let activated = projected.broadcast_add(&state_proj)?.tanh()?;
        let scores = activated
            .reshape((batch * seq_len, hidden))?
            .matmul(&self.u.t()?)?
            .reshape((batch, seq_len))?;

        Ok(RawScores { scores, mask })
    }
}

impl Attender for MlpAttender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError> {
        self.sentence = None;
        let projected = self.project(&encoding)?;
        log::debug!(
            "attenders::mlp bind batch={} seq_len={} padded={}",
            encoding.batch_size(),
            encoding.seq_len(),
            encoding.mask().map(Mask::padded_positions).unwrap_or(0)
        );
        self.sentence = Some(BoundSentence {
            encoding,
            projected,
        });
        Ok(())
    }

    fn encoding(&self) -> Result<&SequenceEncoding, AttentionError> {
        self.sentence
            .as_ref()
            .map(|sentence| &sentence.encoding)
            .ok_or(AttentionError::UnboundSentence {
                attender: Self::NAME,
            })
    }

    fn compute_weights(
        &self,
        query: &Tensor,
        _state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError> {
        let RawScores { scores, mask } = self.raw_scores(Self::NAME, query)?;
        let scores = match &mask {
            Some(mask) => mask.add_to_scores(&scores, MASK_BIAS)?,
            None => scores,
        };
        AttentionWeights::new(normalize(&scores)?, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn fixed_attender(truncate: bool) -> Result<MlpAttender, AttentionError> {
        let device = Device::Cpu;
        let mut config = MlpConfig::new(2, 2, 3);
        config.truncate_dec_batches = truncate;
        let w = Tensor::new(&[[0.5f32, -0.25], [0.1, 0.3], [-0.4, 0.2]], &device)?;
        let v = Tensor::new(&[[0.2f32, 0.1], [-0.3, 0.6], [0.05, -0.2]], &device)?;
        let b = Tensor::new(&[0.01f32, -0.02, 0.03], &device)?;
        let u = Tensor::new(&[[1.0f32, -0.5, 0.75]], &device)?;
        MlpAttender::from_parameters(config, w, v, b, u)
    }

    /// Scalar re-derivation of `U · tanh(W·x + b + V·q)`.
    fn naive_scores(
        attender: &MlpAttender,
        encoding: &Tensor,
        query: &Tensor,
    ) -> Result<Vec<Vec<f32>>, AttentionError> {
        let w = attender.w.to_vec2::<f32>()?;
        let v = attender.v.to_vec2::<f32>()?;
        let b = attender.b.to_vec1::<f32>()?;
        let u = attender.u.to_vec2::<f32>()?;
        let enc = encoding.to_vec3::<f32>()?;
        let q = query.to_vec2::<f32>()?;
        let mut out = Vec::new();
        for (batch, matrix) in enc.iter().enumerate() {
            let seq_len = matrix[0].len();
            let mut row = Vec::new();
            for pos in 0..seq_len {
                let mut score = 0f32;
                for h in 0..b.len() {
                    let mut pre = b[h];
                    for (d, column) in matrix.iter().enumerate() {
                        pre += w[h][d] * column[pos];
                    }
                    for (s, value) in q[batch].iter().enumerate() {
                        pre += v[h][s] * value;
                    }
                    score += u[0][h] * pre.tanh();
                }
                row.push(score);
            }
            out.push(row);
        }
        Ok(out)
    }

    #[test]
    fn raw_scores_match_scalar_formula() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let mut attender = fixed_attender(false)?;
        let matrix = Tensor::new(
            &[[[1f32, 0.0, -1.0], [0.5, 2.0, 0.0]], [[0.3f32, -0.7, 1.1], [0.0, 0.4, -0.2]]],
            &device,
        )?;
        let query = Tensor::new(&[[0.2f32, -0.1], [1.0, 0.5]], &device)?;
        attender.bind(SequenceEncoding::new(matrix.clone(), None)?)?;

        let scores = attender.raw_scores(MlpAttender::NAME, &query)?;
        let actual = scores.scores.to_vec2::<f32>()?;
        let expected = naive_scores(&attender, &matrix, &query)?;
        for (a_row, e_row) in actual.iter().zip(expected.iter()) {
            for (a, e) in a_row.iter().zip(e_row.iter()) {
                assert!((a - e).abs() < 1e-5, "{a} vs {e}");
            }
        }
        Ok(())
    }

    #[test]
    fn singleton_dims_keep_their_layout() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let config = MlpConfig::new(2, 2, 1);
        let w = Tensor::new(&[[0.3f32, -0.2]], &device)?;
        let v = Tensor::new(&[[0.1f32, 0.4]], &device)?;
        let b = Tensor::new(&[0.0f32], &device)?;
        let u = Tensor::new(&[[1.5f32]], &device)?;
        let mut attender = MlpAttender::from_parameters(config, w, v, b, u)?;

        let matrix = Tensor::new(&[[[1f32], [2.0]]], &device)?;
        attender.bind(SequenceEncoding::new(matrix, None)?)?;
        let projected = &attender.sentence.as_ref().unwrap().projected;
        assert_eq!(projected.dims(), &[1, 1, 1]);

        let weights = attender.compute_weights(&Tensor::new(&[[0.5f32, 0.5]], &device)?, None)?;
        assert_eq!(weights.to_vec2()?, vec![vec![1.0]]);
        Ok(())
    }

    #[test]
    fn query_batch_must_match_without_truncation() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let mut attender = fixed_attender(false)?;
        let matrix = Tensor::ones((3, 2, 4), DType::F32, &device)?;
        attender.bind(SequenceEncoding::new(matrix, None)?)?;
        let query = Tensor::ones((2, 2), DType::F32, &device)?;
        let err = attender.compute_weights(&query, None).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
        Ok(())
    }

    #[test]
    fn truncation_follows_query_batch() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let mut attender = fixed_attender(true)?;
        let matrix = Tensor::randn(0f32, 1.0, (3, 2, 4), &device)?;
        let mask = Mask::from_lengths(&device, &[4, 3, 2], 4)?;
        attender.bind(SequenceEncoding::new(matrix, Some(mask))?)?;

        let query = Tensor::randn(0f32, 1.0, (2, 2), &device)?;
        let weights = attender.compute_weights(&query, None)?;
        assert_eq!(weights.as_tensor().dims(), &[2, 4]);
        let rows = weights.to_vec2()?;
        assert!(rows[1][3] < 1e-8);

        let context = attender.compute_context(&query, None, Some(&weights))?;
        assert_eq!(context.dims(), &[2, 2]);
        Ok(())
    }

    #[test]
    fn parameters_come_from_var_builder() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let attender = MlpAttender::new(MlpConfig::new(4, 3, 5), vb.pp("attender"))?;
        assert_eq!(attender.w.dims(), &[5, 4]);
        assert_eq!(attender.v.dims(), &[5, 3]);
        assert_eq!(attender.u.dims(), &[1, 5]);
        assert_eq!(attender.b.to_vec1::<f32>()?, vec![0.0; 5]);
        assert_eq!(varmap.all_vars().len(), 4);
        Ok(())
    }

    #[test]
    fn wrong_parameter_shapes_are_rejected() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let w = Tensor::zeros((3, 3), DType::F32, &device)?;
        let v = Tensor::zeros((3, 2), DType::F32, &device)?;
        let b = Tensor::zeros(3, DType::F32, &device)?;
        let u = Tensor::zeros((1, 3), DType::F32, &device)?;
        assert!(MlpAttender::from_parameters(MlpConfig::new(2, 2, 3), w, v, b, u).is_err());
        Ok(())
    }
}
