//! Bilinear ("general") attention: `score_i = I[:, i]ᵗ · Wa · query`.
//!
//! This attender does not apply the padding mask. Padded positions are scored
//! and normalised like real ones; every call logs a warning and the returned
//! weights report `mask_applied() == false`.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use layers::checks;

use crate::core::{
    normalize, validate_query, Attender, AttenderState, AttentionError, AttentionWeights,
    BilinearConfig,
};
use crate::encoding::SequenceEncoding;

/// Bilinear attender with a learned `[input_dim, state_dim]` matrix.
///
/// The query contracts with the second axis of `Wa`. Checkpoints whose `Wa`
/// contracts the query with its first axis must be transposed on load.
#[derive(Debug)]
pub struct BilinearAttender {
    config: BilinearConfig,
    wa: Tensor,
    sentence: Option<SequenceEncoding>,
}

impl BilinearAttender {
    pub const NAME: &'static str = "BilinearAttender";

    /// Allocates `Wa` through `vb`.
    pub fn new(config: BilinearConfig, vb: VarBuilder) -> Result<Self, AttentionError> {
        Self::reject_truncation(&config)?;
        config.validate()?;
        let wa = config
            .param_init
            .get(&vb, (config.input_dim, config.state_dim), "Wa")?;
        Self::from_parameters(config, wa)
    }

    pub fn from_parameters(config: BilinearConfig, wa: Tensor) -> Result<Self, AttentionError> {
        Self::reject_truncation(&config)?;
        config.validate()?;
        checks::expect_shape("bilinear.Wa", &wa, &[config.input_dim, config.state_dim])?;
        checks::expect_dtype_in("bilinear.Wa", &wa, checks::FLOAT_DTYPES)?;
        log::info!(
            "attenders::bilinear init input_dim={} state_dim={}",
            config.input_dim,
            config.state_dim
        );
        Ok(Self {
            config,
            wa,
            sentence: None,
        })
    }

    fn reject_truncation(config: &BilinearConfig) -> Result<(), AttentionError> {
        if config.truncate_dec_batches {
            return Err(AttentionError::UnsupportedConfiguration {
                attender: Self::NAME,
                option: "truncate_dec_batches",
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &BilinearConfig {
        &self.config
    }
}

impl Attender for BilinearAttender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError> {
        if encoding.dim() != self.config.input_dim {
            return Err(AttentionError::shape(format!(
                "{}: encoding dim {} does not match input_dim {}",
                Self::NAME,
                encoding.dim(),
                self.config.input_dim
            )));
        }
        log::debug!(
            "attenders::bilinear bind batch={} seq_len={}",
            encoding.batch_size(),
            encoding.seq_len()
        );
        self.sentence = Some(encoding);
        Ok(())
    }

    fn encoding(&self) -> Result<&SequenceEncoding, AttentionError> {
        self.sentence.as_ref().ok_or(AttentionError::UnboundSentence {
            attender: Self::NAME,
        })
    }

    fn compute_weights(
        &self,
        query: &Tensor,
        _state: Option<&AttenderState>,
    ) -> Result<AttentionWeights, AttentionError> {
        let encoding = self.encoding()?;
        let batch = validate_query(Self::NAME, query, self.config.state_dim)?;
        if batch != encoding.batch_size() {
            return Err(AttentionError::shape(format!(
                "{}: query batch {batch} does not match sentence batch {}",
                Self::NAME,
                encoding.batch_size()
            )));
        }
        log::warn!(
            "{} does not apply the padding mask; padded positions receive attention weight",
            Self::NAME
        );

        let matrix = encoding.as_tensor().to_dtype(self.wa.dtype())?;
        let projected = query.to_dtype(self.wa.dtype())?.matmul(&self.wa.t()?)?;
        let scores = projected.unsqueeze(1)?.matmul(&matrix)?.squeeze(1)?;
        AttentionWeights::new(normalize(&scores)?, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn truncation_is_rejected_at_construction() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let mut config = BilinearConfig::new(4, 4);
        config.truncate_dec_batches = true;
        let err = BilinearAttender::new(config, vb).unwrap_err();
        assert!(matches!(err, AttentionError::UnsupportedConfiguration { .. }));
        assert!(varmap.all_vars().is_empty());
    }

    #[test]
    fn scores_follow_bilinear_form() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        // input_dim 2, state_dim 3.
        let wa = Tensor::new(&[[1f32, 0.0, 2.0], [0.0, -1.0, 0.5]], &device)?;
        let mut attender = BilinearAttender::from_parameters(BilinearConfig::new(2, 3), wa)?;
        let matrix = Tensor::new(&[[[1f32, 0.0], [0.0, 1.0]]], &device)?;
        attender.bind(SequenceEncoding::new(matrix, None)?)?;

        // Wa · q = [1 + 2 * 0.5, -1 + 0.25] = [2.0, -0.75]
        let query = Tensor::new(&[[1f32, 1.0, 0.5]], &device)?;
        let weights = attender.compute_weights(&query, None)?;
        assert!(!weights.mask_applied());

        let expected_first = 1.0 / (1.0 + (-2.75f32).exp());
        let rows = weights.to_vec2()?;
        assert!((rows[0][0] - expected_first).abs() < 1e-6);
        assert!((rows[0][1] - (1.0 - expected_first)).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn bind_checks_input_dim() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let wa = Tensor::zeros((2, 2), DType::F32, &device)?;
        let mut attender = BilinearAttender::from_parameters(BilinearConfig::new(2, 2), wa)?;
        let matrix = Tensor::zeros((1, 3, 4), DType::F32, &device)?;
        assert!(attender.bind(SequenceEncoding::new(matrix, None)?).is_err());
        Ok(())
    }
}
