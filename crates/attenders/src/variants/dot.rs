//! Dot-product attention (Luong et al., 2015), optionally scaled by
//! `1/sqrt(d)` as in Vaswani et al. (2017).

use candle_core::Tensor;

use crate::core::{
    normalize, validate_query, Attender, AttenderState, AttentionError, AttentionWeights,
    DotConfig,
};
use crate::encoding::SequenceEncoding;
use crate::masks::MASK_BIAS;

#[derive(Debug, Clone)]
struct BoundSentence {
    encoding: SequenceEncoding,
    /// `Iᵗ`, laid out `[batch, seq_len, dim]`.
    keys: Tensor,
}

/// Parameter-free dot-product attender.
#[derive(Debug)]
pub struct DotAttender {
    config: DotConfig,
    sentence: Option<BoundSentence>,
}

impl DotAttender {
    pub const NAME: &'static str = "DotAttender";

    /// Fails with [`AttentionError::UnsupportedConfiguration`] when batch
    /// truncation is requested.
    pub fn new(config: DotConfig) -> Result<Self, AttentionError> {
        if config.truncate_dec_batches {
            return Err(AttentionError::UnsupportedConfiguration {
                attender: Self::NAME,
                option: "truncate_dec_batches",
            });
        }
        log::info!("attenders::dot init scale={}", config.scale);
        Ok(Self {
            config,
            sentence: None,
        })
    }

    pub fn config(&self) -> &DotConfig {
        &self.config
    }

    /// Pre-mask scores `Iᵗ · query`, divided by `sqrt(dim)` when scaling.
    pub fn scores(&self, query: &Tensor) -> Result<Tensor, AttentionError> {
        let sentence = self
            .sentence
            .as_ref()
            .ok_or(AttentionError::UnboundSentence {
                attender: Self::NAME,
            })?;
        let dim = sentence.encoding.dim();
        let batch = validate_query(Self::NAME, query, dim)?;
        if batch != sentence.encoding.batch_size() {
            return Err(AttentionError::shape(format!(
                "{}: query batch {batch} does not match sentence batch {}",
                Self::NAME,
                sentence.encoding.batch_size()
            )));
        }

        let query = query.to_dtype(sentence.keys.dtype())?.unsqueeze(2)?;
        let scores = sentence.keys.matmul(&query)?.squeeze(2)?;
        if self.config.scale {
            Ok(scores.affine(1.0 / (dim as f64).sqrt(), 0.0)?)
        } else {
            Ok(scores)
        }
    }
}

impl Attender for DotAttender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bind(&mut self, encoding: SequenceEncoding) -> Result<(), AttentionError> {
        let keys = encoding.as_tensor().transpose(1, 2)?.contiguous()?;
        log::debug!(
            "attenders::dot bind batch={} seq_len={}",
            encoding.batch_size(),
            encoding.seq_len()
        );
        self.sentence = Some(BoundSentence { encoding, keys });
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
        let scores = self.scores(query)?;
        let scores = match self.encoding()?.mask() {
            Some(mask) => mask.add_to_scores(&scores, MASK_BIAS)?,
            None => scores,
        };
        AttentionWeights::new(normalize(&scores)?, true)
    }
}
