//! Configuration for the attender family.
//!
//! Two layers live here. The resolved structs ([`MlpConfig`], [`DotConfig`],
//! [`BilinearConfig`]) are what constructors take. The serde-facing
//! [`AttenderConfig`] mirrors configuration files: every field is optional
//! and falls back to the shared [`AttenderDefaults`] when resolved.

use std::{fs, path::Path};

use candle_nn::VarBuilder;
use layers::ParamInit;
use serde::{Deserialize, Serialize};

use crate::core::AttentionError;
use crate::variants::{
    AnyAttender, BilinearAttender, DotAttender, LatticeBiasedMlpAttender, MlpAttender,
};

/// Settings for the additive (MLP) and lattice-biased attenders.
#[derive(Debug, Clone, PartialEq)]
pub struct MlpConfig {
    /// Encoder state dimension `D`.
    pub input_dim: usize,
    /// Decoder query dimension `S`.
    pub state_dim: usize,
    /// Hidden MLP dimension `H`.
    pub hidden_dim: usize,
    pub param_init: ParamInit,
    pub bias_init: ParamInit,
    /// Drop finished trailing batch elements before scoring.
    pub truncate_dec_batches: bool,
}

impl MlpConfig {
    pub fn new(input_dim: usize, state_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input_dim,
            state_dim,
            hidden_dim,
            param_init: ParamInit::glorot(),
            bias_init: ParamInit::Zero,
            truncate_dec_batches: false,
        }
    }

    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.input_dim == 0 || self.state_dim == 0 || self.hidden_dim == 0 {
            return Err(AttentionError::Config(format!(
                "input_dim ({}), state_dim ({}) and hidden_dim ({}) must be greater than zero",
                self.input_dim, self.state_dim, self.hidden_dim
            )));
        }
        Ok(())
    }
}

/// Settings for the dot-product attender.
#[derive(Debug, Clone, PartialEq)]
pub struct DotConfig {
    /// Divide scores by `sqrt(state_dim)`.
    pub scale: bool,
    /// Unsupported; must stay `false`.
    pub truncate_dec_batches: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            scale: true,
            truncate_dec_batches: false,
        }
    }
}

/// Settings for the bilinear attender.
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearConfig {
    pub input_dim: usize,
    pub state_dim: usize,
    pub param_init: ParamInit,
    /// Unsupported; must stay `false`.
    pub truncate_dec_batches: bool,
}

impl BilinearConfig {
    pub fn new(input_dim: usize, state_dim: usize) -> Self {
        Self {
            input_dim,
            state_dim,
            param_init: ParamInit::glorot(),
            truncate_dec_batches: false,
        }
    }

    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.input_dim == 0 || self.state_dim == 0 {
            return Err(AttentionError::Config(format!(
                "input_dim ({}) and state_dim ({}) must be greater than zero",
                self.input_dim, self.state_dim
            )));
        }
        Ok(())
    }
}

/// Experiment-wide fallbacks for options left unset on an attender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttenderDefaults {
    pub default_layer_dim: usize,
    pub param_init: ParamInit,
    pub bias_init: ParamInit,
    pub truncate_dec_batches: bool,
}

impl Default for AttenderDefaults {
    fn default() -> Self {
        Self {
            default_layer_dim: 512,
            param_init: ParamInit::glorot(),
            bias_init: ParamInit::Zero,
            truncate_dec_batches: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlpOptions {
    pub input_dim: Option<usize>,
    pub state_dim: Option<usize>,
    pub hidden_dim: Option<usize>,
    pub param_init: Option<ParamInit>,
    pub bias_init: Option<ParamInit>,
    pub truncate_dec_batches: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DotOptions {
    pub scale: Option<bool>,
    pub truncate_dec_batches: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BilinearOptions {
    pub input_dim: Option<usize>,
    pub state_dim: Option<usize>,
    pub param_init: Option<ParamInit>,
    pub truncate_dec_batches: Option<bool>,
}

/// Attender selection as written in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttenderConfig {
    MlpAttender(MlpOptions),
    DotAttender(DotOptions),
    BilinearAttender(BilinearOptions),
    LatticeBiasedMlpAttender(MlpOptions),
}

fn resolve_mlp(options: &MlpOptions, defaults: &AttenderDefaults) -> MlpConfig {
    let dim = defaults.default_layer_dim;
    MlpConfig {
        input_dim: options.input_dim.unwrap_or(dim),
        state_dim: options.state_dim.unwrap_or(dim),
        hidden_dim: options.hidden_dim.unwrap_or(dim),
        param_init: options
            .param_init
            .clone()
            .unwrap_or_else(|| defaults.param_init.clone()),
        bias_init: options
            .bias_init
            .clone()
            .unwrap_or_else(|| defaults.bias_init.clone()),
        truncate_dec_batches: options
            .truncate_dec_batches
            .unwrap_or(defaults.truncate_dec_batches),
    }
}

impl AttenderConfig {
    /// Builds the configured attender, allocating parameters through `vb`.
    pub fn build(
        &self,
        defaults: &AttenderDefaults,
        vb: VarBuilder,
    ) -> Result<AnyAttender, AttentionError> {
        let attender = match self {
            AttenderConfig::MlpAttender(options) => {
                AnyAttender::Mlp(MlpAttender::new(resolve_mlp(options, defaults), vb)?)
            }
            AttenderConfig::LatticeBiasedMlpAttender(options) => AnyAttender::LatticeBiasedMlp(
                LatticeBiasedMlpAttender::new(resolve_mlp(options, defaults), vb)?,
            ),
            AttenderConfig::DotAttender(options) => AnyAttender::Dot(DotAttender::new(DotConfig {
                scale: options.scale.unwrap_or(true),
                truncate_dec_batches: options
                    .truncate_dec_batches
                    .unwrap_or(defaults.truncate_dec_batches),
            })?),
            AttenderConfig::BilinearAttender(options) => {
                let dim = defaults.default_layer_dim;
                let config = BilinearConfig {
                    input_dim: options.input_dim.unwrap_or(dim),
                    state_dim: options.state_dim.unwrap_or(dim),
                    param_init: options
                        .param_init
                        .clone()
                        .unwrap_or_else(|| defaults.param_init.clone()),
                    truncate_dec_batches: options
                        .truncate_dec_batches
                        .unwrap_or(defaults.truncate_dec_batches),
                };
                AnyAttender::Bilinear(BilinearAttender::new(config, vb)?)
            }
        };
        Ok(attender)
    }
}

/// A configuration file: shared defaults plus the attender to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionSettings {
    #[serde(default)]
    pub defaults: AttenderDefaults,
    pub attender: AttenderConfig,
}

impl AttentionSettings {
    /// Reads settings from a `.json` or `.toml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttentionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("toml") | None => Ok(toml::from_str(&contents)?),
            Some(other) => Err(AttentionError::Config(format!(
                "unsupported configuration extension '{other}'"
            ))),
        }
    }

    pub fn from_json_str(contents: &str) -> Result<Self, AttentionError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn build(&self, vb: VarBuilder) -> Result<AnyAttender, AttentionError> {
        self.attender.build(&self.defaults, vb)
    }
}
