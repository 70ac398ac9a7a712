//! Named parameter initialisation policies.
//!
//! Attenders only declare parameter shapes; allocation goes through a
//! [`VarBuilder`] and the sampling distribution is chosen by a [`ParamInit`].
//! Policies are deserializable so configuration files can refer to them by
//! name (`{"type": "glorot"}`, `{"type": "zero"}`, ...).
//!
//! Glorot follows the rank-generic form `gain * sqrt(3 * rank / sum(dims))`,
//! which reduces to the familiar `gain * sqrt(6 / (fan_in + fan_out))` for
//! matrices and stays well defined for bias vectors.

use candle_core::{Result, Shape, Tensor};
use candle_nn::{Init, VarBuilder};
use serde::{Deserialize, Serialize};

fn unit_gain() -> f64 {
    1.0
}

/// Supported initialisation policies for attention parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamInit {
    /// Xavier/Glorot uniform initialisation.
    Glorot {
        #[serde(default = "unit_gain")]
        gain: f64,
    },
    /// All zeros, the usual choice for biases.
    Zero,
    /// Every entry set to `value`.
    Const { value: f64 },
    /// Gaussian with the given mean and standard deviation.
    Normal {
        #[serde(default)]
        mean: f64,
        std: f64,
    },
    /// Uniform in `[-scale, scale]`.
    Uniform { scale: f64 },
}

impl Default for ParamInit {
    fn default() -> Self {
        Self::glorot()
    }
}

impl ParamInit {
    /// Glorot uniform with unit gain.
    pub fn glorot() -> Self {
        Self::Glorot { gain: 1.0 }
    }

    /// Half-width of the Glorot sampling interval for `dims`.
    pub fn glorot_bound(gain: f64, dims: &[usize]) -> f64 {
        let total: usize = dims.iter().sum();
        if total == 0 {
            return 0.0;
        }
        gain * (3.0 * dims.len() as f64 / total as f64).sqrt()
    }

    /// Translates the policy into Candle's initialiser for a concrete shape.
    pub fn to_candle(&self, dims: &[usize]) -> Init {
        match self {
            ParamInit::Glorot { gain } => {
                let bound = Self::glorot_bound(*gain, dims);
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
            ParamInit::Zero => Init::Const(0.0),
            ParamInit::Const { value } => Init::Const(*value),
            ParamInit::Normal { mean, std } => Init::Randn {
                mean: *mean,
                stdev: *std,
            },
            ParamInit::Uniform { scale } => Init::Uniform {
                lo: -scale,
                up: *scale,
            },
        }
    }

    /// Allocates (or fetches) the parameter `name` with this policy.
    pub fn get<S: Into<Shape>>(&self, vb: &VarBuilder, shape: S, name: &str) -> Result<Tensor> {
        let shape = shape.into();
        let init = self.to_candle(shape.dims());
        vb.get_with_hints(shape, name, init)
    }
}
