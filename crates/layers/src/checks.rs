//! Lightweight validation helpers shared across attention components.
//!
//! These routines provide concise shape, dtype, and device assertions that can
//! be wired into constructors or forward paths. They return
//! `candle_core::Result<()>` so call sites can propagate errors without
//! panicking. The `name` argument is echoed in the error message.

use candle_core::{DType, Error, Result, Tensor};

/// Dtypes accepted for learned parameters.
pub const FLOAT_DTYPES: &[DType] = &[DType::F16, DType::BF16, DType::F32, DType::F64];

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(name: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected dtype in {allowed:?}, got {dtype:?}"
        )))
    }
}

/// Ensures two tensors live on the same device.
pub fn expect_same_device(name: &str, lhs: &Tensor, other: &str, rhs: &Tensor) -> Result<()> {
    if lhs.device().same_device(rhs.device()) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name} and {other} must reside on the same device"
        )))
    }
}
