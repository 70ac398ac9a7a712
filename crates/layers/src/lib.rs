//! Parameter and tensor plumbing shared by the attention crate.
//!
//! [`init`] names the initialisation policies used to allocate learned
//! matrices through a Candle `VarBuilder`; [`checks`] hosts the shape and
//! dtype assertions run by constructors and forward paths.

pub mod checks;
pub mod init;

pub use init::ParamInit;
