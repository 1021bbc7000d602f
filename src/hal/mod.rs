//! Quantized elementwise operators.
//!
//! An operator is created once from an [`kernel::ElementwiseKernel`] and
//! [`quant::QuantizationParams`], which tabulates the kernel over all 256 input codes. It is
//! then bound to caller buffers with `setup` and executed any number of times with `run`.

pub mod cpu;
pub mod frontend;
pub mod kernel;
pub mod ops;
pub mod quant;
