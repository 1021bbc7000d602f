//! Quantized elementwise operator execution engine.
//!
//! ```no_run
//! use qops::{Buffer, Flags, QuantizationParams, QuantizedOp, TanhOp};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! qops::initialize()?;
//!
//! let params = QuantizationParams::new(127, 1.0, 0, 1.0 / 256.0);
//! let mut op = TanhOp::create(4, params, Flags::NONE)?;
//!
//! let input = Buffer::from(vec![127; 8]);
//! let output = Buffer::filled(8, 0);
//! op.setup(2, &input, 4, &output, 4)?;
//! op.run(None)?;
//! assert_eq!(output.to_vec(), [0; 8]);
//!
//! op.delete()?;
//! # Ok(())
//! # }
//! ```

pub mod hal;
pub mod loom;

pub use hal::{
    frontend::{ClampOp, HardSigmoidOp, HardSwishOp, LeakyReluOp, SigmoidOp, TanhOp},
    kernel::ElementwiseKernel,
    ops::{LifecycleState, Operator, OperatorError, QuantizedOp, Status},
    quant::{Flags, QuantizationParams},
};
pub use loom::{
    buffer::Buffer,
    platform::initialize,
    pool::{ScopedPool, ThreadPool},
};
