use qops_derive::QuantizedOp;

use super::{
    kernel::{HardSigmoid, HardSwish, Identity, LeakyRelu, Sigmoid, Tanh},
    ops::{Operator, OperatorError},
    quant::{Flags, QuantizationParams},
};

macro_rules! impl_quantized_op {
    ($(#[$attr:meta])* $name:ident, $kernel:expr) => {
        $(#[$attr])*
        #[derive(Debug, Default, QuantizedOp)]
        #[quantized_op(crate = "crate")]
        pub struct $name(Operator);

        impl $name {
            /// Creates the operator for rows of `channels` bytes.
            #[inline]
            pub fn create(
                channels: usize,
                params: QuantizationParams,
                flags: Flags,
            ) -> Result<Self, OperatorError> {
                Operator::create(&$kernel, channels, params, flags).map(Self)
            }
        }
    };
}

impl_quantized_op!(
    /// Quantized hyperbolic tangent.
    TanhOp,
    Tanh
);
impl_quantized_op!(
    /// Quantized logistic sigmoid.
    SigmoidOp,
    Sigmoid
);
impl_quantized_op!(HardSigmoidOp, HardSigmoid);
impl_quantized_op!(HardSwishOp, HardSwish);

/// Quantized leaky ReLU.
#[derive(Debug, QuantizedOp)]
#[quantized_op(crate = "crate")]
pub struct LeakyReluOp {
    #[operator]
    op: Operator,
    negative_slope: f32,
}

impl LeakyReluOp {
    /// # Leaky ReLU (`create`)
    /// Creates a leaky ReLU over rows of `channels` bytes.
    ///
    /// ## Arguments
    /// * `channels` - Bytes per row, must be positive.
    /// * `negative_slope` - Multiplier for non-positive inputs, must be normal and positive.
    /// * `params` - Input and output quantization. The input-to-output scale ratio must lie in
    ///   `[2^-8, 2^8)`.
    /// * `flags` - Creation flags.
    pub fn create(
        channels: usize,
        negative_slope: f32,
        params: QuantizationParams,
        flags: Flags,
    ) -> Result<Self, OperatorError> {
        let kernel = LeakyRelu { negative_slope };
        let op = Operator::create(&kernel, channels, params, flags)?;
        Ok(Self { op, negative_slope })
    }

    #[inline]
    pub fn negative_slope(&self) -> f32 {
        self.negative_slope
    }
}

/// Clamps raw codes into `[output_min, output_max]` without requantizing.
#[derive(Debug, Default, QuantizedOp)]
#[quantized_op(crate = "crate")]
pub struct ClampOp(Operator);

impl ClampOp {
    pub fn create(
        channels: usize,
        output_min: u8,
        output_max: u8,
        flags: Flags,
    ) -> Result<Self, OperatorError> {
        let params = QuantizationParams::symmetric(0, 1.0).with_output_range(output_min, output_max);
        Operator::create(&Identity, channels, params, flags).map(Self)
    }
}
