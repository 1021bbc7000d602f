//! Real-valued elementwise functions the lookup tables are built from.
//!
//! Each kernel is evaluated once per input code when an operator is created; the
//! execution engine never calls it again.

use derive_more::Display;

use super::{ops::OperatorError, quant::QuantizationParams};

pub trait ElementwiseKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluates the function at the real value `x`.
    fn apply(&self, x: f32) -> f32;

    /// Rejects params this kernel cannot serve. Called after the generic validation.
    #[allow(unused_variables)]
    fn check(&self, params: &QuantizationParams) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Whether the function never decreases.
    fn is_monotone(&self) -> bool {
        true
    }
}

/// Passes values through; the operator only requantizes and clamps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[display("identity")]
pub struct Identity;

impl ElementwiseKernel for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        x
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[display("tanh")]
pub struct Tanh;

impl ElementwiseKernel for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        x.tanh()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[display("sigmoid")]
pub struct Sigmoid;

impl ElementwiseKernel for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }
}

/// `x` for positive inputs, `negative_slope * x` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
#[display("leaky_relu({negative_slope})")]
pub struct LeakyRelu {
    pub negative_slope: f32,
}

impl LeakyRelu {
    /// Smallest supported ratio of input to output scale.
    pub const MIN_SCALE_RATIO: f32 = 1.0 / 256.0;
    /// Supported ratios are strictly below this.
    pub const MAX_SCALE_RATIO: f32 = 256.0;
}

impl ElementwiseKernel for LeakyRelu {
    fn name(&self) -> &'static str {
        "leaky_relu"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        if x > 0.0 { x } else { x * self.negative_slope }
    }

    fn check(&self, params: &QuantizationParams) -> Result<(), OperatorError> {
        let slope = self.negative_slope;
        if !slope.is_normal() || slope <= 0.0 {
            return Err(OperatorError::InvalidParameter(format!(
                "negative slope {slope} must be a normal positive number"
            )));
        }
        let ratio = params.scale_ratio();
        if !(Self::MIN_SCALE_RATIO..Self::MAX_SCALE_RATIO).contains(&ratio) {
            return Err(OperatorError::UnsupportedParameter(format!(
                "input-to-output scale ratio {ratio} is outside [2^-8, 2^8)"
            )));
        }
        Ok(())
    }
}

/// Piecewise-linear sigmoid: `clamp(x / 6 + 1 / 2, 0, 1)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[display("hardsigmoid")]
pub struct HardSigmoid;

impl ElementwiseKernel for HardSigmoid {
    fn name(&self) -> &'static str {
        "hardsigmoid"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        (x / 6.0 + 0.5).clamp(0.0, 1.0)
    }
}

/// `x * hardsigmoid(x)`. Dips below zero around `x = -1.5`, so it is not monotone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Display)]
#[display("hardswish")]
pub struct HardSwish;

impl ElementwiseKernel for HardSwish {
    fn name(&self) -> &'static str {
        "hardswish"
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        x * HardSigmoid.apply(x)
    }

    fn is_monotone(&self) -> bool {
        false
    }
}
