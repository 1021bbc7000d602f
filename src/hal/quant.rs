use derive_more::{Deref, Display, From, Into};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{kernel::ElementwiseKernel, ops::OperatorError};

/// Affine mapping between 8-bit codes and real values on both sides of an operator.
///
/// A code `q` stands for `scale * (q - zero_point)`. Outputs are clamped to
/// `[output_min, output_max]` after quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuantizationParams {
    pub input_zero_point: u8,
    pub input_scale: f32,
    pub output_zero_point: u8,
    pub output_scale: f32,
    pub output_min: u8,
    pub output_max: u8,
}

impl QuantizationParams {
    /// Creates params with the full `[0, 255]` output range.
    pub const fn new(
        input_zero_point: u8,
        input_scale: f32,
        output_zero_point: u8,
        output_scale: f32,
    ) -> Self {
        Self {
            input_zero_point,
            input_scale,
            output_zero_point,
            output_scale,
            output_min: u8::MIN,
            output_max: u8::MAX,
        }
    }

    /// Creates params whose output side equals the input side.
    pub const fn symmetric(zero_point: u8, scale: f32) -> Self {
        Self::new(zero_point, scale, zero_point, scale)
    }

    /// Replaces the output clamp range.
    pub const fn with_output_range(mut self, output_min: u8, output_max: u8) -> Self {
        self.output_min = output_min;
        self.output_max = output_max;
        self
    }

    /// Checks the invariants every operator relies on.
    pub fn validate(&self) -> Result<(), OperatorError> {
        let check_scale = |side: &str, scale: f32| {
            if scale.is_finite() && scale > 0.0 {
                return Ok(());
            }
            Err(OperatorError::InvalidParameter(format!(
                "{side} scale {scale} must be finite and positive"
            )))
        };
        check_scale("input", self.input_scale)?;
        check_scale("output", self.output_scale)?;
        if self.output_min > self.output_max {
            return Err(OperatorError::InvalidParameter(format!(
                "output min {} must not exceed output max {}",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }

    /// Real value represented by an input code.
    #[inline]
    pub fn dequantize_input(&self, code: u8) -> f32 {
        self.input_scale * (code as i32 - self.input_zero_point as i32) as f32
    }

    /// Output code for a real value: scaled, shifted, clamped, then rounded half to even.
    ///
    /// Values outside the representable range are clamped, never rejected.
    #[inline]
    pub fn quantize_output(&self, value: f32) -> u8 {
        let min = self.output_min as f32;
        let max = self.output_max as f32;
        let scaled = value / self.output_scale + self.output_zero_point as f32;
        // NaN falls to the lower bound
        let clamped = if scaled >= min { scaled.min(max) } else { min };
        clamped.round_ties_even() as u8
    }

    /// Ratio of input to output scale.
    #[inline]
    pub fn scale_ratio(&self) -> f32 {
        self.input_scale / self.output_scale
    }
}

/// Operator creation flags. No flag bits are currently defined; unknown bits are ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, From, Into)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{_0:#x}")]
pub struct Flags(pub u32);

impl Flags {
    pub const NONE: Self = Self(0);
    /// Bits the engine understands.
    pub const KNOWN: u32 = 0;

    #[inline]
    pub const fn unknown(self) -> u32 {
        self.0 & !Self::KNOWN
    }

    /// Warns about bits the engine does not understand.
    pub fn check(&self) {
        if let bits @ 1.. = self.unknown() {
            log::warn!("ignoring unknown flags {bits:#x}");
        }
    }
}

/// Output code for each of the 256 possible input codes.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct LookupTable(Box<[u8; 256]>);

impl LookupTable {
    /// Tabulates `kernel` over every input code.
    ///
    /// Fails with [`OperatorError::InsufficientMemory`] if the table cannot be allocated.
    pub fn build(
        kernel: &dyn ElementwiseKernel,
        params: &QuantizationParams,
    ) -> Result<Self, OperatorError> {
        let mut data = Vec::new();
        data.try_reserve_exact(256).map_err(|err| {
            OperatorError::InsufficientMemory(format!("failed to allocate lookup table: {err}"))
        })?;
        data.extend((0..=u8::MAX).map(|code| {
            let x = params.dequantize_input(code);
            params.quantize_output(kernel.apply(x))
        }));
        let data: Box<[u8; 256]> = data
            .into_boxed_slice()
            .try_into()
            .map_err(|_| OperatorError::InsufficientMemory("lookup table size mismatch".into()))?;
        Ok(Self(data))
    }

    #[inline]
    pub fn get(&self, code: u8) -> u8 {
        self.0[code as usize]
    }

    /// Returns `true` if the table never decreases as the input code grows.
    pub fn is_monotone(&self) -> bool {
        self.0.windows(2).all(|pair| pair[0] <= pair[1])
    }
}
