use bytemuck::{Pod, Zeroable};
use derive_more::Display;
use half::{bf16, f16};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element kinds a storage buffer may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    Bool,
    U8,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
}

impl DataType {
    /// All element kinds, in declaration order.
    pub const ALL: [DataType; 10] = [
        DataType::Bool,
        DataType::U8,
        DataType::I8,
        DataType::I16,
        DataType::I32,
        DataType::I64,
        DataType::F16,
        DataType::BF16,
        DataType::F32,
        DataType::F64,
    ];

    /// Returns the size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::Bool | DataType::U8 | DataType::I8 => 1,
            DataType::I16 | DataType::F16 | DataType::BF16 => 2,
            DataType::I32 | DataType::F32 => 4,
            DataType::I64 | DataType::F64 => 8,
        }
    }
}

macro_rules! impl_bytemuck {
    ($ty:ty) => {
        unsafe impl ::bytemuck::Zeroable for $ty {}
        unsafe impl ::bytemuck::Pod for $ty {}
    };
}

/// A boolean stored as one byte. Any non-zero byte reads as `true`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Bool(pub u8);

impl_bytemuck!(Bool);

impl From<bool> for Bool {
    #[inline]
    fn from(value: bool) -> Self {
        Self(value as u8)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(value: Bool) -> Self {
        value.0 != 0
    }
}

/// Intermediate representation an element passes through while being converted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

pub trait Scalar: Sized + Zeroable + Pod + Send + Sync + sealed::Sealed {
    const DATA_TYPE: DataType;

    fn to_value(self) -> Value;
    fn from_value(value: Value) -> Self;
}

macro_rules! impl_scalar_int {
    ($ty:ty, $data_type:ident) => {
        impl Scalar for $ty {
            const DATA_TYPE: DataType = DataType::$data_type;

            #[inline]
            fn to_value(self) -> Value {
                Value::Int(self as i64)
            }

            #[inline]
            fn from_value(value: Value) -> Self {
                match value {
                    Value::Bool(x) => x as $ty,
                    // integer narrowing wraps
                    Value::Int(x) => x as $ty,
                    // float to integer saturates, NaN becomes zero
                    Value::Float(x) => x as $ty,
                }
            }
        }
    };
}

impl_scalar_int!(u8, U8);
impl_scalar_int!(i8, I8);
impl_scalar_int!(i16, I16);
impl_scalar_int!(i32, I32);
impl_scalar_int!(i64, I64);

impl Scalar for Bool {
    const DATA_TYPE: DataType = DataType::Bool;

    #[inline]
    fn to_value(self) -> Value {
        Value::Bool(self.into())
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(x) => x.into(),
            Value::Int(x) => (x != 0).into(),
            Value::Float(x) => (x != 0.0).into(),
        }
    }
}

impl Scalar for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    #[inline]
    fn to_value(self) -> Value {
        Value::Float(self as f64)
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(x) => x as u8 as f32,
            Value::Int(x) => x as f32,
            Value::Float(x) => x as f32,
        }
    }
}

impl Scalar for f64 {
    const DATA_TYPE: DataType = DataType::F64;

    #[inline]
    fn to_value(self) -> Value {
        Value::Float(self)
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(x) => x as u8 as f64,
            Value::Int(x) => x as f64,
            Value::Float(x) => x,
        }
    }
}

impl Scalar for f16 {
    const DATA_TYPE: DataType = DataType::F16;

    #[inline]
    fn to_value(self) -> Value {
        Value::Float(self.to_f64())
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(x) => f16::from_f32(x as u8 as f32),
            Value::Int(x) => f16::from_f64(x as f64),
            Value::Float(x) => f16::from_f64(x),
        }
    }
}

impl Scalar for bf16 {
    const DATA_TYPE: DataType = DataType::BF16;

    #[inline]
    fn to_value(self) -> Value {
        Value::Float(self.to_f64())
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(x) => bf16::from_f32(x as u8 as f32),
            Value::Int(x) => bf16::from_f64(x as f64),
            Value::Float(x) => bf16::from_f64(x),
        }
    }
}

mod sealed {
    use half::{bf16, f16};

    use super::Bool;

    pub trait Sealed {}

    impl Sealed for Bool {}
    impl Sealed for u8 {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f16 {}
    impl Sealed for bf16 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

#[cfg(test)]
mod tests {
    use half::{bf16, f16};

    use super::{Bool, DataType, Scalar, Value};

    #[test]
    fn test_data_type_size() {
        assert_eq!(DataType::ALL.map(DataType::size), [1, 1, 1, 2, 4, 8, 2, 2, 4, 8]);
        assert_eq!(size_of::<Bool>(), DataType::Bool.size());
        assert_eq!(size_of::<bf16>(), DataType::BF16.size());
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(u8::from_value(Value::Int(300)), 44);
        assert_eq!(i8::from_value(Value::Float(1000.0)), i8::MAX);
        assert_eq!(i32::from_value(Value::Float(f64::NAN)), 0);
        assert_eq!(f32::from_value(Value::Bool(true)), 1.0);
        assert_eq!(Bool::from_value(Value::Float(-0.5)), Bool(1));
        assert_eq!(Bool::from_value(Value::Int(0)), Bool(0));
        assert_eq!(Bool(7).to_value(), Value::Bool(true));
        assert_eq!(f16::from_value(Value::Int(3)), f16::from_f32(3.0));
    }
}
