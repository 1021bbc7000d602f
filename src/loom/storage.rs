//! Copies flat storage of one element kind into storage of another.
//!
//! A single generic routine, [`convert`], is instantiated for every `(source, destination)`
//! pair of [`Scalar`] kinds and registered in a dispatch table keyed by [`DataType`], so
//! untyped byte buffers can be converted by tag at runtime with [`copy`].

use std::sync::LazyLock;

use half::{bf16, f16};
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use super::num::{Bool, DataType, Scalar};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage length error: source holds {0} elements but destination holds {1}")]
    Length(usize, usize),
    #[error("storage size error: {0} bytes is not a multiple of {1}'s size")]
    Misaligned(usize, DataType),
    #[error("storage copy from {0} to {1} is not registered")]
    Unsupported(DataType, DataType),
}

type CopyFn = fn(&[u8], &mut [u8]);

type CopyVTable = HashMap<(DataType, DataType), CopyFn>;

static COPY_TABLE: LazyLock<CopyVTable> = LazyLock::new(|| {
    let mut table = CopyVTable::default();
    register_from::<Bool>(&mut table);
    register_from::<u8>(&mut table);
    register_from::<i8>(&mut table);
    register_from::<i16>(&mut table);
    register_from::<i32>(&mut table);
    register_from::<i64>(&mut table);
    register_from::<f16>(&mut table);
    register_from::<bf16>(&mut table);
    register_from::<f32>(&mut table);
    register_from::<f64>(&mut table);
    table
});

fn register_from<S: Scalar>(table: &mut CopyVTable) {
    macro_rules! insert {
        ($($d:ty),+) => {
            $(table.insert((S::DATA_TYPE, <$d>::DATA_TYPE), copy_bytes::<S, $d>);)+
        };
    }
    insert!(Bool, u8, i8, i16, i32, i64, f16, bf16, f32, f64);
}

/// Byte-level body of one table entry. Lengths are checked by [`copy`].
fn copy_bytes<S: Scalar, D: Scalar>(src: &[u8], dst: &mut [u8]) {
    let src = src.chunks_exact(size_of::<S>());
    let dst = dst.chunks_exact_mut(size_of::<D>());
    for (x, y) in src.zip(dst) {
        let x: S = bytemuck::pod_read_unaligned(x);
        let y_value = D::from_value(x.to_value());
        y.copy_from_slice(bytemuck::bytes_of(&y_value));
    }
}

/// Converts each element of `src` into the matching slot of `dst`.
///
/// Integer narrowing wraps, float to integer saturates (NaN becomes zero), any kind
/// converted to [`Bool`] tests for non-zero, and [`Bool`] converts to `0` or `1`.
pub fn convert<S: Scalar, D: Scalar>(src: &[S], dst: &mut [D]) -> Result<(), StorageError> {
    if src.len() != dst.len() {
        return Err(StorageError::Length(src.len(), dst.len()));
    }
    for (x, y) in src.iter().zip(dst.iter_mut()) {
        *y = D::from_value(x.to_value());
    }
    Ok(())
}

/// Converts untyped storage, dispatching on the element kinds at runtime.
pub fn copy(
    src: &[u8],
    src_type: DataType,
    dst: &mut [u8],
    dst_type: DataType,
) -> Result<(), StorageError> {
    if src.len() % src_type.size() != 0 {
        return Err(StorageError::Misaligned(src.len(), src_type));
    }
    if dst.len() % dst_type.size() != 0 {
        return Err(StorageError::Misaligned(dst.len(), dst_type));
    }
    let src_count = src.len() / src_type.size();
    let dst_count = dst.len() / dst_type.size();
    if src_count != dst_count {
        return Err(StorageError::Length(src_count, dst_count));
    }

    let f = COPY_TABLE
        .get(&(src_type, dst_type))
        .ok_or(StorageError::Unsupported(src_type, dst_type))?;
    f(src, dst);
    Ok(())
}
