use std::{
    ops::Range,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use derive_more::Display;

/// A caller-allocated byte buffer.
///
/// Cloning yields another handle to the same storage. Operators keep a handle between
/// `setup` and `delete`; the caller keeps its own and may refill or read the buffer
/// in between runs.
#[derive(Debug, Clone, Default)]
pub struct Buffer(Arc<RwLock<Vec<u8>>>);

impl From<Vec<u8>> for Buffer {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }
}

impl From<&[u8]> for Buffer {
    #[inline]
    fn from(value: &[u8]) -> Self {
        value.to_vec().into()
    }
}

impl Buffer {
    /// Creates a buffer of `len` bytes, all set to `value`.
    #[inline]
    pub fn filled(len: usize, value: u8) -> Self {
        vec![value; len].into()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the contents.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.read().clone()
    }

    /// Returns `true` if both handles refer to the same storage.
    #[inline]
    pub fn same(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Row-major view of `rows` rows of `channels` bytes, with `stride` bytes between row starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("[{rows}, {channels}; {stride}]")]
pub struct RowLayout {
    pub rows: usize,
    pub channels: usize,
    pub stride: usize,
}

impl RowLayout {
    #[inline]
    pub const fn new(rows: usize, channels: usize, stride: usize) -> Self {
        Self {
            rows,
            channels,
            stride,
        }
    }

    /// Number of bytes that must be addressable: the last row needs only `channels` bytes.
    ///
    /// Returns `None` if the span does not fit in `usize`.
    #[inline]
    pub const fn span(&self) -> Option<usize> {
        match self.rows {
            0 => Some(0),
            rows => match (rows - 1).checked_mul(self.stride) {
                Some(start) => start.checked_add(self.channels),
                None => None,
            },
        }
    }

    /// Returns `true` if rows follow each other with no padding.
    #[inline]
    pub const fn is_contiguous(&self) -> bool {
        self.stride == self.channels
    }

    /// Byte range of the `channels` meaningful bytes of `row`.
    #[inline]
    pub const fn row(&self, row: usize) -> Range<usize> {
        let start = row * self.stride;
        start..start + self.channels
    }
}
