//! The `loom` module provides the foundations operators are built on.
//!
//! ## Key Components
//! 1. **Buffers**:
//!    - Caller-owned byte storage shared through [`buffer::Buffer`] handles.
//!    - Strided row views ([`buffer::RowLayout`]) addressing `batch × channels` data.
//!
//! 2. **Parallelism**:
//!    - The [`pool::ThreadPool`] parallel-for the execution engine fans rows out to.
//!    - A scoped worker pool, plus rayon pools behind the `rayon` feature.
//!
//! 3. **Numerical System**:
//!    - Element kinds ([`num::DataType`]) and their typed scalars.
//!    - Cross-kind storage copy dispatched by kind tags ([`storage`]).
//!
//! 4. **Platform**:
//!    - One-time backend initialization ([`platform::initialize`]).

pub mod buffer;
pub mod num;
pub mod platform;
pub mod pool;
pub mod storage;
