//! CPU execution of operators.

pub mod lut;
