use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod ops;

/// Forwards `QuantizedOp` to the inner `Operator` of a typed operator handle.
///
/// Tuple structs forward to their first field unless another one is marked with
/// `#[operator]`; named structs forward to the single field marked with `#[operator]`.
/// Inside `qops` itself, `#[quantized_op(crate = "crate")]` sets the path to the crate.
#[proc_macro_derive(QuantizedOp, attributes(quantized_op, operator))]
pub fn derive_quantized_op(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = ops::derive_quantized_op(input);
    expanded.into()
}
