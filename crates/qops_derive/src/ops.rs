use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Fields, LitStr, Path, spanned::Spanned};

pub fn derive_quantized_op(input: DeriveInput) -> TokenStream {
    // retrieve struct field information
    let fields = match &input.data {
        syn::Data::Struct(data_struct) => &data_struct.fields,
        _ => {
            return syn::Error::new(input.span(), "`QuantizedOp` can only be derived for structs")
                .to_compile_error();
        }
    };

    // determine the field holding the inner `Operator`
    let operator_field = match fields {
        // tuple struct: the operator is the first field unless another one is marked
        Fields::Unnamed(fields_unnamed) => {
            let marked: Vec<_> = fields_unnamed
                .unnamed
                .iter()
                .enumerate()
                .filter(|(_, f)| f.attrs.iter().any(|a| a.path().is_ident("operator")))
                .map(|(index, _)| index)
                .collect();
            let index = match marked.as_slice() {
                [] => 0,
                [index] => *index,
                _ => {
                    return syn::Error::new(
                        fields_unnamed.span(),
                        "multiple fields marked with #[operator] attribute",
                    )
                    .to_compile_error();
                }
            };
            let index = syn::Index::from(index);
            quote! { #index }
        }
        // named struct: require exactly one #[operator] attribute
        Fields::Named(fields_named) => {
            let marked_fields: Vec<_> = fields_named
                .named
                .iter()
                .filter(|f| f.attrs.iter().any(|a| a.path().is_ident("operator")))
                .collect();

            if marked_fields.len() != 1 {
                let msg = match marked_fields.len() {
                    0 => "no field marked with #[operator] attribute",
                    _ => "multiple fields marked with #[operator] attribute",
                };
                return syn::Error::new(fields_named.span(), msg).to_compile_error();
            }

            let field_ident = &marked_fields[0].ident;
            quote! { #field_ident }
        }
        Fields::Unit => {
            return syn::Error::new(
                input.span(),
                "unit structs are not supported by `QuantizedOp` derive",
            )
            .to_compile_error();
        }
    };

    if !input.generics.params.is_empty() {
        return syn::Error::new(
            input.generics.span(),
            "generic structs are not supported by `QuantizedOp` derive",
        )
        .to_compile_error();
    }

    // parse the `crate` path of #[quantized_op(crate = "...")]
    let mut crate_name = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("quantized_op")) {
        let result = attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("crate") {
                return Err(meta.error("unexpected attribute; supported is `crate`"));
            }
            let s: LitStr = meta.value()?.parse()?;
            crate_name = Some(s.parse::<Path>()?);
            Ok(())
        });
        if let Err(err) = result {
            return err.to_compile_error();
        }
    }
    let base_path = match crate_name {
        Some(path) => quote!(#path::hal::ops),
        None => quote!(::qops::hal::ops),
    };

    let name = &input.ident;
    quote! {
        impl #base_path::QuantizedOp for #name {
            #[inline]
            fn operator(&self) -> &#base_path::Operator {
                &self.#operator_field
            }

            #[inline]
            fn operator_mut(&mut self) -> &mut #base_path::Operator {
                &mut self.#operator_field
            }
        }
    }
}
