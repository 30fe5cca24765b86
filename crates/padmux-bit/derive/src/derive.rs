use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, ExprLit, Fields, Lit};

pub(crate) fn handle_derive_bit(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Variants without an explicit discriminant continue counting from the
/// previous one, as plain Rust enums do.
fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(
            Span::call_site(),
            "Bit can be derived only for enums",
        ));
    };

    let mut positions: Vec<(syn::Ident, u64)> = Vec::with_capacity(data.variants.len());
    let mut next: u64 = 0;
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Bit supports only fieldless enum variants",
            ));
        }
        let position = match &variant.discriminant {
            Some((_, expr)) => literal_position(expr)?,
            None => next,
        };
        if position >= 64 {
            return Err(syn::Error::new_spanned(
                variant,
                "bit position must be below 64",
            ));
        }
        if positions.iter().any(|(_, p)| *p == position) {
            return Err(syn::Error::new_spanned(
                variant,
                "bit position is already taken",
            ));
        }
        positions.push((variant.ident.clone(), position));
        next = position + 1;
    }

    let arms = positions.iter().map(|(v, pos)| {
        quote! { #name::#v => 1u64 << #pos }
    });
    let all = positions.iter().map(|(v, _)| quote! { #name::#v });

    Ok(quote! {
        impl ::padmux_bit_mask::Bitable for #name {
            const ALL: &'static [Self] = &[ #( #all, )* ];

            #[inline]
            fn bit(&self) -> u64 {
                match self { #( #arms, )* }
            }

            #[inline]
            fn index(&self) -> u32 { self.bit().trailing_zeros() }
        }
    })
}

fn literal_position(expr: &Expr) -> syn::Result<u64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse::<u64>(),
        other => Err(syn::Error::new_spanned(
            other,
            "Bit discriminants must be integer literals",
        )),
    }
}
