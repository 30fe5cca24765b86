mod derive;

use proc_macro::TokenStream;

use crate::derive::handle_derive_bit;

/// Implements `padmux_bit_mask::Bitable` for a fieldless enum.
///
/// Explicit discriminants select the bit position, so an enum can mirror an
/// existing wire layout with gaps.
#[proc_macro_derive(Bit)]
pub fn derive_bit(input: TokenStream) -> TokenStream {
    handle_derive_bit(input)
}
