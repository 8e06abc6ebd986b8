use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod page_fields;

#[proc_macro_derive(PageFields, attributes(field))]
pub fn derive_page_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match page_fields::expand_page_fields(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}
