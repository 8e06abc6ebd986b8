use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Meta, Result,
    parse::{Parse, ParseStream},
    spanned::Spanned,
};

pub(crate) fn expand_page_fields(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new(
            input.span(),
            "`PageFields` may only be derived on structs.",
        ))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new(
            input.span(),
            "`PageFields` may only be derived on structs with named fields.",
        ))?
    };

    let fields = fields
        .named
        .iter()
        .map(FieldMetadata::parse)
        .map(Result::transpose)
        .flatten() // Skip fields without an attribute.
        .collect::<Result<Vec<_>>>()?;

    let mut names: Vec<String> = Vec::new();
    let mut cases = Vec::new();
    let mut nested = Vec::new();

    for field in fields {
        let member = field.member;

        match field.kind {
            FieldKind::Named(name) => {
                let value = name.value();

                if names.contains(&value) {
                    Err(Error::new(name.span(), "Field names must be unique."))?;
                }
                names.push(value);

                cases.push(quote! {
                    #name => Some(FieldValue::from(self.#member)),
                });
            }
            FieldKind::Flatten => {
                nested.push(quote! {
                    if let Some(value) = PageFields::field(&self.#member, name) {
                        return Some(value);
                    }
                });
            }
        }
    }

    let name = &input.ident;

    let expanded = quote! {
        impl PageFields for #name {
            fn field(&self, name: &str) -> Option<FieldValue> {
                match name {
                    #(#cases)*
                    _ => {
                        #(#nested)*
                        None
                    }
                }
            }
        }
    };

    Ok(expanded.into())
}

#[derive(Debug)]
struct FieldMetadata {
    member: Ident,
    kind: FieldKind,
}

#[derive(Debug)]
enum FieldKind {
    Named(LitStr),
    Flatten,
}

impl FieldMetadata {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(member) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("field")) else {
            return Ok(None);
        };

        let kind = match &attr.meta {
            // A bare `#[field]` exposes the member under its own name.
            Meta::Path(_) => FieldKind::Named(LitStr::new(&member.to_string(), member.span())),
            Meta::List(list) => match list.parse_args::<FieldAttribute>()? {
                FieldAttribute::Flatten => FieldKind::Flatten,
                FieldAttribute::Rename(name) => FieldKind::Named(name),
            },
            Meta::NameValue(_) => Err(Error::new_spanned(
                attr,
                "Expected `#[field]`, `#[field(flatten)]` or `#[field(\"name\")]`.",
            ))?,
        };

        Ok(Some(Self { member, kind }))
    }
}

#[derive(Debug)]
enum FieldAttribute {
    Flatten,
    Rename(LitStr),
}

impl Parse for FieldAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        if let Ok(ident) = input.parse::<Ident>() {
            if ident == "flatten" {
                Ok(Self::Flatten)
            } else {
                Err(Error::new_spanned(
                    ident,
                    "Field attribute must be `flatten` or a string literal.",
                ))
            }
        } else {
            Ok(Self::Rename(input.parse::<LitStr>()?))
        }
    }
}
