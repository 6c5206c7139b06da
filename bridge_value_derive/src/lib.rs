//! `#[derive(Pack, Unpack)]` for plain structs that cross the bridge by
//! value — method argument lists, return values, event payloads — as
//! opposed to bridgeable objects themselves, which `bridge_macros`
//! handles.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use bridge_macro_utils::to_wire_name;

fn bridge_value_path() -> TokenStream2 {
    match crate_name("bridge_value") {
        Ok(FoundCrate::Itself) => quote!(crate),
        Ok(FoundCrate::Name(name)) => {
            let ident = format_ident!("{name}");
            quote!(::#ident)
        }
        Err(_) => quote!(::bridge_value),
    }
}

/// Derives [`Pack`](../bridge_value/trait.Pack.html) for a struct with
/// named fields, packing it as an object keyed by each field's wire name.
#[proc_macro_derive(Pack, attributes(bridge))]
pub fn derive_pack(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_pack(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives [`Unpack`](../bridge_value/trait.Unpack.html), the inverse of
/// [`derive_pack`].
#[proc_macro_derive(Unpack, attributes(bridge))]
pub fn derive_unpack(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_unpack(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct NamedField {
    ident: syn::Ident,
    wire_name: String,
    ty: syn::Type,
}

fn named_fields(data: &Data, span: proc_macro2::Span) -> syn::Result<Vec<NamedField>> {
    let Data::Struct(s) = data else {
        return Err(syn::Error::new(span, "Pack/Unpack can only be derived for structs"));
    };
    let Fields::Named(fields) = &s.fields else {
        return Err(syn::Error::new(span, "Pack/Unpack requires named fields"));
    };
    fields
        .named
        .iter()
        .map(|f| {
            let ident = f.ident.clone().expect("named field has an ident");
            let wire_name = to_wire_name(&ident);
            Ok(NamedField { ident, wire_name, ty: f.ty.clone() })
        })
        .collect()
}

fn expand_pack(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let bv = bridge_value_path();
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = named_fields(&input.data, input.ident.span())?;

    let field_packs = fields.iter().map(|f| {
        let ident = &f.ident;
        let wire_name = &f.wire_name;
        quote! {
            {
                let packed = #bv::Pack::pack(&self.#ident, ctx);
                if let Some(map) = packed.map() {
                    maps.insert(#wire_name.to_string(), map.clone());
                }
                raws.insert(#wire_name.to_string(), packed.raw);
            }
        }
    });

    Ok(quote! {
        impl #impl_generics #bv::Pack for #name #ty_generics #where_clause {
            fn pack(&self, ctx: &dyn #bv::PeerHandle) -> #bv::PackedData {
                let mut maps = ::std::collections::BTreeMap::new();
                let mut raws = ::std::collections::BTreeMap::new();
                #(#field_packs)*
                if maps.is_empty() {
                    #bv::PackedData::identity(#bv::RawValue::Object(raws))
                } else {
                    #bv::PackedData::tagged(#bv::DataMap::Fields(maps), #bv::RawValue::Object(raws))
                }
            }
        }
    })
}

fn expand_unpack(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let bv = bridge_value_path();
    let name = &input.ident;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = named_fields(&input.data, input.ident.span())?;

    let field_unpacks = fields.iter().map(|f| {
        let ident = &f.ident;
        let wire_name = &f.wire_name;
        let ty = &f.ty;
        quote! {
            let #ident: #ty = {
                let field_path = format!("{path}.{}", #wire_name);
                let raw = fields
                    .get(#wire_name)
                    .ok_or_else(|| #bv::Error::UnsupportedType { path: field_path.clone(), type_name: #type_name })?;
                let field_map = field_maps.and_then(|m| m.get(#wire_name));
                let field_data = match field_map {
                    Some(map) if !map.is_identity() => #bv::PackedData::tagged(map.clone(), raw.clone()),
                    _ => #bv::PackedData::identity(raw.clone()),
                };
                #bv::Unpack::unpack(&field_data, ctx, &field_path)?
            };
        }
    });

    let field_names = fields.iter().map(|f| &f.ident);

    Ok(quote! {
        impl #impl_generics #bv::Unpack for #name #ty_generics #where_clause {
            fn unpack(data: &#bv::PackedData, ctx: &dyn #bv::PeerHandle, path: &str) -> #bv::Result<Self> {
                let fields = data.raw.as_object().ok_or_else(|| #bv::Error::UnsupportedType {
                    path: path.to_string(),
                    type_name: #type_name,
                })?;
                let field_maps = match data.map() {
                    Some(#bv::DataMap::Fields(m)) => Some(m),
                    None => None,
                    Some(_) => return Err(#bv::Error::UnsupportedType { path: path.to_string(), type_name: #type_name }),
                };
                #(#field_unpacks)*
                Ok(#name { #(#field_names),* })
            }
        }
    })
}
