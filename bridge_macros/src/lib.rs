//! The `#[bridge_object]` attribute macro: the compile-time replacement for
//! the runtime prototype-chain walk a dynamically-typed implementation
//! would do to classify an object's own+inherited names into methods and
//! properties.
//!
//! Applied to an `impl SomeType { ... }` block. Each method is classified:
//!
//! - `#[bridge(property)]`, or no attribute + zero `self`-only args and a
//!   name not starting with `_`: a property getter.
//! - `#[bridge(method)]`, or no attribute + any other shape: a callable
//!   method.
//! - `#[bridge(skip)]`, or a name starting with `_`: excluded entirely,
//!   the same filter §3 applies to the magic slot and underscore-prefixed
//!   names.
//!
//! The macro emits the stripped-down original `impl` block (so the type
//! keeps its inherent methods) plus a `bridge_value::BridgeRef` impl
//! (identity by address) and a `bridge::BridgeObject` impl that dispatches
//! `call_method`/`get_property` by name.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, ImplItem, ItemImpl, Pat, ReturnType, Type};

use bridge_macro_utils::{to_wire_name, BridgeAttrs};

fn crate_path(name: &str, fallback: &str) -> TokenStream2 {
    match crate_name(name) {
        Ok(FoundCrate::Itself) => quote!(crate),
        Ok(FoundCrate::Name(found)) => {
            let ident = format_ident!("{found}");
            quote!(::#ident)
        }
        Err(_) => {
            let ident = format_ident!("{fallback}");
            quote!(::#ident)
        }
    }
}

#[proc_macro_attribute]
pub fn bridge_object(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemImpl);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct Member {
    ident: syn::Ident,
    wire_name: String,
    is_async: bool,
    args: Vec<(syn::Ident, Type)>,
    output: Output,
}

enum Output {
    Unit,
    Value(Type),
    /// `Result<T, E>` — `E` is packed as a `JsError` via `Into<JsError>`.
    Fallible(Type),
}

fn classify_output(ret: &ReturnType) -> Output {
    let ReturnType::Type(_, ty) = ret else {
        return Output::Unit;
    };
    if let Type::Path(path) = ty.as_ref() {
        if let Some(seg) = path.path.segments.last() {
            if seg.ident == "Result" {
                if let syn::PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(syn::GenericArgument::Type(ok_ty)) = args.args.first() {
                        return Output::Fallible(ok_ty.clone());
                    }
                }
            }
        }
    }
    Output::Value((**ty).clone())
}

fn collect_members(input: &ItemImpl, kind_property: bool) -> syn::Result<Vec<Member>> {
    let mut members = Vec::new();
    for item in &input.items {
        let ImplItem::Fn(method) = item else { continue };
        let attrs = BridgeAttrs::parse(&method.attrs)?;
        if attrs.skip || method.sig.ident.to_string().starts_with('_') {
            continue;
        }
        let only_self = method.sig.inputs.len() == 1;
        let is_property = attrs.property || (!attrs.method && only_self);
        if is_property != kind_property {
            continue;
        }

        let mut args = Vec::new();
        for input_arg in method.sig.inputs.iter().skip(1) {
            let FnArg::Typed(pat_ty) = input_arg else {
                return Err(syn::Error::new_spanned(input_arg, "bridge methods cannot take `self` patterns other than `&self`"));
            };
            let Pat::Ident(pat_ident) = pat_ty.pat.as_ref() else {
                return Err(syn::Error::new_spanned(&pat_ty.pat, "bridge method arguments must be simple identifiers"));
            };
            args.push((pat_ident.ident.clone(), (*pat_ty.ty).clone()));
        }

        let wire_name = attrs.rename.unwrap_or_else(|| to_wire_name(&method.sig.ident));
        members.push(Member {
            ident: method.sig.ident.clone(),
            wire_name,
            is_async: method.sig.asyncness.is_some(),
            args,
            output: classify_output(&method.sig.output),
        });
    }
    Ok(members)
}

fn strip_bridge_attrs(input: &mut ItemImpl) {
    for item in &mut input.items {
        if let ImplItem::Fn(method) = item {
            method.attrs.retain(|a| !a.path().is_ident("bridge"));
        }
    }
}

fn expand(mut input: ItemImpl) -> syn::Result<TokenStream2> {
    let bv = crate_path("bridge_value", "bridge_value");
    let bridge = crate_path("bridge", "bridge");
    let self_ty = input.self_ty.clone();

    let properties = collect_members(&input, true)?;
    let methods = collect_members(&input, false)?;
    strip_bridge_attrs(&mut input);

    let method_names: Vec<&str> = methods.iter().map(|m| m.wire_name.as_str()).collect();
    let property_names: Vec<&str> = properties.iter().map(|m| m.wire_name.as_str()).collect();

    let property_arms = properties.iter().map(|m| {
        let wire_name = &m.wire_name;
        let ident = &m.ident;
        quote! {
            #wire_name => #bv::Pack::pack(&self.#ident(), ctx),
        }
    });

    let method_arms = methods.iter().map(|m| {
        let wire_name = &m.wire_name;
        let ident = &m.ident;
        let arg_unpacks = m.args.iter().enumerate().map(|(i, (name, ty))| {
            quote! {
                let #name: #ty = {
                    let arg_path = format!("{path}[{}]", #i);
                    let slot = args_vec.get(#i).ok_or_else(|| #bv::Error::UnsupportedType {
                        path: arg_path.clone(),
                        type_name: "argument",
                    })?;
                    #bv::Unpack::unpack(slot, ctx, &arg_path)?
                };
            }
        });
        let arg_names = m.args.iter().map(|(name, _)| name);
        let call = if m.is_async {
            quote! { self.#ident(#(#arg_names),*).await }
        } else {
            quote! { self.#ident(#(#arg_names),*) }
        };
        let pack_result = match &m.output {
            Output::Unit => quote! {
                #call;
                Ok(#bv::PackedData::identity(#bv::RawValue::Null))
            },
            Output::Value(_) => quote! {
                Ok(#bv::Pack::pack(&(#call), ctx))
            },
            Output::Fallible(_) => quote! {
                match #call {
                    Ok(value) => Ok(#bv::Pack::pack(&value, ctx)),
                    Err(error) => {
                        let js_error: #bv::JsError = error.into();
                        Ok(#bv::Pack::pack(&js_error, ctx).into_throw())
                    }
                }
            },
        };
        quote! {
            #wire_name => {
                #(#arg_unpacks)*
                #pack_result
            }
        }
    });

    Ok(quote! {
        #input

        impl #bv::BridgeRef for #self_ty {
            fn identity(&self) -> usize {
                self as *const #self_ty as *const () as usize
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        #[#bridge::async_trait]
        impl #bridge::BridgeObject for #self_ty {
            fn bridge_methods(&self) -> &'static [&'static str] {
                &[#(#method_names),*]
            }

            fn bridge_properties(&self) -> &'static [&'static str] {
                &[#(#property_names),*]
            }

            fn get_property(&self, name: &str, ctx: &dyn #bv::PeerHandle) -> #bv::PackedData {
                match name {
                    #(#property_arms)*
                    _ => #bv::PackedData::identity(#bv::RawValue::Null).into_throw(),
                }
            }

            async fn call_method(
                &self,
                name: &str,
                args_vec: &[#bv::PackedData],
                ctx: &dyn #bv::PeerHandle,
                path: &str,
            ) -> #bv::Result<#bv::PackedData> {
                match name {
                    #(#method_arms)*
                    _ => Err(#bv::Error::UnsupportedType { path: path.to_string(), type_name: "method" }),
                }
            }
        }
    })
}
