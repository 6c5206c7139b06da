//! Attribute-parsing helpers shared by `bridge_value_derive` and
//! `bridge_macros`. Neither proc-macro crate depends on the other; both
//! depend on this one for the bits of `syn` plumbing they'd otherwise
//! duplicate.

use proc_macro2::Span;
use syn::{Attribute, Ident, LitStr, Meta, Token};

/// The attribute namespace both macro crates parse: `#[bridge(...)]`.
pub const ATTR_NAME: &str = "bridge";

/// The parsed contents of every `#[bridge(...)]` attribute found on one
/// item, folded together (a later attribute's `rename` overrides an
/// earlier one's; boolean flags OR together).
#[derive(Debug, Clone, Default)]
pub struct BridgeAttrs {
    pub method: bool,
    pub property: bool,
    pub event: bool,
    pub rename: Option<String>,
    pub skip: bool,
}

impl BridgeAttrs {
    /// Scans `attrs` for every `#[bridge(...)]` attribute and folds their
    /// contents together. Unknown keys are a hard parse error rather than
    /// a silently ignored typo.
    pub fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = BridgeAttrs::default();
        for attr in attrs {
            if !attr.path().is_ident(ATTR_NAME) {
                continue;
            }
            let Meta::List(list) = &attr.meta else {
                return Err(syn::Error::new_spanned(attr, "expected #[bridge(...)]"));
            };
            list.parse_nested_meta(|meta| {
                if meta.path.is_ident("method") {
                    parsed.method = true;
                } else if meta.path.is_ident("property") {
                    parsed.property = true;
                } else if meta.path.is_ident("event") {
                    parsed.event = true;
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                } else if meta.path.is_ident("rename") {
                    let value = meta.value()?;
                    let lit: LitStr = value.parse()?;
                    parsed.rename = Some(lit.value());
                } else {
                    return Err(meta.error("unrecognized bridge attribute key"));
                }
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

/// Converts a Rust `snake_case` identifier into the `camelCase` form used
/// on the wire (method/property/event names as they appear in `created`
/// and `calls` records).
pub fn to_wire_name(ident: &Ident) -> String {
    let snake = ident.to_string();
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Builds an identifier from a string at the given span, for macros that
/// need to synthesize new item names (e.g. a generated shim function per
/// bridged method).
pub fn ident_at(name: &str, span: Span) -> Ident {
    Ident::new(name, span)
}

/// Parses a `name = "literal"` pair, the minimal building block several
/// attribute grammars in this workspace need outside of `BridgeAttrs`'s own
/// `parse_nested_meta` loop.
pub fn parse_name_value_str(input: syn::parse::ParseStream) -> syn::Result<(Ident, LitStr)> {
    let name: Ident = input.parse()?;
    input.parse::<Token![=]>()?;
    let value: LitStr = input.parse()?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_snake_to_camel() {
        let ident = Ident::new("get_root", Span::call_site());
        assert_eq!(to_wire_name(&ident), "getRoot");
    }

    #[test]
    fn single_word_is_unchanged() {
        let ident = Ident::new("count", Span::call_site());
        assert_eq!(to_wire_name(&ident), "count");
    }

    #[test]
    fn parses_bridge_method_attribute() {
        let attr: Attribute = syn::parse_quote!(#[bridge(method, rename = "increment")]);
        let parsed = BridgeAttrs::parse(std::slice::from_ref(&attr)).unwrap();
        assert!(parsed.method);
        assert_eq!(parsed.rename.as_deref(), Some("increment"));
    }

    #[test]
    fn rejects_unknown_key() {
        let attr: Attribute = syn::parse_quote!(#[bridge(nonsense)]);
        assert!(BridgeAttrs::parse(std::slice::from_ref(&attr)).is_err());
    }
}
