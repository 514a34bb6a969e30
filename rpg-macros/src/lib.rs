//! Proc macros for agent-facing RPG tools.
//!
//! `#[derive(ToolSchema)]` turns a struct with named fields into a JSON
//! schema (`input_schema()`), using doc comments as descriptions.
//! `#[derive(Tool)]` additionally exposes the tool name, the tool
//! description and a `ToolDefinition` ready to hand to the controlling agent.
//!
//! # Example
//!
//! ```ignore
//! /// Executes a weapon attack against a target by name.
//! #[derive(Tool, Deserialize)]
//! #[tool(name = "execute_attack")]
//! struct ExecuteAttackArgs {
//!     /// Name (or partial name) of the target
//!     target_name: String,
//!     /// Flat bonus added to the attack roll
//!     attack_modifier: Option<i32>,
//! }
//! ```
//!
//! Field types that are not primitives, `String`, `Option<T>` or `Vec<T>`
//! must themselves derive `ToolSchema`; their schema is inlined.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Type};

/// Derive a JSON input schema for a struct.
///
/// # Attributes
///
/// - `#[tool(optional)]` on fields - Mark field as optional in JSON schema
/// - `#[tool(rename = "...")]` on fields - Override field name in schema
#[proc_macro_derive(ToolSchema, attributes(tool))]
pub fn derive_tool_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Derive a full tool definition for an argument struct.
///
/// # Attributes
///
/// - `#[tool(name = "...")]` - Override the tool name (defaults to snake_case struct name)
/// - `#[tool(optional)]` on fields - Mark field as optional in JSON schema
/// - `#[tool(rename = "...")]` on fields - Override field name in schema
#[proc_macro_derive(Tool, attributes(tool))]
pub fn derive_tool(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_tool(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_tool(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let tool_name = get_tool_name(input)?;
    let description = get_doc_comment(&input.attrs);
    let schema = expand_schema(input)?;

    Ok(quote! {
        #schema

        impl #struct_name {
            /// Get the tool name.
            pub fn tool_name() -> &'static str {
                #tool_name
            }

            /// Get the tool description.
            pub fn tool_description() -> &'static str {
                #description
            }

            /// Build the definition advertised to the controlling agent.
            pub fn as_tool() -> crate::tools::ToolDefinition {
                crate::tools::ToolDefinition {
                    name: Self::tool_name().to_string(),
                    description: Self::tool_description().to_string(),
                    input_schema: Self::input_schema(),
                }
            }
        }
    })
}

fn expand_schema(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Tool derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Tool derive only supports structs",
            ))
        }
    };

    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let field_name_str = get_field_name(field)?;
        let field_desc = get_doc_comment(&field.attrs);
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !is_field_optional(field) && !is_option_type(field_type) {
            required_fields.push(field_name_str);
        }
    }

    Ok(quote! {
        impl #struct_name {
            /// Generate the JSON schema for this type.
            pub fn input_schema() -> serde_json::Value {
                let mut properties = serde_json::Map::new();
                #(#property_tokens)*

                let required: Vec<&str> = vec![#(#required_fields),*];

                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }
        }
    })
}

fn get_tool_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("tool") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("name") {
                    if let Some(s) = string_literal(&nv.value) {
                        return Ok(s);
                    }
                }
            }
        }
    }

    // Argument structs are named `FooArgs`; the tool is `foo`.
    let name = input.ident.to_string();
    let name = name.strip_suffix("Args").unwrap_or(&name);
    Ok(to_snake_case(name))
}

fn get_field_name(field: &Field) -> syn::Result<String> {
    for attr in &field.attrs {
        if attr.path().is_ident("tool") {
            if let Ok(Meta::NameValue(nv)) = attr.parse_args::<Meta>() {
                if nv.path.is_ident("rename") {
                    if let Some(s) = string_literal(&nv.value) {
                        return Ok(s);
                    }
                }
            }
        }
    }

    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_field_optional(field: &Field) -> bool {
    field.attrs.iter().any(|attr| {
        attr.path().is_ident("tool")
            && matches!(attr.parse_args::<Meta>(), Ok(Meta::Path(path)) if path.is_ident("optional"))
    })
}

fn string_literal(expr: &syn::Expr) -> Option<String> {
    if let syn::Expr::Lit(expr_lit) = expr {
        if let Lit::Str(s) = &expr_lit.lit {
            return Some(s.value());
        }
    }
    None
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let Some(s) = string_literal(&nv.value) {
                    docs.push(s.trim().to_string());
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

fn first_generic(segment: &syn::PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type) -> syn::Result<TokenStream2> {
    let Type::Path(type_path) = ty else {
        return Ok(quote! { serde_json::json!({}) });
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Ok(quote! { serde_json::json!({}) });
    };

    Ok(match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
        "bool" => quote! { serde_json::json!({"type": "boolean"}) },
        "Value" => quote! { serde_json::json!({}) },
        "Option" => match first_generic(segment) {
            Some(inner) => type_to_schema(inner)?,
            None => quote! { serde_json::json!({}) },
        },
        "Vec" => match first_generic(segment) {
            Some(inner) => {
                let inner_schema = type_to_schema(inner)?;
                quote! {
                    serde_json::json!({
                        "type": "array",
                        "items": #inner_schema
                    })
                }
            }
            None => quote! { serde_json::json!({"type": "array"}) },
        },
        // Nested argument types derive `ToolSchema` themselves.
        _ => quote! { <#ty>::input_schema() },
    })
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
