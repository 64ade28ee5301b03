//! Derive macro for sqlshift models.
//!
//! `#[derive(Model)]` implements `sqlshift::model::Model` for a struct with
//! named fields. The macro does not interpret tags itself; it forwards them
//! to the runtime analyzer together with the field name and type.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Lit, Meta};

/// Derives `sqlshift::model::Model` for a struct.
///
/// # Attributes
///
/// - `#[model(table = "table_name")]` - Specifies the SQL table name
///   (optional, defaults to snake_case of the struct name)
///
/// # Field Attributes
///
/// - `#[migrate(tag = "size:100,not_null")]` - Structured tag
/// - `#[migrate(embed)]` - Embedded ORM base, never a column
/// - `#[migrate(key = "value")]` - Any other key is passed on as a legacy
///   single attribute (`primaryKey = "true"`, `size = "100"`, ...)
///
/// Fields without a `migrate` attribute are still described, but the
/// analyzer skips them because they carry no tag.
#[proc_macro_derive(Model, attributes(model, migrate))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_model_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_model_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let table_name = match get_table_name(&input.attrs)? {
        Some(name) => quote! { ::std::string::String::from(#name) },
        // Derived at runtime so table and column names share one rule.
        None => {
            let struct_str = struct_name.to_string();
            quote! { ::sqlshift::model::to_snake_case(#struct_str) }
        }
    };

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model derive only supports structs",
            ));
        }
    };

    let mut descriptors = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let name = ident.to_string().trim_start_matches("r#").to_string();
        let ty = &field.ty;
        let rust_type = quote!(#ty).to_string().replace(' ', "");
        let attrs = parse_migrate_attrs(&field.attrs)?;

        let mut descriptor = quote! {
            ::sqlshift::model::FieldDescriptor::new(#name, #rust_type)
        };
        if let Some(tag) = attrs.tag {
            descriptor = quote! { #descriptor.tag(#tag) };
        }
        for (key, value) in attrs.legacy {
            descriptor = quote! { #descriptor.attr(#key, #value) };
        }
        if attrs.embed {
            descriptor = quote! { #descriptor.embedded() };
        }
        descriptors.push(descriptor);
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sqlshift::model::Model for #struct_name #ty_generics #where_clause {
            fn table_name() -> ::std::string::String {
                #table_name
            }

            fn fields() -> ::std::vec::Vec<::sqlshift::model::FieldDescriptor> {
                ::std::vec![#(#descriptors),*]
            }
        }
    })
}

#[derive(Default)]
struct MigrateAttrs {
    tag: Option<String>,
    legacy: Vec<(String, String)>,
    embed: bool,
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    match value {
        Expr::Lit(lit) => match lit.lit {
            Lit::Str(s) => Ok(s.value()),
            Lit::Int(i) => Ok(i.base10_digits().to_string()),
            Lit::Bool(b) => Ok(b.value.to_string()),
            other => Err(syn::Error::new_spanned(other, "expected a string literal")),
        },
        other => Err(syn::Error::new_spanned(other, "expected a literal")),
    }
}

fn get_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident("model") {
            let mut table_name = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table_name = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported model attribute"))
                }
            })?;
            if table_name.is_some() {
                return Ok(table_name);
            }
        }
    }
    Ok(None)
}

fn parse_migrate_attrs(attrs: &[Attribute]) -> syn::Result<MigrateAttrs> {
    let mut result = MigrateAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("migrate") {
            continue;
        }
        // Handle empty attribute like #[migrate]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let Some(key) = meta.path.get_ident().map(ToString::to_string) else {
                return Err(meta.error("expected an identifier"));
            };
            if key == "embed" || key == "embedded" {
                result.embed = true;
            } else if key == "tag" {
                result.tag = Some(string_value(&meta)?);
            } else if meta.input.peek(syn::Token![=]) {
                let value = string_value(&meta)?;
                result.legacy.push((key, value));
            } else {
                // A bare flag is a legacy attribute set to true.
                result.legacy.push((key, "true".to_string()));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
