extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type,
};

/// Struct attributes parsed from `#[amqp(descriptor = N, name = "...")]`.
///
/// At least one of the two must be present. The numeric code is preferred when encoding; decoding
/// accepts either.
#[derive(Debug, Default)]
struct DescriptorAttributes {
    code: Option<u64>,
    name: Option<String>,
}

/// Field attributes parsed from `#[amqp(...)]`.
///
/// * `default` - decode a missing or null field as `Default::default()`
#[derive(Debug, Default, Clone, Copy)]
struct FieldAttributes {
    default: bool,
}

fn get_descriptor_attributes(input: &DeriveInput) -> syn::Result<DescriptorAttributes> {
    let mut attrs = DescriptorAttributes::default();
    for attr in &input.attrs {
        if !attr.path().is_ident("amqp") {
            continue;
        }
        attr.parse_args_with(|input: syn::parse::ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<syn::Ident>()?;
                input.parse::<syn::Token![=]>()?;
                if ident == "descriptor" {
                    let lit = input.parse::<syn::LitInt>()?;
                    attrs.code = Some(lit.base10_parse::<u64>()?);
                } else if ident == "name" {
                    let lit = input.parse::<syn::LitStr>()?;
                    if !lit.value().is_ascii() {
                        return Err(syn::Error::new(
                            lit.span(),
                            "Descriptor names are symbols and must be ASCII",
                        ));
                    }
                    attrs.name = Some(lit.value());
                } else {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown attribute: {}", ident),
                    ));
                }

                if input.peek(syn::Token![,]) {
                    input.parse::<syn::Token![,]>()?;
                }
            }
            Ok(())
        })?;
    }
    if attrs.code.is_none() && attrs.name.is_none() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[derive(AmqpDescribed)] needs #[amqp(descriptor = N)] or #[amqp(name = \"...\")]",
        ));
    }
    Ok(attrs)
}

fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut field_attrs = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("amqp") {
            continue;
        }
        attr.parse_args_with(|input: syn::parse::ParseStream| {
            while !input.is_empty() {
                let ident = input.parse::<syn::Ident>()?;
                if ident == "default" {
                    field_attrs.default = true;
                } else {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown attribute: {}", ident),
                    ));
                }

                if input.peek(syn::Token![,]) {
                    input.parse::<syn::Token![,]>()?;
                }
            }
            Ok(())
        })?;
    }
    Ok(field_attrs)
}

fn last_segment_is(ty: &Type, name: &str) -> bool {
    if let Type::Path(type_path) = ty {
        type_path
            .path
            .segments
            .last()
            .map_or(false, |seg| seg.ident == name)
    } else {
        false
    }
}

/// Extract the inner type `T` from `Option<T>`
fn extract_inner_type_from_option(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner_ty)) => Some(inner_ty),
            _ => None,
        },
        _ => None,
    }
}

/// Derive macro mapping a struct with named fields onto an AMQP described list.
///
/// Generates `From<T> for AmqpValue` and `TryFrom<AmqpValue> for T`. Fields are list elements in
/// declaration order; trailing null elements are left off when encoding and read as null when
/// decoding.
///
/// * `Option<T>` fields encode `None` as null and decode null as `None`.
/// * `#[amqp(default)]` fields decode null as `Default::default()`.
/// * Any other field is mandatory, unless its type is `AmqpValue` itself.
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(AmqpDescribed)]
/// #[amqp(descriptor = 0x10, name = "amqp:open:list")]
/// struct Open {
///     container_id: String,
///     hostname: Option<String>,
///     #[amqp(default)]
///     channel_max: u16,
/// }
/// ```
#[proc_macro_derive(AmqpDescribed, attributes(amqp))]
pub fn derive_amqp_described(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let descriptor = get_descriptor_attributes(input)?;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "AmqpDescribed only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "AmqpDescribed only supports structs",
            ))
        }
    };

    let mut field_idents = Vec::new();
    let mut field_types = Vec::new();
    let mut field_attrs_list = Vec::new();
    for f in fields {
        field_idents.push(f.ident.clone().ok_or_else(|| {
            syn::Error::new_spanned(f, "AmqpDescribed only supports named fields")
        })?);
        field_types.push(f.ty.clone());
        field_attrs_list.push(get_field_attributes(&f.attrs)?);
    }

    let encode_descriptor = match (&descriptor.code, &descriptor.name) {
        (Some(code), _) => quote! { ::amqp_codec::AmqpValue::Ulong(#code) },
        (None, Some(sym)) => quote! {
            ::amqp_codec::AmqpValue::Symbol(::amqp_codec::Symbol::new(#sym))
        },
        (None, None) => {
            return Err(syn::Error::new_spanned(name, "AmqpDescribed needs a descriptor"))
        }
    };

    let mut descriptor_arms = Vec::new();
    if let Some(code) = descriptor.code {
        descriptor_arms.push(quote! { ::amqp_codec::AmqpValue::Ulong(#code) => {} });
    }
    if let Some(sym) = &descriptor.name {
        descriptor_arms.push(quote! {
            ::amqp_codec::AmqpValue::Symbol(s) if s.as_str() == #sym => {}
        });
    }

    let field_encode = field_idents.iter().map(|ident| {
        quote! { ::amqp_codec::AmqpValue::from(value.#ident), }
    });

    let mut field_decode = Vec::new();
    for (ident, ty, attrs) in izip!(&field_idents, &field_types, &field_attrs_list) {
        let conversion = if let Some(inner_ty) = extract_inner_type_from_option(ty) {
            quote! {
                match element {
                    ::amqp_codec::AmqpValue::Null => None,
                    element => Some(
                        <#inner_ty as ::core::convert::TryFrom<::amqp_codec::AmqpValue>>::try_from(element)
                            .map_err(::amqp_codec::AmqpCodecError::from)?,
                    ),
                }
            }
        } else if attrs.default {
            quote! {
                if element.is_null() {
                    ::core::default::Default::default()
                } else {
                    <#ty as ::core::convert::TryFrom<::amqp_codec::AmqpValue>>::try_from(element)
                        .map_err(::amqp_codec::AmqpCodecError::from)?
                }
            }
        } else if last_segment_is(ty, "AmqpValue") {
            quote! { element }
        } else {
            quote! {
                if element.is_null() {
                    return Err(::amqp_codec::AmqpCodecError::Encoding(format!(
                        "Mandatory field '{}' of {} is null",
                        stringify!(#ident),
                        stringify!(#name)
                    )));
                } else {
                    <#ty as ::core::convert::TryFrom<::amqp_codec::AmqpValue>>::try_from(element)
                        .map_err(::amqp_codec::AmqpCodecError::from)?
                }
            }
        };
        field_decode.push(quote! {
            #ident: {
                let element = elements.next().unwrap_or(::amqp_codec::AmqpValue::Null);
                #conversion
            },
        });
    }
    let field_count = field_idents.len();

    Ok(quote! {
        impl #impl_generics ::core::convert::From<#name #ty_generics> for ::amqp_codec::AmqpValue #where_clause {
            fn from(value: #name #ty_generics) -> Self {
                let mut elements: ::std::vec::Vec<::amqp_codec::AmqpValue> = vec![
                    #(#field_encode)*
                ];
                while elements.last().map_or(false, ::amqp_codec::AmqpValue::is_null) {
                    elements.pop();
                }
                ::amqp_codec::AmqpValue::described(#encode_descriptor, ::amqp_codec::AmqpValue::List(elements))
            }
        }

        impl #impl_generics ::core::convert::TryFrom<::amqp_codec::AmqpValue> for #name #ty_generics #where_clause {
            type Error = ::amqp_codec::AmqpCodecError;

            fn try_from(value: ::amqp_codec::AmqpValue) -> ::amqp_codec::Result<Self> {
                let described = ::amqp_codec::Described::try_from(value)?;
                match &described.descriptor {
                    #(#descriptor_arms)*
                    other => {
                        return Err(::amqp_codec::AmqpCodecError::Encoding(format!(
                            "Unexpected descriptor {:?} for {}",
                            other,
                            stringify!(#name)
                        )))
                    }
                }
                let elements = ::std::vec::Vec::<::amqp_codec::AmqpValue>::try_from(described.value)?;
                if elements.len() > #field_count {
                    return Err(::amqp_codec::AmqpCodecError::Encoding(format!(
                        "{} has {} fields but the list holds {} elements",
                        stringify!(#name),
                        #field_count,
                        elements.len()
                    )));
                }
                let mut elements = elements.into_iter();
                Ok(Self {
                    #(#field_decode)*
                })
            }
        }
    })
}
