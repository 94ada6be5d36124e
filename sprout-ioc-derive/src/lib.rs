//! Derive macros for sprout-ioc
//!
//! - `#[derive(Component)]` - Generate the `Component` descriptor of a bean
//! - `#[derive(Entity)]` - Generate column access for a repository entity
//!
//! # Component Example
//!
//! ```rust,ignore
//! use sprout_ioc::{Autowired, Component, TxContext};
//! use std::sync::Arc;
//!
//! #[derive(Component)]
//! #[component(service, transactional(join), provides(dyn MemberService),
//!             proxy(dyn MemberService => MemberServiceProxy))]
//! struct SimpleMemberService {
//!     #[dep]
//!     clock: Arc<Clock>,
//!     #[inject]
//!     repository: Autowired<dyn MemberRepository>,
//!     // Fields without #[dep]/#[inject] use Default
//!     joined: AtomicU64,
//! }
//! ```
//!
//! # Entity Example
//!
//! ```rust,ignore
//! use sprout_ioc::Entity;
//!
//! #[derive(Debug, Default, Entity)]
//! #[entity(table = "members")]
//! struct Member {
//!     id: i64,
//!     user_name: String,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parse;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Field, Fields, Ident, LitStr, Token, Type,
};

/// Named fields of a struct (empty for unit structs).
fn struct_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> syn::Result<Vec<&'a Field>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields.named.iter().collect()),
            Fields::Unit => Ok(Vec::new()),
            Fields::Unnamed(_) => Err(syn::Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

/// Extract `T` from `Wrapper<T>`
fn extract_inner_type<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    if let Type::Path(type_path) = ty {
        let segment = type_path.path.segments.last()?;
        if segment.ident == wrapper {
            if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    return Some(inner);
                }
            }
        }
    }
    None
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

// =============================================================================
// Component Derive Macro
// =============================================================================

/// Parsed `#[component(...)]` attributes
#[derive(Default)]
struct ComponentAttrs {
    name: Option<LitStr>,
    stereotypes: Vec<Ident>,
    transactional: bool,
    transactional_methods: Vec<Ident>,
    provides: Vec<Type>,
    proxies: Vec<(Type, Type)>,
    post_processor: bool,
}

impl ComponentAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("component")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    out.name = Some(meta.value()?.parse()?);
                    return Ok(());
                }
                for stereotype in ["service", "repository", "controller"] {
                    if meta.path.is_ident(stereotype) {
                        out.stereotypes
                            .push(Ident::new(&stereotype.to_uppercase(), meta.path.span()));
                        return Ok(());
                    }
                }
                if meta.path.is_ident("transactional") {
                    if meta.input.peek(syn::token::Paren) {
                        meta.parse_nested_meta(|method| {
                            out.transactional_methods
                                .push(method.path.require_ident()?.clone());
                            Ok(())
                        })?;
                    } else {
                        out.transactional = true;
                    }
                    return Ok(());
                }
                if meta.path.is_ident("provides") {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let types: Punctuated<Type, Token![,]> =
                        content.parse_terminated(Type::parse, Token![,])?;
                    out.provides.extend(types);
                    return Ok(());
                }
                if meta.path.is_ident("proxy") {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let interface: Type = content.parse()?;
                    content.parse::<Token![=>]>()?;
                    let proxy: Type = content.parse()?;
                    out.proxies.push((interface, proxy));
                    return Ok(());
                }
                if meta.path.is_ident("post_processor") {
                    out.post_processor = true;
                    return Ok(());
                }
                Err(meta.error("unsupported component attribute"))
            })?;
        }
        Ok(out)
    }
}

/// Derive macro for the `Component` trait.
///
/// # Struct attributes (`#[component(...)]`)
///
/// - `name = "..."` - Explicit bean name
/// - `service` / `repository` / `controller` - Stereotype markers
/// - `transactional` - Every method runs in a transaction
/// - `transactional(a, b)` - Only the listed methods do
/// - `provides(dyn A, dyn B)` - Extra types the bean is exposed as
/// - `proxy(dyn A => AProxy)` - Decorator built when the bean is
///   transactional; `dyn A` must be listed in `provides` and
///   `AProxy::new(target, interceptor)` must exist
/// - `post_processor` - Take part in the post-processor chain
///
/// # Field attributes
///
/// - `#[dep]` - Constructor parameter; the field must be `Arc<T>` or
///   `Option<Arc<T>>`
/// - `#[inject]` - Injected after construction; the field must be
///   `Autowired<T>`
///
/// Every other field starts from `Default::default()`.
#[proc_macro_derive(Component, attributes(component, dep, inject))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_component(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_component(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let attrs = ComponentAttrs::parse(&input.attrs)?;
    let fields = struct_fields(input, "Component")?;
    let is_unit = matches!(&input.data, Data::Struct(data) if matches!(data.fields, Fields::Unit));

    let mut dep_types = Vec::new();
    let mut dep_names = Vec::new();
    let mut field_inits = Vec::new();
    let mut injections = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let field_type = &field.ty;

        if has_attr(&field.attrs, "dep") {
            let valid = extract_inner_type(field_type, "Arc").is_some()
                || extract_inner_type(field_type, "Option")
                    .and_then(|inner| extract_inner_type(inner, "Arc"))
                    .is_some();
            if !valid {
                return Err(syn::Error::new_spanned(
                    field_type,
                    "Fields marked with #[dep] must have type Arc<T> or Option<Arc<T>>",
                ));
            }
            let dep_name = Ident::new(&format!("__dep_{index}"), field_name.span());
            dep_types.push(quote! { #field_type });
            field_inits.push(quote! { #field_name: #dep_name });
            dep_names.push(dep_name);
            continue;
        }

        if has_attr(&field.attrs, "inject") {
            let Some(inner) = extract_inner_type(field_type, "Autowired") else {
                return Err(syn::Error::new_spanned(
                    field_type,
                    "Fields marked with #[inject] must have type Autowired<T>",
                ));
            };
            let label = field_name.to_string();
            injections.push(quote! {
                .inject::<#inner, _>(#label, |bean| &bean.#field_name)
            });
        }

        field_inits.push(quote! {
            #field_name: ::std::default::Default::default()
        });
    }

    // Parameter list: `()`, a single `Arc<T>`, or a tuple
    let (deps_type, deps_pattern) = match dep_types.len() {
        0 => (quote! { () }, quote! { () }),
        1 => {
            let ty = &dep_types[0];
            let name = &dep_names[0];
            (quote! { #ty }, quote! { #name })
        }
        _ => (
            quote! { (#(#dep_types),*) },
            quote! { (#(#dep_names),*) },
        ),
    };

    let construct = if is_unit {
        quote! { Self }
    } else {
        quote! { Self { #(#field_inits),* } }
    };

    let named = attrs.name.as_ref().map(|lit| quote! { .named(#lit) });
    let stereotypes = attrs
        .stereotypes
        .iter()
        .map(|marker| quote! { .mark(::sprout_ioc::Markers::#marker) });
    let transactional = attrs.transactional.then(|| quote! { .transactional() });
    let methods = attrs.transactional_methods.iter().map(|method| {
        let label = method.to_string();
        quote! { .method(#label, ::sprout_ioc::Markers::TRANSACTIONAL) }
    });
    let provides = attrs.provides.iter().map(|ty| {
        quote! {
            .provides::<#ty, _>(|bean| bean as ::std::sync::Arc<#ty>)
        }
    });
    let proxies = attrs.proxies.iter().map(|(interface, proxy)| {
        quote! {
            .proxy::<#interface, _>(|target, interceptor| {
                ::std::sync::Arc::new(<#proxy>::new(target, interceptor))
                    as ::std::sync::Arc<#interface>
            })
        }
    });
    let post_processor = attrs.post_processor.then(|| quote! { .post_processor() });

    Ok(quote! {
        impl #impl_generics ::sprout_ioc::Component for #name #ty_generics #where_clause {
            fn descriptor() -> ::sprout_ioc::ComponentBuilder<Self> {
                ::sprout_ioc::TypeDescriptor::component::<Self>()
                    #named
                    #(#stereotypes)*
                    #transactional
                    #(#methods)*
                    .constructor(|#deps_pattern: #deps_type| ::std::result::Result::Ok(#construct))
                    #(#injections)*
                    #(#provides)*
                    #(#proxies)*
                    #post_processor
            }
        }
    })
}

// =============================================================================
// Entity Derive Macro
// =============================================================================

/// Derive macro for the `Entity` trait.
///
/// Every named field is a column (its snake_case name). The type must also
/// implement `Default`.
///
/// # Attributes
///
/// - `#[entity(table = "...")]` on the struct - Explicit table name
/// - `#[entity(skip)]` on a field - Not stored
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_entity(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut table: Option<LitStr> = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute"))
            }
        })?;
    }

    let mut columns: Vec<&Ident> = Vec::new();
    for field in struct_fields(input, "Entity")? {
        let mut skip = false;
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported entity field attribute"))
                }
            })?;
        }
        if let (false, Some(ident)) = (skip, field.ident.as_ref()) {
            columns.push(ident);
        }
    }

    let labels: Vec<String> = columns.iter().map(|ident| ident.to_string()).collect();
    let table_name = table.map(|lit| {
        quote! {
            fn table_name() -> ::std::option::Option<&'static str> {
                ::std::option::Option::Some(#lit)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::sprout_ioc::Entity for #name #ty_generics #where_clause {
            #table_name

            fn fields() -> &'static [&'static str] {
                &[#(#labels),*]
            }

            fn field_value(&self, field: &str) -> ::std::option::Option<::sprout_ioc::SqlValue> {
                match field {
                    #(
                        #labels => ::std::option::Option::Some(::sprout_ioc::SqlValue::from(
                            ::std::clone::Clone::clone(&self.#columns),
                        )),
                    )*
                    _ => ::std::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                field: &str,
                value: ::sprout_ioc::SqlValue,
            ) -> ::sprout_ioc::Result<()> {
                match field {
                    #(
                        #labels => {
                            self.#columns = ::sprout_ioc::jdbc::convert::<Self, _>(field, value)?;
                        }
                    )*
                    _ => {}
                }
                ::std::result::Result::Ok(())
            }
        }
    })
}
