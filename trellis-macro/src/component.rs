use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Ident, Lit,
    LitBool, LitStr, Meta,
};

#[derive(Default)]
struct ComponentArgs {
    name: Option<LitStr>,
    start: Option<LitStr>,
    stop: Option<LitStr>,
    lazy: Option<LitBool>,
    groups: Vec<LitStr>,
}

pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    generate_component_impl(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn generate_component_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let args = parse_component_args(&input.attrs)?;

    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Component)] can only be applied to structs",
            ))
        }
    };

    let (construct, autowired) = match &data.fields {
        Fields::Named(fields) => {
            let mut autowired = Vec::new();
            let mut inits = Vec::new();
            for field in &fields.named {
                let Some(ident) = field.ident.as_ref() else {
                    continue;
                };
                inits.push(quote!(#ident: ::std::default::Default::default()));
                if let Some(spec) = autowire_spec(field)? {
                    autowired.push((ident.clone(), spec));
                }
            }
            (quote!(Self { #(#inits),* }), autowired)
        }
        Fields::Unit => (quote!(Self), Vec::new()),
        Fields::Unnamed(fields) => {
            return Err(syn::Error::new_spanned(
                fields,
                "#[derive(Component)] only supports structs with named fields",
            ))
        }
    };

    let named = args.name.as_ref().map(|name| quote!(.named(#name)));

    let wires = autowired.iter().map(|(ident, _)| {
        let property = ident.to_string();
        quote!(.wire(#property, |this| &this.#ident))
    });

    let decorated = if autowired.is_empty() {
        None
    } else {
        let properties = autowired.iter().map(|(ident, spec)| {
            let property = ident.to_string();
            quote!(.property(#property, #spec))
        });
        Some(quote! {
            .decorated(::trellis::AutowireDeclaration::new() #(#properties)*)
        })
    };

    let start = args
        .start
        .as_ref()
        .map(|method| lifecycle_method(method, quote!(start_method)))
        .transpose()?;
    let stop = args
        .stop
        .as_ref()
        .map(|method| lifecycle_method(method, quote!(stop_method)))
        .transpose()?;

    let lazy = args.lazy.as_ref().map(|lazy| quote!(.lazy(#lazy)));
    let groups = args.groups.iter().map(|group| quote!(.group(#group)));

    Ok(quote! {
        impl #impl_generics ::trellis::Component for #struct_name #ty_generics #where_clause {
            fn class() -> ::trellis::Class {
                ::trellis::Class::builder(|_args| ::std::result::Result::Ok(#construct))
                    #named
                    #(#wires)*
                    #decorated
                    #start
                    #stop
                    #lazy
                    #(#groups)*
                    .build()
            }
        }
    })
}

/// Registers `method` on the class and marks it with `marker`
fn lifecycle_method(method: &LitStr, marker: TokenStream2) -> syn::Result<TokenStream2> {
    let ident: Ident = method.parse()?;
    Ok(quote! {
        .method(#method, |this: ::std::sync::Arc<Self>| async move {
            ::std::result::Result::<(), ::trellis::anyhow::Error>::Ok(Self::#ident(&this).await?)
        })
        .#marker(#method)
    })
}

fn parse_component_args(attrs: &[Attribute]) -> syn::Result<ComponentArgs> {
    let mut args = ComponentArgs::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("component")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("start") {
                args.start = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("stop") {
                args.stop = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("lazy") {
                // A bare `lazy` means `lazy = true`
                args.lazy = Some(if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse()?
                } else {
                    LitBool::new(true, meta.path.get_ident().map_or_else(
                        proc_macro2::Span::call_site,
                        Ident::span,
                    ))
                });
            } else if meta.path.is_ident("group") {
                args.groups.push(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unsupported component attribute"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

/// `#[autowire]` wires by field name, `#[autowire = "..."]` takes a sigil string
fn autowire_spec(field: &Field) -> syn::Result<Option<String>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("autowire")) else {
        return Ok(None);
    };

    match &attr.meta {
        Meta::Path(_) => Ok(field.ident.as_ref().map(Ident::to_string)),
        Meta::NameValue(pair) => match &pair.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(spec),
                ..
            }) => Ok(Some(spec.value())),
            other => Err(syn::Error::new_spanned(other, "expected a string literal")),
        },
        Meta::List(list) => Err(syn::Error::new_spanned(
            list,
            "use #[autowire] or #[autowire = \"...\"]",
        )),
    }
}
