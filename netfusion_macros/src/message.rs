use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{DeriveInput, LitStr, Type};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Command,
    DomainEvent,
    Query,
}

struct MessageAttrs {
    name: Option<String>,
    output: Option<Type>,
    route_key: Option<String>,
}

pub fn derive_message(input: TokenStream, role: MessageRole) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    let attrs = match parse_message_attrs(&input) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };

    if let Err(err) = check_output(&attrs, role) {
        return err.to_compile_error().into();
    }

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = attrs.name.clone().unwrap_or_else(|| ident.to_string());
    let name_lit = LitStr::new(&name, Span::call_site());

    let kind = match role {
        MessageRole::Command => quote! { ::netfusion::MessageKind::Command },
        MessageRole::DomainEvent => quote! { ::netfusion::MessageKind::DomainEvent },
        MessageRole::Query => quote! { ::netfusion::MessageKind::Query },
    };

    let route_key_fn = attrs.route_key.as_ref().map(|field| {
        let field = format_ident!("{}", field);
        quote! {
            fn route_key(&self) -> ::std::option::Option<::std::string::String> {
                ::std::option::Option::Some(self.#field.to_string())
            }
        }
    });

    let role_impl = match role {
        MessageRole::Command => {
            let output = attrs
                .output
                .as_ref()
                .map(|ty| quote! { #ty })
                .unwrap_or_else(|| quote! { () });
            quote! {
                impl #impl_generics ::netfusion::Command for #ident #ty_generics #where_clause {
                    type Output = #output;
                }
            }
        }
        MessageRole::DomainEvent => quote! {
            impl #impl_generics ::netfusion::DomainEvent for #ident #ty_generics #where_clause {}
        },
        MessageRole::Query => {
            let output = &attrs.output;
            quote! {
                impl #impl_generics ::netfusion::Query for #ident #ty_generics #where_clause {
                    type Output = #output;
                }
            }
        }
    };

    let expanded = quote! {
        impl #impl_generics ::netfusion::Message for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name_lit;
            const KIND: ::netfusion::MessageKind = #kind;

            #route_key_fn
        }

        #role_impl
    };

    TokenStream::from(expanded)
}

fn parse_message_attrs(input: &DeriveInput) -> syn::Result<MessageAttrs> {
    let mut attrs = MessageAttrs {
        name: None,
        output: None,
        route_key: None,
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("message") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.name = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("output") {
                let value: Type = meta.value()?.parse()?;
                attrs.output = Some(value);
                Ok(())
            } else if meta.path.is_ident("route_key") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.route_key = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `name`, `output` or `route_key`"))
            }
        })?;
    }

    Ok(attrs)
}

fn check_output(attrs: &MessageAttrs, role: MessageRole) -> syn::Result<()> {
    match role {
        MessageRole::DomainEvent if attrs.output.is_some() => Err(syn::Error::new(
            Span::call_site(),
            "domain events do not produce a result; remove `output`",
        )),
        MessageRole::Query if attrs.output.is_none() => Err(syn::Error::new(
            Span::call_site(),
            "queries require `#[message(output = Type)]`",
        )),
        _ => Ok(()),
    }
}
