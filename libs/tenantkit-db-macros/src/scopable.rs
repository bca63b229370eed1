use heck::ToUpperCamelCase;
use proc_macro_error2::abort;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, spanned::Spanned};

/// One scope dimension: either a named column or an explicit opt-out.
#[derive(Default)]
struct Dimension {
    col: Option<(String, Span)>,
    opt_out: Option<Span>,
}

impl Dimension {
    fn set_col(&mut self, name: &str, value: String, span: Span) {
        if self.col.is_some() {
            abort!(span, "duplicate attribute '{}_col'", name);
        }
        if self.opt_out.is_some() {
            abort!(
                span,
                "secure: specify either `{}_col` or `no_{}`, not both",
                name,
                name
            );
        }
        self.col = Some((value, span));
    }

    fn set_opt_out(&mut self, name: &str, span: Span) {
        if self.opt_out.is_some() {
            abort!(span, "duplicate attribute 'no_{}'", name);
        }
        if self.col.is_some() {
            abort!(
                span,
                "secure: specify either `{}_col` or `no_{}`, not both",
                name,
                name
            );
        }
        self.opt_out = Some(span);
    }

    fn is_declared(&self) -> bool {
        self.col.is_some() || self.opt_out.is_some()
    }
}

/// Configuration parsed from `#[secure(...)]` attributes
#[derive(Default)]
struct SecureConfig {
    tenant: Dimension,
    resource: Dimension,
    unrestricted: Option<Span>,
}

#[allow(clippy::needless_pass_by_value)] // DeriveInput is consumed by proc-macro pattern
pub fn expand_derive_scopable(input: DeriveInput) -> TokenStream {
    if !matches!(&input.data, Data::Struct(_)) {
        abort!(
            input.span(),
            "#[derive(Scopable)] can only be applied to structs"
        );
    }

    let config = parse_secure_attrs(&input);
    validate_config(&config, input.span());

    let entity_ident = syn::Ident::new("Entity", input.ident.span());

    if config.unrestricted.is_some() {
        return quote! {
            impl ::tenantkit_db::secure::ScopableEntity for #entity_ident {
                const IS_UNRESTRICTED: bool = true;

                fn tenant_col() -> ::core::option::Option<Self::Column> {
                    ::core::option::Option::None
                }

                fn resource_col() -> ::core::option::Option<Self::Column> {
                    ::core::option::Option::None
                }
            }
        };
    }

    let tenant_col_impl = generate_col_impl(
        "tenant_col",
        config.tenant.col.as_ref(),
        input.ident.span(),
    );
    let resource_col_impl = generate_col_impl(
        "resource_col",
        config.resource.col.as_ref(),
        input.ident.span(),
    );

    quote! {
        impl ::tenantkit_db::secure::ScopableEntity for #entity_ident {
            const IS_UNRESTRICTED: bool = false;

            #tenant_col_impl

            #resource_col_impl
        }
    }
}

fn generate_col_impl(
    method_name: &str,
    col: Option<&(String, Span)>,
    default_span: Span,
) -> TokenStream {
    let method_ident = syn::Ident::new(method_name, default_span);

    if let Some((col_name, _)) = col {
        let col_ident = syn::Ident::new(&col_name.to_upper_camel_case(), default_span);
        quote! {
            fn #method_ident() -> ::core::option::Option<Self::Column> {
                ::core::option::Option::Some(Self::Column::#col_ident)
            }
        }
    } else {
        quote! {
            fn #method_ident() -> ::core::option::Option<Self::Column> {
                ::core::option::Option::None
            }
        }
    }
}

fn validate_config(config: &SecureConfig, struct_span: Span) {
    if let Some(unrestricted_span) = config.unrestricted {
        if config.tenant.is_declared() || config.resource.is_declared() {
            abort!(
                unrestricted_span,
                "When using 'unrestricted', no other column attributes are allowed"
            );
        }
        return;
    }

    for (name, dim) in [("tenant", &config.tenant), ("resource", &config.resource)] {
        if !dim.is_declared() {
            abort!(
                struct_span,
                "secure: missing explicit decision for {}:\n  use `{}_col = \"column_name\"` or `no_{}`",
                name,
                name,
                name
            );
        }
    }
}

fn parse_secure_attrs(input: &DeriveInput) -> SecureConfig {
    let mut config = SecureConfig::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("secure") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            let span = meta.path.span();
            let key = meta
                .path
                .get_ident()
                .map(ToString::to_string)
                .unwrap_or_default();

            match key.as_str() {
                "unrestricted" => {
                    if config.unrestricted.is_some() {
                        abort!(span, "duplicate attribute 'unrestricted'");
                    }
                    config.unrestricted = Some(span);
                }
                "no_tenant" => config.tenant.set_opt_out("tenant", span),
                "no_resource" => config.resource.set_opt_out("resource", span),
                "tenant_col" | "resource_col" => {
                    let value: String = match meta.value() {
                        Ok(v) => match v.parse::<syn::LitStr>() {
                            Ok(lit) => lit.value(),
                            Err(_) => abort!(span, "Expected string literal"),
                        },
                        Err(_) => abort!(span, "Expected '=' followed by a string value"),
                    };
                    if key == "tenant_col" {
                        config.tenant.set_col("tenant", value, span);
                    } else {
                        config.resource.set_col("resource", value, span);
                    }
                }
                "" => abort!(span, "Expected attribute name"),
                other => abort!(
                    span,
                    "Unknown attribute '{}'. Valid attributes: tenant_col, no_tenant, resource_col, no_resource, unrestricted",
                    other
                ),
            }

            Ok(())
        });

        if let Err(err) = result {
            abort!(err.span(), "{}", err);
        }
    }

    config
}
