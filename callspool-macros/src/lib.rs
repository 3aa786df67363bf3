// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.
// Copyright 2025 Veecle GmbH.
//
// This file has been modified from the original TiKV implementation.

//! The `#[traced]` attribute for [`callspool`](https://crates.io/crates/callspool).

use std::collections::HashSet;

use proc_macro2::{Ident, Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::visit::{self, Visit};
use syn::*;

struct Arguments {
    tracer: Option<Expr>,
    name: Option<LitStr>,
    summary: bool,
    callspool_crate: Option<syn::Path>,
}

impl Parse for Arguments {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut tracer = None;
        let mut name = None;
        let mut summary = false;
        let mut callspool_crate = None;
        let mut seen = HashSet::new();

        while !input.is_empty() {
            // `crate` is a keyword, so a plain `Ident` parse would reject it.
            let ident = input.call(Ident::parse_any)?;
            if !seen.insert(ident.to_string()) {
                return Err(Error::new(ident.span(), "duplicate argument"));
            }
            input.parse::<Token![=]>()?;
            match ident.to_string().as_str() {
                "tracer" => tracer = Some(input.parse::<Expr>()?),
                "name" => name = Some(input.parse::<LitStr>()?),
                "summary" => summary = input.parse::<LitBool>()?.value,
                "crate" => callspool_crate = Some(input.parse::<syn::Path>()?),
                _ => return Err(Error::new(ident.span(), "unexpected identifier")),
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(Arguments {
            tracer,
            name,
            summary,
            callspool_crate,
        })
    }
}

/// Records every call of the annotated function with a `callspool::Tracer`.
///
/// The body runs inside [`Tracer::call`] or, when the declared return type is a `Result`, inside
/// [`Tracer::try_call`] so that `Err` is recorded as a failure. Arguments, return values and
/// panics pass through unchanged.
///
/// [`Tracer::call`]: https://docs.rs/callspool/latest/callspool/struct.Tracer.html#method.call
/// [`Tracer::try_call`]: https://docs.rs/callspool/latest/callspool/struct.Tracer.html#method.try_call
///
/// ## Arguments
///
/// * `tracer` - Expression evaluating to a `Tracer` (or something dereferencing to one). Required.
/// * `name` - Unit name of the records. Defaults to the function name.
/// * `summary` - Whether to keep a bounded `Debug` rendering of the result. Defaults to `false`.
/// * `crate` - Path to the `callspool` crate, for when it is renamed or re-exported.
///
/// Async functions are not supported.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
///
/// use callspool::{Engine, Tracer, traced};
///
/// static ENGINE: LazyLock<Engine> = LazyLock::new(|| Engine::builder().build().unwrap());
/// static TRACER: LazyLock<Tracer> = LazyLock::new(|| ENGINE.tracer("example"));
///
/// #[traced(tracer = TRACER)]
/// fn add(a: u32, b: u32) -> u32 {
///     a + b
/// }
///
/// #[traced(tracer = TRACER, name = "parse_port", summary = true)]
/// fn parse(input: &str) -> Result<u16, std::num::ParseIntError> {
///     input.parse()
/// }
/// # assert_eq!(add(1, 2), 3);
/// # assert!(parse("http").is_err());
/// ```
///
/// The second function expands to roughly:
///
/// ```
/// # use std::sync::LazyLock;
/// # use callspool::{Engine, Tracer};
/// # static ENGINE: LazyLock<Engine> = LazyLock::new(|| Engine::builder().build().unwrap());
/// # static TRACER: LazyLock<Tracer> = LazyLock::new(|| ENGINE.tracer("example"));
/// fn parse(input: &str) -> Result<u16, std::num::ParseIntError> {
///     let __tracer__ = &TRACER;
///     let __site__ = callspool::CallSite::new(module_path!(), "parse_port");
///     __tracer__.try_call_summarized(__site__, || -> Result<u16, std::num::ParseIntError> {
///         input.parse()
///     })
/// }
/// ```
#[proc_macro_attribute]
pub fn traced(
    arguments: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let arguments = parse_macro_input!(arguments as Arguments);
    let input = parse_macro_input!(item as ItemFn);

    match expand(&arguments, input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(arguments: &Arguments, input: ItemFn) -> Result<TokenStream> {
    if let Some(asyncness) = &input.sig.asyncness {
        return Err(Error::new(
            asyncness.span,
            "`#[traced]` does not support async functions",
        ));
    }
    if let Some(constness) = &input.sig.constness {
        return Err(Error::new(
            constness.span,
            "`#[traced]` does not support const functions",
        ));
    }
    let Some(tracer) = &arguments.tracer else {
        return Err(Error::new(
            Span::call_site(),
            "missing `tracer` argument, e.g. `#[traced(tracer = TRACER)]`",
        ));
    };

    let callspool_crate = match &arguments.callspool_crate {
        Some(path) => path.clone(),
        None => callspool_path()?,
    };

    let block = generate_block(&input, tracer, arguments, &callspool_crate)?;

    let ItemFn {
        attrs, vis, sig, ..
    } = input;

    // `#sig` and the original braces keep their source spans so coverage maps to the user's code.
    Ok(quote!(
        #(#attrs) *
        #vis #sig
        #block
    ))
}

fn generate_name(function_name: &Ident, arguments: &Arguments) -> Result<LitStr> {
    match &arguments.name {
        Some(name) if name.value().is_empty() => {
            Err(Error::new(name.span(), "`name` can not be empty"))
        }
        Some(name) => Ok(name.clone()),
        None => {
            let unqualified = function_name.to_string();
            let unqualified = unqualified.strip_prefix("r#").unwrap_or(&unqualified);
            Ok(LitStr::new(unqualified, function_name.span()))
        }
    }
}

/// Picks the `Tracer` method matching the declared return type.
fn method_name(output: &ReturnType, summary: bool, span: Span) -> Ident {
    let fallible = match output {
        ReturnType::Type(_, ty) => returns_result(ty),
        ReturnType::Default => false,
    };
    let name = match (fallible, summary) {
        (false, false) => "call",
        (false, true) => "call_summarized",
        (true, false) => "try_call",
        (true, true) => "try_call_summarized",
    };
    Ident::new(name, span)
}

fn returns_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        Type::Group(group) => returns_result(&group.elem),
        Type::Paren(paren) => returns_result(&paren.elem),
        _ => false,
    }
}

/// Finds types a closure return annotation can not spell.
#[derive(Default)]
struct Unnameable {
    found: bool,
}

impl<'ast> Visit<'ast> for Unnameable {
    fn visit_type_impl_trait(&mut self, _: &'ast TypeImplTrait) {
        self.found = true;
    }

    fn visit_type_reference(&mut self, reference: &'ast TypeReference) {
        if reference.lifetime.is_none() {
            self.found = true;
        }
        visit::visit_type_reference(self, reference);
    }

    fn visit_lifetime(&mut self, lifetime: &'ast Lifetime) {
        if lifetime.ident == "_" {
            self.found = true;
        }
    }
}

/// Returns the `-> T` annotation for the wrapping closure, so `?` and `return` in the body infer
/// the same type the function declares.
fn closure_output(output: &ReturnType) -> TokenStream {
    let ReturnType::Type(arrow, ty) = output else {
        return quote!(-> ());
    };

    let mut unnameable = Unnameable::default();
    unnameable.visit_type(ty);
    if unnameable.found {
        TokenStream::new()
    } else {
        quote!(#arrow #ty)
    }
}

/// Generates the instrumented body as a [`Block`] reusing the original brace tokens.
fn generate_block(
    input: &ItemFn,
    tracer: &Expr,
    arguments: &Arguments,
    callspool_crate: &syn::Path,
) -> Result<Block> {
    let span = input.sig.ident.span();
    let name = generate_name(&input.sig.ident, arguments)?;
    let method = method_name(&input.sig.output, arguments.summary, span);
    let output = closure_output(&input.sig.output);
    let stmts = &input.block.stmts;

    let wrapper: Block = syn::parse2(quote_spanned!(span=> {
        let __tracer__ = &#tracer;
        let __site__ = #callspool_crate::CallSite::new(::core::module_path!(), #name);
        __tracer__.#method(__site__, || #output { #(#stmts)* })
    }))?;

    Ok(Block {
        brace_token: input.block.brace_token,
        stmts: wrapper.stmts,
    })
}

/// Returns a path to the `callspool` crate for use when macro users don't set it explicitly.
fn callspool_path() -> Result<syn::Path> {
    proc_macro_crate::crate_name("callspool")
        .map(|found| match found {
            proc_macro_crate::FoundCrate::Itself => {
                // Only doc-tests expand the macro from within `callspool`, and they need the
                // external path anyway.
                syn::parse_quote!(::callspool)
            }
            proc_macro_crate::FoundCrate::Name(name) => {
                let ident = Ident::new(&name, Span::call_site());
                syn::parse_quote!(::#ident)
            }
        })
        .map_err(|_| Error::new(Span::call_site(), "could not find the callspool crate"))
}

#[cfg(test)]
mod tests {
    use quote::quote;
    use syn::{ReturnType, parse_quote};

    use super::{Arguments, closure_output, method_name};

    fn method(output: ReturnType, summary: bool) -> String {
        method_name(&output, summary, proc_macro2::Span::call_site()).to_string()
    }

    #[test]
    fn method_follows_return_type() {
        assert_eq!(method(parse_quote!(), false), "call");
        assert_eq!(method(parse_quote!(-> u8), true), "call_summarized");
        assert_eq!(method(parse_quote!(-> Result<u8, String>), false), "try_call");
        assert_eq!(
            method(parse_quote!(-> std::io::Result<()>), true),
            "try_call_summarized"
        );
        assert_eq!(method(parse_quote!(-> Option<u8>), false), "call");
    }

    #[test]
    fn closure_annotation_skips_unnameable_types() {
        let output = |output: ReturnType| closure_output(&output).to_string();

        assert_eq!(output(parse_quote!(-> u8)), quote!(-> u8).to_string());
        assert_eq!(output(parse_quote!()), quote!(-> ()).to_string());
        assert_eq!(output(parse_quote!(-> impl Iterator<Item = u8>)), "");
        assert_eq!(output(parse_quote!(-> &str)), "");
        assert_eq!(
            output(parse_quote!(-> &'static str)),
            quote!(-> &'static str).to_string()
        );
    }

    #[test]
    fn arguments_parse() {
        let arguments: Arguments =
            syn::parse2(quote!(tracer = TRACER, name = "unit", summary = true, crate = ::renamed))
                .unwrap();
        assert!(arguments.tracer.is_some());
        assert_eq!(arguments.name.unwrap().value(), "unit");
        assert!(arguments.summary);
        assert!(arguments.callspool_crate.is_some());
    }

    #[test]
    fn duplicate_arguments_are_rejected() {
        let error = syn::parse2::<Arguments>(quote!(tracer = A, tracer = B))
            .err()
            .unwrap();
        assert_eq!(error.to_string(), "duplicate argument");
    }
}
