//! Attribute macros that run async entry points and tests on the
//! `core-async` runtime without downstream crates naming Tokio.
//!
//! `#[core_async::test(start_paused)]` builds the test runtime with a paused
//! clock so timer-driven code advances deterministically.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

#[derive(Default)]
struct RuntimeOptions {
    start_paused: bool,
}

fn parse_options(attr: TokenStream2) -> syn::Result<RuntimeOptions> {
    let mut options = RuntimeOptions::default();
    if attr.is_empty() {
        return Ok(options);
    }

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("start_paused") {
            options.start_paused = true;
            Ok(())
        } else {
            Err(meta.error("unsupported core_async attribute option; expected `start_paused`"))
        }
    });
    syn::parse::Parser::parse2(parser, attr)?;
    Ok(options)
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    let options = match parse_options(TokenStream2::from(attr)) {
        Ok(options) => options,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    if options.start_paused && matches!(kind, MacroKind::Main) {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "`start_paused` is only supported on #[core_async::test]",
        )
        .to_compile_error()
        .into();
    }

    let mut sync_sig = input.sig.clone();
    sync_sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let runner = if options.start_paused {
        quote!(core_async::runtime::block_on_paused)
    } else {
        quote!(core_async::runtime::block_on)
    };

    let expanded = match kind {
        MacroKind::Test => quote! {
            #(#attrs)*
            #[test]
            #vis #sync_sig {
                #runner(async move #block)
            }
        },
        MacroKind::Main => quote! {
            #(#attrs)*
            #vis #sync_sig {
                #runner(async move #block)
            }
        },
    };

    expanded.into()
}
