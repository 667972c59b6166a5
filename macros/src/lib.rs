use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, spanned::Spanned, Ident, ItemFn, LitStr};

/// Test attribute used across the rxmaybe test-suite.
///
/// Sync tests expand to `#[test]`, async tests to `#[tokio::test]`. Every test
/// installs a `tracing-subscriber` test writer first so coordinator logs show up
/// next to failing assertions (`RUST_LOG=rxmaybe=trace`).
///
/// Async tests accept a runtime flavor: `#[rxmaybe_macro::test(local)]` runs on
/// a current-thread runtime, `#[rxmaybe_macro::test(shared)]` on a
/// multi-thread runtime.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let mut input = parse_macro_input!(item as ItemFn);

  let is_async = input.sig.asyncness.is_some();

  let raw_args = proc_macro2::TokenStream::from(attr);
  let tokio_args = if raw_args.is_empty() {
    proc_macro2::TokenStream::new()
  } else {
    if !is_async {
      return syn::Error::new(
        raw_args.span(),
        "rxmaybe_macro::test flavor args are only supported for async tests",
      )
      .to_compile_error()
      .into();
    }

    let flavor = if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
      Some((ident.to_string(), ident.span()))
    } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
      Some((lit.value(), lit.span()))
    } else {
      None
    };

    match flavor {
      Some((name, _)) if name == "local" => quote!(flavor = "current_thread"),
      Some((name, _)) if name == "shared" => quote!(flavor = "multi_thread"),
      Some((_, span)) => {
        return syn::Error::new(span, "rxmaybe_macro::test only accepts `local` or `shared`")
          .to_compile_error()
          .into();
      }
      None => {
        return syn::Error::new(
          raw_args.span(),
          "rxmaybe_macro::test only accepts: #[rxmaybe_macro::test], \
           #[rxmaybe_macro::test(local)] or #[rxmaybe_macro::test(shared)]",
        )
        .to_compile_error()
        .into();
      }
    }
  };

  let init_logging: syn::Stmt = parse_quote! {
    let _ = ::tracing_subscriber::fmt()
      .with_env_filter(::tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  };
  input.block.stmts.insert(0, init_logging);

  let native_attr = if is_async { quote!(#[::tokio::test(#tokio_args)]) } else { quote!(#[test]) };

  let expanded = quote! {
      #native_attr
      #input
  };

  TokenStream::from(expanded)
}
