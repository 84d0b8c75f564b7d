use proc_macro::TokenStream;
use quote::quote;
use std::sync::OnceLock;
use syn::{
  parse::{Parse, ParseStream},
  ItemFn,
};

static IS_SUPPORT_DOCKER: OnceLock<bool> = OnceLock::new();

fn is_support_docker() -> bool {
  *IS_SUPPORT_DOCKER.get_or_init(|| {
    std::process::Command::new("docker")
      .arg("info")
      .stdout(std::process::Stdio::null())
      .stderr(std::process::Stdio::null())
      .status()
      .map_or(false, |status| status.success())
  })
}

struct Args {
  is_docker: bool,
}

impl Parse for Args {
  fn parse(input: ParseStream) -> syn::Result<Self> {
    if input.is_empty() {
      return Ok(Self { is_docker: false });
    }

    let ident = input.parse::<syn::Ident>()?;
    if ident != "docker" {
      return Err(syn::Error::new(
        ident.span(),
        "expected `docker` or no arguments",
      ));
    }

    Ok(Self { is_docker: true })
  }
}

/// Test attribute used across the runway crates.
///
/// Installs `runway_logger` at trace level and wraps async functions in
/// `#[tokio::test(flavor = "multi_thread")]`. `#[runway_test::test(docker)]`
/// marks the test `#[ignore]` when no docker daemon answers at build time.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let item_fn = syn::parse_macro_input!(item as ItemFn);
  let args = syn::parse_macro_input!(attr as Args);

  let attrs = item_fn.attrs;
  let test_name = item_fn.sig.ident;
  let output = item_fn.sig.output;
  let content = item_fn.block;

  let is_async = item_fn.sig.asyncness.is_some();

  // Evaluated when this crate is compiled, not when the test runs
  let ignore = if args.is_docker && !is_support_docker() {
    quote! { #[ignore] }
  } else {
    quote! {}
  };

  let content = quote! {
    runway_logger::init_logger_with_level(log::Level::Trace);

    #content
  };

  if is_async {
    return quote! {
      #ignore
      #(#attrs)*
      #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
      async fn #test_name() #output {
        #content
      }
    }
    .into();
  }

  quote! {
    #ignore
    #(#attrs)*
    #[test]
    fn #test_name() #output {
      #content
    }
  }
  .into()
}
