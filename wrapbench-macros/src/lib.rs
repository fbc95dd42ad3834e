//! wrapbench Macros
//!
//! `#[wrapbench::suite]` turns an inherent `impl` block into a
//! `BenchmarkSuite` implementation.
//!
//! ## Attributes
//!
//! - `#[suite(name = "..", params(n = [..], ..))]` - on the `impl` block
//! - `#[bench(..)]` - marks a benchmark method `fn(&mut self, &mut Bencher)`
//! - `#[setup]` - constructor, `fn(&ParamSet) -> Self` or `fn() -> Self`;
//!   without one the suite uses `Default`
//! - `#[teardown]` - `fn(&mut self)`, run after each job

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, parse_macro_input};

// ============================================================================
// Attribute Parsing Helpers
// ============================================================================

mod attr {
    use syn::meta::ParseNestedMeta;

    /// Get the attribute name as a string
    pub fn name(meta: &ParseNestedMeta) -> String {
        meta.path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    /// Parse a string literal attribute: `attr = "value"`
    pub fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Parse an integer literal attribute: `attr = 42`
    pub fn int(meta: &ParseNestedMeta) -> syn::Result<u64> {
        let value: syn::LitInt = meta.value()?.parse()?;
        value.base10_parse()
    }

    /// Parse tags as `tags = ["a", "b"]` or `tags = "a, b"`
    pub fn tags(meta: &ParseNestedMeta) -> syn::Result<Vec<String>> {
        let input = meta.value()?;
        if input.peek(syn::token::Bracket) {
            let content;
            syn::bracketed!(content in input);
            let items: syn::punctuated::Punctuated<syn::LitStr, syn::Token![,]> =
                syn::punctuated::Punctuated::parse_terminated(&content)?;
            return Ok(items.iter().map(|s| s.value()).collect());
        }
        let value: syn::LitStr = input.parse()?;
        Ok(value
            .value()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Parse a bracketed list of expressions: `name = [1, 2, 3]`
    pub fn expr_array(meta: &ParseNestedMeta) -> syn::Result<Vec<syn::Expr>> {
        let input = meta.value()?;
        let content;
        syn::bracketed!(content in input);
        let items: syn::punctuated::Punctuated<syn::Expr, syn::Token![,]> =
            syn::punctuated::Punctuated::parse_terminated(&content)?;
        Ok(items.into_iter().collect())
    }

    /// Create an unknown attribute error
    pub fn unknown(meta: &ParseNestedMeta, name: &str) -> syn::Error {
        meta.error(format!("unknown attribute: {}", name))
    }
}

/// Declare a benchmark suite
///
/// # Example
///
/// ```ignore
/// use wrapbench::prelude::*;
///
/// struct Sorting {
///     data: Vec<u64>,
/// }
///
/// #[wrapbench::suite(params(n = [100, 10_000]))]
/// impl Sorting {
///     #[setup]
///     fn new(params: &ParamSet) -> Self {
///         let n = params.int("n").unwrap_or(100) as u64;
///         Sorting { data: (0..n).rev().collect() }
///     }
///
///     #[bench(baseline, group = "sort")]
///     fn stable(&mut self, b: &mut Bencher) {
///         b.iter(|| {
///             let mut v = self.data.clone();
///             v.sort();
///             v
///         });
///     }
///
///     #[bench(group = "sort", tags = ["unstable"], warmup = "200ms")]
///     fn unstable(&mut self, b: &mut Bencher) {
///         b.iter(|| {
///             let mut v = self.data.clone();
///             v.sort_unstable();
///             v
///         });
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn suite(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let input = parse_macro_input!(item as ItemImpl);

    suite_impl(args, input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

#[derive(Default)]
struct SuiteConfig {
    name: Option<String>,
    params: Vec<(String, Vec<syn::Expr>)>,
}

fn parse_suite_config(args: TokenStream2) -> syn::Result<SuiteConfig> {
    let mut config = SuiteConfig::default();
    if args.is_empty() {
        return Ok(config);
    }

    let parser = syn::meta::parser(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "name" => config.name = Some(attr::string(&meta)?),
            "params" => meta.parse_nested_meta(|param| {
                let param_name = attr::name(&param);
                if param_name.is_empty() {
                    return Err(param.error("parameter name must be an identifier"));
                }
                if config.params.iter().any(|(n, _)| *n == param_name) {
                    return Err(param.error(format!("duplicate parameter: {param_name}")));
                }
                let values = attr::expr_array(&param)?;
                if values.is_empty() {
                    return Err(param.error(format!("parameter `{param_name}` has no values")));
                }
                config.params.push((param_name, values));
                Ok(())
            })?,
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    });

    syn::parse::Parser::parse2(parser, args)?;
    Ok(config)
}

#[derive(Default)]
struct BenchConfig {
    group: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    baseline: bool,
    warmup_ns: Option<u64>,
    measurement_ns: Option<u64>,
    samples: Option<u64>,
    min_iterations: Option<u64>,
    max_iterations: Option<u64>,
}

fn parse_bench_config(attribute: &Attribute) -> syn::Result<BenchConfig> {
    let mut config = BenchConfig::default();
    // Bare `#[bench]`
    if matches!(attribute.meta, syn::Meta::Path(_)) {
        return Ok(config);
    }

    attribute.parse_nested_meta(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "baseline" => config.baseline = true,
            "group" => config.group = Some(attr::string(&meta)?),
            "description" => config.description = Some(attr::string(&meta)?),
            "tags" => config.tags = attr::tags(&meta)?,
            "warmup" => config.warmup_ns = Some(duration(&meta)?),
            "measurement" => config.measurement_ns = Some(duration(&meta)?),
            "samples" => config.samples = Some(attr::int(&meta)?),
            "min_iterations" => config.min_iterations = Some(attr::int(&meta)?),
            "max_iterations" => config.max_iterations = Some(attr::int(&meta)?),
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    })?;

    Ok(config)
}

fn duration(meta: &syn::meta::ParseNestedMeta) -> syn::Result<u64> {
    let value: syn::LitStr = meta.value()?.parse()?;
    parse_duration(&value.value()).ok_or_else(|| {
        syn::Error::new_spanned(&value, "invalid duration, expected e.g. \"500ms\" or \"2s\"")
    })
}

/// Remove the first attribute named `name`, returning it
fn take_attr(attrs: &mut Vec<Attribute>, name: &str) -> Option<Attribute> {
    let pos = attrs.iter().position(|a| a.path().is_ident(name))?;
    Some(attrs.remove(pos))
}

fn receiver_is_mut_ref(method: &ImplItemFn) -> bool {
    matches!(
        method.sig.inputs.first(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_some()
    )
}

fn validate_bench(method: &ImplItemFn) -> syn::Result<()> {
    if method.sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            &method.sig,
            "wrapbench: benchmark methods cannot be async; use `Bencher::iter_async`",
        ));
    }
    if !receiver_is_mut_ref(method) || method.sig.inputs.len() != 2 {
        return Err(syn::Error::new_spanned(
            &method.sig,
            "wrapbench: benchmark methods must take `&mut self, &mut Bencher`",
        ));
    }
    Ok(())
}

fn suite_impl(args: TokenStream2, mut input: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "wrapbench: #[suite] goes on an inherent impl block",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "wrapbench: generic suites are not supported",
        ));
    }

    let config = parse_suite_config(args)?;
    let self_ty = input.self_ty.clone();

    let mut benches = Vec::new();
    let mut setup: Option<(syn::Ident, bool)> = None;
    let mut teardown: Option<syn::Ident> = None;

    for item in &mut input.items {
        let ImplItem::Fn(method) = item else { continue };

        if let Some(attribute) = take_attr(&mut method.attrs, "bench") {
            validate_bench(method)?;
            benches.push((method.sig.ident.clone(), parse_bench_config(&attribute)?));
        }

        if let Some(attribute) = take_attr(&mut method.attrs, "setup") {
            if setup.is_some() {
                return Err(syn::Error::new_spanned(attribute, "wrapbench: more than one #[setup]"));
            }
            if method.sig.receiver().is_some() || method.sig.inputs.len() > 1 {
                return Err(syn::Error::new_spanned(
                    &method.sig,
                    "wrapbench: #[setup] must be `fn(&ParamSet) -> Self` or `fn() -> Self`",
                ));
            }
            setup = Some((method.sig.ident.clone(), method.sig.inputs.len() == 1));
        }

        if let Some(attribute) = take_attr(&mut method.attrs, "teardown") {
            if teardown.is_some() {
                return Err(syn::Error::new_spanned(attribute, "wrapbench: more than one #[teardown]"));
            }
            if !receiver_is_mut_ref(method) || method.sig.inputs.len() != 1 {
                return Err(syn::Error::new_spanned(
                    &method.sig,
                    "wrapbench: #[teardown] must be `fn(&mut self)`",
                ));
            }
            teardown = Some(method.sig.ident.clone());
        }
    }

    if benches.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.self_ty,
            "wrapbench: suite has no #[bench] methods",
        ));
    }

    let name_fn = config.name.map(|name| {
        quote! {
            fn name() -> &'static str {
                #name
            }
        }
    });

    let params_fn = (!config.params.is_empty()).then(|| {
        let defs = config.params.iter().map(|(name, values)| {
            quote! {
                ::wrapbench::ParamDef::new(
                    #name,
                    ::std::vec![#(::wrapbench::ParamValue::from(#values)),*],
                )
            }
        });
        quote! {
            fn params() -> ::std::vec::Vec<::wrapbench::ParamDef> {
                ::std::vec![#(#defs),*]
            }
        }
    });

    let create_body = match &setup {
        Some((ident, true)) => quote! { Self::#ident(params) },
        Some((ident, false)) => quote! { Self::#ident() },
        None => quote! { <Self as ::std::default::Default>::default() },
    };
    let params_arg = match &setup {
        Some((_, true)) => quote! { params },
        _ => quote! { _params },
    };

    let teardown_fn = teardown.map(|ident| {
        quote! {
            fn teardown(&mut self) {
                Self::#ident(self)
            }
        }
    });

    let defs = benches.iter().map(|(ident, bench)| bench_def(ident, bench));

    Ok(quote! {
        #input

        impl ::wrapbench::BenchmarkSuite for #self_ty {
            #name_fn

            #params_fn

            fn create(#params_arg: &::wrapbench::ParamSet) -> Self {
                #create_body
            }

            #teardown_fn

            fn benchmarks() -> ::std::vec::Vec<::wrapbench::BenchmarkDef<Self>> {
                ::std::vec![#(#defs),*]
            }
        }
    })
}

fn bench_def(ident: &syn::Ident, bench: &BenchConfig) -> TokenStream2 {
    let name = ident.to_string();
    let mut chain = Vec::new();

    if let Some(group) = &bench.group {
        chain.push(quote! { .group(#group) });
    }
    if let Some(description) = &bench.description {
        chain.push(quote! { .description(#description) });
    }
    if !bench.tags.is_empty() {
        let tags = &bench.tags;
        chain.push(quote! { .tags(&[#(#tags),*]) });
    }
    if bench.baseline {
        chain.push(quote! { .baseline() });
    }
    if let Some(ns) = bench.warmup_ns {
        chain.push(quote! { .warmup(::std::time::Duration::from_nanos(#ns)) });
    }
    if let Some(ns) = bench.measurement_ns {
        chain.push(quote! { .measurement(::std::time::Duration::from_nanos(#ns)) });
    }
    if let Some(n) = bench.samples {
        chain.push(quote! { .samples(#n) });
    }
    if let Some(n) = bench.min_iterations {
        chain.push(quote! { .min_iterations(#n) });
    }
    if let Some(n) = bench.max_iterations {
        chain.push(quote! { .max_iterations(#n) });
    }

    quote! {
        ::wrapbench::BenchmarkDef::new(
            #name,
            |suite: &mut Self, bencher: &mut ::wrapbench::Bencher| {
                Self::#ident(suite, bencher);
            },
        )
        #(#chain)*
    }
}

fn parse_duration(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.starts_with('-') {
        return None;
    }
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim()
            .parse::<f64>()
            .ok()
            .map(|v| (v * 1_000_000.0) as u64)
    } else if let Some(us) = s.strip_suffix("us").or_else(|| s.strip_suffix("µs")) {
        us.trim().parse::<f64>().ok().map(|v| (v * 1_000.0) as u64)
    } else if let Some(ns) = s.strip_suffix("ns") {
        ns.trim().parse::<f64>().ok().map(|v| v as u64)
    } else if let Some(s_val) = s.strip_suffix('s') {
        s_val
            .trim()
            .parse::<f64>()
            .ok()
            .map(|v| (v * 1_000_000_000.0) as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(500_000_000));
        assert_eq!(parse_duration("2s"), Some(2_000_000_000));
        assert_eq!(parse_duration("1.5 s"), Some(1_500_000_000));
        assert_eq!(parse_duration("10us"), Some(10_000));
        assert_eq!(parse_duration("10µs"), Some(10_000));
        assert_eq!(parse_duration("42ns"), Some(42));
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("3"), None);
    }

    #[test]
    fn test_suite_expansion() {
        let input: ItemImpl = syn::parse_quote! {
            impl Codec {
                #[setup]
                fn new(params: &ParamSet) -> Self { Codec }

                #[bench(baseline, group = "encode", tags = ["fast", "simd"], samples = 10)]
                fn encode(&mut self, b: &mut Bencher) {}

                #[bench]
                fn decode(&mut self, b: &mut Bencher) {}

                #[teardown]
                fn close(&mut self) {}

                fn helper(&self) {}
            }
        };
        let args = quote! { name = "codec", params(size = [16, 4096]) };
        let output = suite_impl(args, input).unwrap().to_string();

        assert!(output.contains("impl :: wrapbench :: BenchmarkSuite for Codec"));
        assert!(output.contains("\"codec\""));
        assert!(output.contains("\"size\""));
        assert!(output.contains("Self :: new (params)"));
        assert!(output.contains("Self :: close (self)"));
        assert!(output.contains(". baseline ()"));
        assert!(output.contains(". samples (10u64)"));
        assert!(output.contains("\"simd\""));
        // Marker attributes are consumed
        assert!(!output.contains("# [bench"));
        assert!(!output.contains("# [setup]"));
    }

    #[test]
    fn test_default_create_without_setup() {
        let input: ItemImpl = syn::parse_quote! {
            impl Plain {
                #[bench]
                fn run(&mut self, b: &mut Bencher) {}
            }
        };
        let output = suite_impl(TokenStream2::new(), input).unwrap().to_string();
        assert!(output.contains("Default > :: default ()"));
        assert!(!output.contains("fn params"));
    }

    #[test]
    fn test_rejects_bad_signatures() {
        let input: ItemImpl = syn::parse_quote! {
            impl Bad {
                #[bench]
                fn run(&self, b: &mut Bencher) {}
            }
        };
        assert!(suite_impl(TokenStream2::new(), input).is_err());

        let input: ItemImpl = syn::parse_quote! {
            impl Empty {
                fn helper(&self) {}
            }
        };
        assert!(suite_impl(TokenStream2::new(), input).is_err());

        let input: ItemImpl = syn::parse_quote! {
            impl Unknown {
                #[bench(speed = "fast")]
                fn run(&mut self, b: &mut Bencher) {}
            }
        };
        assert!(suite_impl(TokenStream2::new(), input).is_err());
    }
}
