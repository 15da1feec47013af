use proc_macro::TokenStream;
use quote::quote;
use syn::{Error, ItemStruct, LitStr, parse_macro_input};

/// Implements `autowire_base::ConfigSection` for a struct stored under the
/// given configuration key.
#[proc_macro_attribute]
pub fn config_section(args: TokenStream, input: TokenStream) -> TokenStream {
    let key_arg = parse_macro_input!(args as LitStr);
    let Ok(input_struct) = syn::parse::<ItemStruct>(input) else {
        return TokenStream::from(
            Error::new(
                proc_macro2::Span::call_site(),
                "#[config_section] can only be applied to structs",
            )
            .to_compile_error(),
        );
    };

    let struct_name = &input_struct.ident;
    let (impl_generics, ty_generics, where_clause) = input_struct.generics.split_for_impl();
    let key = key_arg.value();
    if key.is_empty() {
        return Error::new(key_arg.span(), "config section key must not be empty")
            .to_compile_error()
            .into();
    }

    let expanded = quote! {
        #input_struct

        impl #impl_generics autowire_base::ConfigSection for #struct_name #ty_generics #where_clause {
            fn key() -> &'static str {
                #key
            }
        }
    };

    TokenStream::from(expanded)
}
