extern crate proc_macro;
use proc_macro::TokenStream;

mod wire_message;

use wire_message::WireImpl;

#[proc_macro_derive(WireMessage, attributes(wire))]
pub fn wire_message(item: TokenStream) -> TokenStream {
  WireImpl::derive(syn::parse(item).unwrap())
    .map(|x| x.expand())
    .unwrap_or_else(|x| x.to_compile_error().into())
}
