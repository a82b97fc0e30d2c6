use itertools::Itertools;
use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseBuffer, ParseStream};
use syn::spanned::Spanned;
use syn::token::Paren;
use syn::{parenthesized, Attribute, DeriveInput, Error, Generics, Ident, LitStr, Variant};

pub struct WireImpl {
  type_id: Ident,
  generics: Generics,
  variants: Vec<WireVariant>,
}
impl WireImpl {
  pub fn derive(ast: DeriveInput) -> syn::Result<Self> {
    derive(ast)
  }
  pub fn expand(&self) -> TokenStream {
    expand(self)
  }
}

fn derive(ast: DeriveInput) -> syn::Result<WireImpl> {
  let aspan = ast.span();
  for param in ast.generics.params.iter() {
    match param {
      syn::GenericParam::Type(_) => {}
      syn::GenericParam::Lifetime(l) => {
        return Err(Error::new(
          l.lifetime.span(),
          "WireMessage does not allow lifetime parameters.",
        ))
      }
      syn::GenericParam::Const(c) => {
        return Err(Error::new(
          c.const_token.span,
          "WireMessage does not allow const parameters.",
        ))
      }
    }
  }

  let data_enum: syn::DataEnum = match ast.data {
    syn::Data::Enum(x) => x,
    _ => return Err(Error::new(aspan, "WireMessage only supports enums.")),
  };
  let mut variants = vec![];
  for v in data_enum.variants.into_iter().map(WireVariant::get) {
    variants.push(v?);
  }

  let dup = variants
    .iter()
    .sorted_by(|a, b| a.keyword.value().cmp(&b.keyword.value()))
    .tuple_windows()
    .find(|(a, b)| a.keyword.value() == b.keyword.value());
  if let Some((_, second)) = dup {
    return Err(Error::new(
      second.keyword.span(),
      format!("Duplicate wire keyword `{}`", second.keyword.value()),
    ));
  }

  Ok(WireImpl {
    type_id: ast.ident,
    generics: ast.generics,
    variants: variants,
  })
}

pub struct WireVariant {
  pub variant_name: Ident,
  pub keyword: LitStr,
  pub field_names: Option<Vec<Ident>>,
  pub arity: usize,
}
impl WireVariant {
  fn get(variant: Variant) -> Result<Self, Error> {
    let keyword = match WireProperties::get(variant.attrs)? {
      Some(props) => props.keyword,
      None => LitStr::new(
        variant.ident.to_string().to_lowercase().as_str(),
        variant.ident.span(),
      ),
    };
    if keyword.value().is_empty() || keyword.value().contains(char::is_whitespace) {
      return Err(Error::new(
        keyword.span(),
        "Wire keywords must be non-empty and contain no whitespace.",
      ));
    }
    let (arity, names) = match variant.fields {
      syn::Fields::Named(n) => {
        let names = n.named.into_iter().filter_map(|x| x.ident).collect_vec();
        (names.len(), Some(names))
      }
      syn::Fields::Unnamed(u) => (u.unnamed.len(), None),
      syn::Fields::Unit => (0, None),
    };
    Ok(WireVariant {
      variant_name: variant.ident,
      keyword: keyword,
      field_names: names,
      arity: arity,
    })
  }

  fn bindings(&self) -> Vec<Ident> {
    match &self.field_names {
      Some(names) => names.clone(),
      None => (0..self.arity).map(|i| format_ident!("__f{}", i)).collect(),
    }
  }
}

pub struct WireProperties {
  pub keyword: LitStr,
}
impl WireProperties {
  fn get(attrs: Vec<Attribute>) -> Result<Option<Self>, Error> {
    let mut i = attrs.into_iter().filter(|attr| attr.path.is_ident("wire"));
    match (i.next(), i.next()) {
      (None, None) => Ok(None),
      (Some(attr), None) => Ok(Some(syn::parse2(attr.tokens)?)),
      (Some(_), Some(attr)) => Err(Error::new(
        attr.path.span(),
        "WireMessage does not allow more than one 'wire' annotation on a variant.",
      )),
      _ => unreachable!(),
    }
  }
}

fn my_parenthesized<'a>(input: &'a ParseBuffer<'a>) -> syn::Result<(ParseBuffer<'a>, Paren)> {
  let inner;
  let paren = parenthesized!(inner in input);
  Ok((inner, paren))
}

impl Parse for WireProperties {
  fn parse(input: ParseStream) -> syn::Result<WireProperties> {
    let (inner, _) = my_parenthesized(&input).map_err(|_| {
      Error::new(input.span(), "'wire' takes the keyword in parentheses: #[wire(\"hello\")]")
    })?;
    let keyword = inner.parse::<LitStr>()?;
    if !inner.is_empty() {
      return Err(Error::new(inner.span(), "'wire' accepts exactly one string literal"));
    }
    Ok(WireProperties {
      keyword: keyword,
    })
  }
}

fn expand(root: &WireImpl) -> TokenStream {
  let type_id = &root.type_id;
  let (impl_generics, ty_generics, where_clause) = root.generics.split_for_impl();
  let krate = Ident::new("calc_cluster", Span::call_site());

  let encode_arms = root.variants.iter().map(|variant| {
    let variant_name = &variant.variant_name;
    let keyword = &variant.keyword;
    let bindings = variant.bindings();
    let pattern = match (&variant.field_names, variant.arity) {
      (Some(_), _) => quote!(#type_id::#variant_name { #(#bindings),* }),
      (None, 0) => quote!(#type_id::#variant_name),
      (None, _) => quote!(#type_id::#variant_name(#(#bindings),*)),
    };
    quote! {
      #pattern => {
        out.push_str(#keyword);
        #( #krate::core::WireField::put(#bindings, &mut out); )*
      }
    }
  });

  let decode_arms = root.variants.iter().map(|variant| {
    let variant_name = &variant.variant_name;
    let keyword = &variant.keyword;
    let take = quote!(#krate::core::WireField::take(&mut tokens)?);
    let construct = match (&variant.field_names, variant.arity) {
      (Some(names), _) => quote!(#type_id::#variant_name { #(#names: #take),* }),
      (None, 0) => quote!(#type_id::#variant_name),
      (None, n) => {
        let takes = (0..n).map(|_| take.clone());
        quote!(#type_id::#variant_name(#(#takes),*))
      }
    };
    quote! {
      #keyword => #construct,
    }
  });

  let keywords = root.variants.iter().map(|v| &v.keyword);

  let code = TokenStream::from(quote! {
    impl #impl_generics #krate::core::WireMessage for #type_id #ty_generics #where_clause {
      const KEYWORDS: &'static [&'static str] = &[#(#keywords),*];

      fn encode(&self) -> ::std::string::String {
        let mut out = ::std::string::String::new();
        match self {
          #(#encode_arms)*
        }
        out
      }

      fn decode(line: &str) -> ::std::option::Option<Self> {
        let mut tokens = #krate::core::Tokens::new(line);
        let msg = match tokens.keyword()? {
          #(#decode_arms)*
          _ => return ::std::option::Option::None,
        };
        if tokens.is_empty() {
          ::std::option::Option::Some(msg)
        } else {
          ::std::option::Option::None
        }
      }
    }
  });
  code
}
