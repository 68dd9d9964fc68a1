use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input,
    DeriveInput,
    Expr,
};

#[proc_macro_derive(RegisterSerde)]
/// Derived on a packed_struct to shim in our serde methods.
///
/// Packed structs are declared with `lsb0` bit numbering and `msb` multibyte fields, which packs
/// to a big endian word. The shield's register space is little endian, so the chunk is reversed
/// on the way in and out.
pub fn derive_register_serde(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as DeriveInput);
    let block_name = input.ident;
    let generated = quote! {
        impl Serialize for #block_name {
            type Chunk = <Self as PackedStruct>::ByteArray;

            fn serialize(&self) -> Result<Self::Chunk, ::packed_struct::PackingError> {
                let mut chunk = self.pack()?;
                chunk.reverse();
                Ok(chunk)
            }
        }

        impl Deserialize for #block_name {
            type Chunk = <Self as PackedStruct>::ByteArray;

            fn deserialize(mut chunk: Self::Chunk) -> Result<Self, ::packed_struct::PackingError> {
                chunk.reverse();
                Self::unpack(&chunk)
            }
        }
    };
    TokenStream::from(generated)
}

fn address_impl(attr: TokenStream2, item: &DeriveInput) -> syn::Result<TokenStream2> {
    let addr: Expr = syn::parse2(attr)?;
    let ident = &item.ident;
    Ok(quote! {
        impl Address for #ident {
            fn addr() -> u32 {
                #addr
            }
        }
        #item
    })
}

#[proc_macro_attribute]
/// Attaches a fixed register address to a type. The argument is any `u32` expression, so bank
/// offsets like `#[address(GPIO_BASE + 0x10)]` work.
pub fn address(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as DeriveInput);
    match address_impl(attr.into(), &item) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}
