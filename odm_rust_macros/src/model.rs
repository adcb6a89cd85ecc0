use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Field, Fields, GenericArgument, Ident, LitStr, PathArguments,
    Type,
};

pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// How one struct field takes part in encoding and decoding.
enum Role {
    Id { optional: bool },
    Stored {
        key: String,
        optional: bool,
        timestamp: bool,
    },
    Skipped,
}

struct FieldSpec<'a> {
    ident: &'a Ident,
    role: Role,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Model derive needs a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Model derive only supports structs",
            ))
        }
    };

    let collection = extract_collection(&input.attrs)?.unwrap_or_else(|| default_collection(name));
    let specs = field_specs(name, fields.iter())?;

    let mut fill = Vec::new();
    let mut init = Vec::new();
    let mut oid_body = None;
    let mut set_oid_body = None;

    for spec in &specs {
        let ident = spec.ident;
        match &spec.role {
            Role::Id { optional: true } => {
                init.push(quote! { #ident: map.optional("_id")? });
                oid_body = Some(quote! { self.#ident });
                set_oid_body = Some(quote! { self.#ident = Some(oid); });
            }
            Role::Id { optional: false } => {
                init.push(quote! { #ident: map.oid()? });
                oid_body = Some(quote! { Some(self.#ident) });
                set_oid_body = Some(quote! { self.#ident = oid; });
            }
            Role::Stored {
                key,
                optional,
                timestamp,
            } => {
                if *timestamp {
                    fill.push(quote! { map.insert_datetime(#key, self.#ident); });
                } else {
                    fill.push(quote! { map.insert(#key, &self.#ident)?; });
                }
                if *optional {
                    init.push(quote! { #ident: map.optional(#key)? });
                } else {
                    init.push(quote! { #ident: map.value(#key)? });
                }
            }
            Role::Skipped => {
                init.push(quote! { #ident: ::core::default::Default::default() });
            }
        }
    }

    let (Some(oid_body), Some(set_oid_body)) = (oid_body, set_oid_body) else {
        return Err(syn::Error::new_spanned(
            name,
            "Model derive: mark the identifier with #[model(id)] or name it `oid` or `id`",
        ));
    };

    Ok(quote! {
        impl #impl_generics odm_rust::MapEncodable for #name #ty_generics #where_clause {
            fn fill(&self, map: &mut odm_rust::FieldMap) -> odm_rust::OrmResult<()> {
                #(#fill)*
                Ok(())
            }
        }

        impl #impl_generics odm_rust::MapDecodable for #name #ty_generics #where_clause {
            fn from_map(map: &odm_rust::FieldMap) -> ::core::result::Result<Self, odm_rust::DecodeError> {
                Ok(Self {
                    #(#init),*
                })
            }
        }

        impl #impl_generics odm_rust::Model for #name #ty_generics #where_clause {
            const COLLECTION: &'static str = #collection;

            fn oid(&self) -> Option<odm_rust::ObjectId> {
                #oid_body
            }

            fn set_oid(&mut self, oid: odm_rust::ObjectId) {
                #set_oid_body
            }
        }
    })
}

#[derive(Default)]
struct FieldAttrs {
    id: bool,
    skip: bool,
    rename: Option<String>,
}

fn field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                attrs.id = true;
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(value.value());
            } else {
                return Err(meta.error("expected `id`, `skip` or `rename = \"...\"`"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn field_specs<'a>(
    name: &Ident,
    fields: impl Iterator<Item = &'a Field>,
) -> syn::Result<Vec<FieldSpec<'a>>> {
    let fields: Vec<(&Field, FieldAttrs)> = fields
        .map(|f| field_attrs(f).map(|a| (f, a)))
        .collect::<syn::Result<_>>()?;

    let marked: Vec<&Field> = fields.iter().filter(|(_, a)| a.id).map(|(f, _)| *f).collect();
    if marked.len() > 1 {
        return Err(syn::Error::new_spanned(
            marked[1],
            "Model derive: only one field may be #[model(id)]",
        ));
    }
    let id_ident = match marked.first() {
        Some(field) => field.ident.as_ref(),
        None => ["oid", "id"].iter().find_map(|candidate| {
            fields
                .iter()
                .filter_map(|(f, _)| f.ident.as_ref())
                .find(|ident| ident.to_string() == *candidate)
        }),
    };

    let mut specs = Vec::with_capacity(fields.len());
    for (field, attrs) in &fields {
        let field: &'a Field = field;
        let Some(ident) = field.ident.as_ref() else {
            return Err(syn::Error::new_spanned(name, "Model derive needs named fields"));
        };

        let role = if Some(ident) == id_ident {
            Role::Id {
                optional: option_inner(&field.ty).is_some(),
            }
        } else if attrs.skip {
            Role::Skipped
        } else {
            let key = attrs.rename.clone().unwrap_or_else(|| ident.to_string());
            if key == "_id" {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Model derive: `_id` is reserved for the identifier",
                ));
            }
            let inner = option_inner(&field.ty);
            Role::Stored {
                key,
                optional: inner.is_some(),
                timestamp: is_utc_datetime(inner.unwrap_or(&field.ty)),
            }
        };
        specs.push(FieldSpec { ident, role });
    }
    Ok(specs)
}

fn extract_collection(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut collection = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`"))
            }
        })?;
    }
    Ok(collection)
}

/// Snake-case struct name plus "s".
fn default_collection(name: &Ident) -> String {
    format!("{}s", to_snake_case(&name.to_string()))
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// `T` for a field typed `Option<T>`.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// `DateTime<Utc>` under any path prefix. These are stored as native
/// datetimes so range filters compare them chronologically.
fn is_utc_datetime(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(segment) = path.path.segments.last() else {
        return false;
    };
    if segment.ident != "DateTime" {
        return false;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return false;
    };
    matches!(
        args.args.first(),
        Some(GenericArgument::Type(Type::Path(tz)))
            if tz.path.segments.last().is_some_and(|s| s.ident == "Utc")
    )
}
