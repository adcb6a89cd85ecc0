mod model;

use proc_macro::TokenStream;

/// Derive macro for the `Model` trait, plus its `MapEncodable` and
/// `MapDecodable` supertraits. `Lifecycle` is never derived; every model
/// writes its own hooks.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Debug, Model)]
/// #[model(collection = "users")]
/// struct User {
///     #[model(id)]
///     oid: Option<ObjectId>,
///     #[model(rename = "mail")]
///     email: String,
///     nickname: Option<String>,
///     #[model(skip)]
///     saved: bool,
/// }
/// ```
///
/// - `#[model(collection = "...")]` sets the collection name.
///   If omitted, defaults to snake_case struct name + "s".
/// - `#[model(id)]` marks the identifier field, typed `ObjectId` or
///   `Option<ObjectId>`. If omitted, a field named `oid` or else `id` is used.
///   It is stored under `_id`.
/// - `#[model(rename = "...")]` stores a field under another key.
/// - `#[model(skip)]` leaves a field out of the document; it decodes as
///   `Default::default()`.
/// - `Option<_>` fields decode as `None` when the key is absent; every other
///   field is required.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(input)
}
