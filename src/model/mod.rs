//! Models - domain records that can be mapped to and from stored documents.
//!
//! A type becomes storable by describing itself to a [`FieldMap`]
//! ([`MapEncodable`]), rebuilding itself from one ([`MapDecodable`]), exposing
//! its [`ObjectId`] and collection ([`Model`]), and declaring what happens
//! around a save ([`Lifecycle`]).
//!
//! ## Example
//!
//! ```ignore
//! use odm_rust::{HookError, Lifecycle, Model, ObjectId};
//!
//! #[derive(Clone, Debug, Model)]
//! #[model(collection = "users")]
//! struct User {
//!     #[model(id)]
//!     oid: Option<ObjectId>,
//!     email: String,
//!     password: String,
//!     #[model(skip)]
//!     saved: bool,
//! }
//!
//! impl Lifecycle for User {
//!     fn will_save(&mut self) -> Result<(), HookError> {
//!         if self.email.is_empty() {
//!             return Err("email is required".into());
//!         }
//!         Ok(())
//!     }
//!
//!     fn did_save(&mut self) {
//!         self.saved = true;
//!     }
//! }
//! ```

mod vec_ext;

use crate::error::{DecodeError, HookError, OrmResult};
use crate::map::FieldMap;
use crate::oid::ObjectId;

pub use vec_ext::ModelVecExt;

/// Writes a record's persisted fields into a map.
pub trait MapEncodable {
    /// Add every persisted field except the identifier, which the codec adds
    /// under `_id`.
    fn fill(&self, map: &mut FieldMap) -> OrmResult<()>;
}

/// Builds a record from a map.
pub trait MapDecodable: Sized {
    /// Must fail on missing required fields rather than inventing defaults.
    fn from_map(map: &FieldMap) -> Result<Self, DecodeError>;
}

/// Hooks the repository runs around every write.
///
/// Both are required so that every model states its save behaviour.
pub trait Lifecycle {
    /// Runs before encoding. May mutate the record; an error aborts the write
    /// before any store I/O.
    fn will_save(&mut self) -> Result<(), HookError>;

    /// Runs after the store confirmed the write. Must not do I/O.
    fn did_save(&mut self);
}

/// A domain record bound to a collection and addressed by an [`ObjectId`].
pub trait Model: MapEncodable + MapDecodable + Lifecycle + Send + Sync + 'static {
    /// Default collection name (e.g., "users", "orders").
    const COLLECTION: &'static str;

    /// The record's identifier, `None` while it has never been saved.
    fn oid(&self) -> Option<ObjectId>;

    fn set_oid(&mut self, oid: ObjectId);
}
