//! Object-document mapping for Rust structs.
//!
//! Records describe themselves to a [`FieldMap`], a [`Repository`] turns that
//! into store documents and runs identity-based CRUD against a [`Collection`],
//! and a [`ConnectionPool`] hands out one database handle per [`Address`].
//! The store itself sits behind the [`driver`] traits; [`memory`] provides an
//! in-process implementation.

extern crate self as odm_rust;

mod codec;
mod config;
pub mod driver;
mod error;
mod map;
#[cfg(feature = "memory")]
pub mod memory;
mod model;
mod oid;
mod pool;
mod repository;

pub use bson::{doc, Document};
pub use codec::{decode, encode, encode_document, from_store_document, to_store_document};
pub use config::{StoreConfig, ADDRESS_VAR, PREFIX_VAR};
pub use driver::{Collection, Connector, Database, DriverError, InsertReply, Update, UpdateReply};
pub use error::{DecodeError, HookError, OrmError, OrmResult};
pub use map::{FieldMap, Value, ID_KEY};
pub use model::{Lifecycle, MapDecodable, MapEncodable, Model, ModelVecExt};
pub use oid::ObjectId;
pub use pool::{get_collection, Address, ConnectionPool};
pub use repository::{FindResult, Repository};

#[cfg(feature = "memory")]
pub use memory::{MemoryCollection, MemoryConnector, MemoryDatabase};

pub use odm_rust_macros::Model;

/// Filters are plain store documents.
pub type Query = Document;
