//! Store configuration, from TOML or the environment.

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};
use crate::pool::Address;

pub const ADDRESS_VAR: &str = "ODM_STORE_ADDRESS";
pub const PREFIX_VAR: &str = "ODM_COLLECTION_PREFIX";

/// Where records are stored.
///
/// ```toml
/// address = "mongodb://localhost:27017/app"
/// collection_prefix = "test_"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub address: Address,
    #[serde(default)]
    pub collection_prefix: Option<String>,
}

impl StoreConfig {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            collection_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.collection_prefix = Some(prefix.into());
        self
    }

    pub fn from_toml_str(text: &str) -> OrmResult<Self> {
        toml::from_str(text).map_err(|e| OrmError::Config(e.to_string()))
    }

    /// Read `ODM_STORE_ADDRESS` (required) and `ODM_COLLECTION_PREFIX`.
    pub fn from_env() -> OrmResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let address = lookup(ADDRESS_VAR)
            .ok_or_else(|| OrmError::Config(format!("{ADDRESS_VAR} is not set")))?;
        let prefix = lookup(PREFIX_VAR).filter(|p| !p.is_empty());

        Ok(Self {
            address: Address::parse(&address)?,
            collection_prefix: prefix,
        })
    }

    /// `base` with the configured prefix in front.
    pub fn collection_name(&self, base: &str) -> String {
        match &self.collection_prefix {
            Some(prefix) => format!("{prefix}{base}"),
            None => base.to_string(),
        }
    }
}
