use crate::driver::DriverError;

/// Error a `will_save` hook may return. Propagated unchanged inside
/// [`OrmError::Hook`].
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for mapping and repository operations.
pub type OrmResult<T> = Result<T, OrmError>;

/// Every failure the mapping layer can report.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// A value handed to a field map is not representable as a store primitive.
    #[error("failed to save document because the type for key `{key}` is unsupported")]
    UnsupportedFieldType { key: String },

    /// A string could not be parsed as an object id.
    #[error("invalid object id `{0}`")]
    InvalidIdentifier(String),

    /// The operation needs a persisted identity and the record has none.
    #[error("the document has no object id because it was never saved")]
    MissingIdentifier,

    /// A `required`, `update` or `destroy` matched zero documents.
    #[error("document not found in collection `{collection}`")]
    NotFound { collection: String },

    /// The store reported a write as unsuccessful.
    #[error("failed to save document: {}", .message.as_deref().unwrap_or("unknown reason"))]
    SaveFailed { message: Option<String> },

    /// A stored document could not be turned back into a record.
    #[error("failed to decode document: {0}")]
    DecodeFailed(#[from] DecodeError),

    /// A `will_save` hook refused the write.
    #[error("before-save hook failed: {0}")]
    Hook(#[source] HookError),

    /// The store driver failed (connection, timeout, cancellation, command).
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("invalid store address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl OrmError {
    pub(crate) fn not_found(collection: &str) -> Self {
        OrmError::NotFound {
            collection: collection.to_string(),
        }
    }

    /// True for [`OrmError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::NotFound { .. })
    }
}

/// Failure to build a record from a [`FieldMap`](crate::FieldMap).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing value for key `{key}`")]
    MissingField { key: String },

    #[error("missing object id")]
    MissingObjectId,

    #[error("unexpected type for key `{key}`: {message}")]
    UnexpectedType { key: String, message: String },

    /// Raised by hand-written decoders for domain-level validation.
    #[error("{0}")]
    Custom(String),
}

impl DecodeError {
    pub fn custom(message: impl Into<String>) -> Self {
        DecodeError::Custom(message.into())
    }
}
