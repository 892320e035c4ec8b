//! Classified errors shared by every storage backend and lock manager.

/// Errors returned by adapters, providers, and lock managers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("File {file_id} is locked by {owner} until {expires_at}")]
    LockConflict {
        file_id: String,
        owner: String,
        expires_at: i64,
    },

    #[error("Lock not held: {0}")]
    LockNotHeld(String),

    #[error("Name too long ({len} characters, max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Content too large ({size} bytes, max {max})")]
    ContentTooLarge { size: usize, max: usize },

    #[error("Item limit reached (max {max} items)")]
    ItemLimitReached { max: usize },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification used by the request layer to pick an outward signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Locked,
    Validation,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "PRECONDITION_FAILED",
            ErrorKind::Locked => "LOCKED",
            ErrorKind::Validation => "VALIDATION_FAILED",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::PreconditionFailed(_) => ErrorKind::Conflict,
            StorageError::LockConflict { .. } | StorageError::LockNotHeld(_) => ErrorKind::Locked,
            StorageError::NameTooLong { .. }
            | StorageError::ContentTooLarge { .. }
            | StorageError::ItemLimitReached { .. }
            | StorageError::InvalidArgument(_) => ErrorKind::Validation,
            StorageError::Unavailable(_) => ErrorKind::Unavailable,
            StorageError::Forbidden(_) | StorageError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure came from the backing store rather than the request.
    /// Callers own retry policy; nothing in this workspace retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
