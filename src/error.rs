//! Error types for tree construction, querying and mutation.

use thiserror::Error;

/// Everything that can go wrong while building, querying or mutating a tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A record's dtype conflicts with the inferred/declared model, or a
    /// required key (`id`, `parent`) is missing.
    #[error("data model error: {0}")]
    DataModel(String),

    /// An operation would break one of the tree invariants (second root,
    /// delete of root, duplicate id on add).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A node id referenced by a read or update was not found.
    #[error("node not found: {id}")]
    NotFound { id: String },

    /// The query description is malformed: unknown field, bad condition
    /// shape, invalid axis, unsupported operator.
    #[error("query error: {0}")]
    Query(String),

    /// The underlying SQLite engine failed (integrity, I/O, busy/locked
    /// past the retry budget).
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A loader failed to read its source file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    pub fn data_model(msg: impl Into<String>) -> Self {
        Self::DataModel(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// True for SQLite BUSY/LOCKED, the only storage errors the engine
    /// adapter retries.
    pub(crate) fn is_retryable_busy(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => {
                    // SQLite primary result codes: 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED.
                    // sqlx surfaces the extended code as a string; compare the
                    // low byte by stripping any extended-code suffix.
                    let primary = code.split('.').next().unwrap_or("");
                    primary == "5" || primary == "6"
                }
                None => false,
            },
            _ => false,
        }
    }

    /// True for any SQLITE_CONSTRAINT family result code (19, and its
    /// extended forms such as 1555 for a primary-key conflict): the signal
    /// `Tree::add` uses to turn a duplicate id into `InvariantViolation`
    /// rather than a raw `StorageError`.
    pub(crate) fn is_constraint_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff == 19)
                .unwrap_or(false),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
