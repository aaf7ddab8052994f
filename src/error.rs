use std::{error::Error, fmt, io};

/// The error taxonomy for the whole engine. Every fallible operation in
/// this crate returns one of these variants (or `Ok`) — never a bare
/// string, so callers can match on e.g. `SmallError::TransactionAborted`
/// to decide whether a retry makes sense.
#[derive(Debug)]
pub enum SmallError {
    /// Tuple descriptor disagreement on insert/merge.
    SchemaMismatch(String),

    /// Page full. Callers at the buffer-pool/tree-file layer catch this
    /// internally and turn it into a split or page append; it should
    /// never reach an operator.
    NoSpace(String),

    /// Missing slot, tuple, or field-name lookup.
    NotFound(String),

    /// Attempt to read beyond file length.
    IllegalPage(String),

    /// Deadlock-timeout during lock wait. The only recoverable runtime
    /// failure: the caller must invoke `transaction_complete(tid, false)`
    /// and may retry with a fresh transaction id.
    TransactionAborted(String),

    /// Buffer pool full of dirty pages; no clean victim to evict.
    NoEvictablePage(String),

    /// Underlying disk error.
    IO(io::Error),
}

impl SmallError {
    pub fn schema_mismatch(msg: &str) -> Self {
        SmallError::SchemaMismatch(msg.to_string())
    }

    pub fn no_space(msg: &str) -> Self {
        SmallError::NoSpace(msg.to_string())
    }

    pub fn not_found(msg: &str) -> Self {
        SmallError::NotFound(msg.to_string())
    }

    pub fn illegal_page(msg: &str) -> Self {
        SmallError::IllegalPage(msg.to_string())
    }

    pub fn transaction_aborted(msg: &str) -> Self {
        SmallError::TransactionAborted(msg.to_string())
    }

    pub fn no_evictable_page(msg: &str) -> Self {
        SmallError::NoEvictablePage(msg.to_string())
    }

    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, SmallError::TransactionAborted(_))
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SmallError::SchemaMismatch(m) => write!(f, "schema mismatch: {}", m),
            SmallError::NoSpace(m) => write!(f, "no space: {}", m),
            SmallError::NotFound(m) => write!(f, "not found: {}", m),
            SmallError::IllegalPage(m) => write!(f, "illegal page: {}", m),
            SmallError::TransactionAborted(m) => write!(f, "transaction aborted: {}", m),
            SmallError::NoEvictablePage(m) => write!(f, "no evictable page: {}", m),
            SmallError::IO(e) => write!(f, "io error: {}", e),
        }
    }
}

impl Error for SmallError {}

impl From<io::Error> for SmallError {
    fn from(e: io::Error) -> Self {
        SmallError::IO(e)
    }
}
