//! Error types for the mill engine
//!
//! Provides custom error types for database queries, sector file access and
//! game state validation, plus a thread-local record of the most recent
//! failure for diagnostics.

use std::cell::RefCell;

use thiserror::Error;

/// Errors that can occur in the mill engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid input passed to a query
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Parameter outside its permitted range
    #[error("{param} must be between {min} and {max}, got {value}")]
    OutOfRange {
        param: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    /// No usable database found at the configured path
    #[error("no sector database found in {path}")]
    DatabaseNotFound { path: String },

    /// A specific sector file is missing
    #[error("sector file {name} not present in the database")]
    SectorMissing { name: String },

    /// Sector file header does not match the expected format
    #[error("corrupt header in {name}: {field} is {actual}, expected {expected}")]
    CorruptHeader {
        name: String,
        field: &'static str,
        actual: i64,
        expected: i64,
    },

    /// I/O failure while reading a database file
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed text in the sector value file
    #[error("malformed sector value file {name}: {message}")]
    MalformedSecVal { name: String, message: String },

    /// Position index outside the sector's hash range
    #[error("index {index} out of range for sector {name} ({count} entries)")]
    IndexOutOfRange {
        name: String,
        index: usize,
        count: usize,
    },

    /// A packed record pointed into the exception map, but no entry exists
    #[error("sector {name} has no exception entry for index {index}")]
    MissingException { name: String, index: usize },

    /// A symmetry redirect did not resolve in one step
    #[error("sector {name}: unresolved symmetry redirect at index {index}")]
    SymmetryRedirectLoop { name: String, index: usize },

    /// Game state violates the rules
    #[error("invalid game state: {message}")]
    InvalidGameState { message: String },

    /// No legal move exists in a position where one was requested
    #[error("no legal moves available")]
    NoLegalMoves,
}

/// Result type alias for mill engine operations
pub type EngineResult<T> = Result<T, EngineError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Clear the thread-local error record. Called at the start of every public
/// query.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Record an error for the current thread. The first error of an operation
/// wins; later ones are ignored until the record is cleared.
pub fn record_error(err: &EngineError) {
    LAST_ERROR.with(|e| {
        let mut slot = e.borrow_mut();
        if slot.is_none() {
            *slot = Some(err.to_string());
        }
    });
}

/// The most recent failure recorded on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow().clone())
}
