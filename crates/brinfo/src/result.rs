//! Result and error types for brinfo.

use thiserror::Error;

/// Result type for brinfo operations
pub type BrinfoResult<T> = Result<T, BrinfoError>;

/// Errors that can occur in brinfo
///
/// Only the operations with real failure modes surface errors: writing the
/// meta documents and misusing the rewrite buffer. Instrumentation skips and
/// runtime mis-nesting are silent no-ops by contract.
#[derive(Debug, Error)]
pub enum BrinfoError {
    /// A replacement partially overlaps an earlier replacement
    #[error("edit at bytes {start}..{end} overlaps an existing replacement")]
    EditConflict {
        /// Start byte offset of the conflicting edit
        start: usize,
        /// End byte offset of the conflicting edit
        end: usize,
    },

    /// A span does not fit the source buffer
    #[error("span {start}..{end} out of bounds for buffer of {len} bytes")]
    SpanOutOfBounds {
        /// Start byte offset
        start: usize,
        /// End byte offset
        end: usize,
        /// Buffer length in bytes
        len: usize,
    },

    /// A span does not fall on UTF-8 character boundaries
    #[error("span {start}..{end} splits a UTF-8 character")]
    SpanNotOnCharBoundary {
        /// Start byte offset
        start: usize,
        /// End byte offset
        end: usize,
    },

    /// The callee allowlist pattern failed to compile
    #[error("invalid allowlist pattern: {0}")]
    Allowlist(#[from] regex::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
