//! Error types for the obstream-core library.
//!
//! Every failure the decoder can raise is a variant of [`Error`], built with
//! the `thiserror` crate. Variants map one-to-one onto the failure kinds of the
//! stream protocol: truncated input, malformed text, corrupted framing, invalid
//! or unresolvable classes, callback misuse, mode violations and aborted
//! streams.

use crate::graph::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for obstream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all obstream operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes were available than a read required
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where more input was expected
        offset: usize,
    },

    /// Invalid modified UTF-8 byte sequence
    #[error("malformed modified UTF-8 at offset {offset}")]
    MalformedUtf {
        /// Offset of the string body that failed to decode
        offset: usize,
    },

    /// Stream structure violates the wire format
    #[error("stream corrupted at offset {offset}: {details}")]
    StreamCorrupted {
        /// Byte offset where the error was detected
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Class descriptor or registered handler is inconsistent
    #[error("invalid class '{class_name}': {details}")]
    InvalidClass {
        /// Stream class name, empty for proxy descriptors
        class_name: String,
        /// Detailed description of the issue
        details: String,
    },

    /// A class payload needs a registered handler that does not exist
    #[error("class not found '{class_name}': {details}")]
    ClassNotFound {
        /// Stream class name
        class_name: String,
        /// Detailed description of the issue
        details: String,
    },

    /// A callback-only operation was used outside its frame
    #[error("not active: {0}")]
    NotActive(String),

    /// Block-data mode switched while bytes were still pending
    #[error("illegal mode: {0}")]
    IllegalMode(String),

    /// An object was requested where block data (or its end) is pending
    #[error("optional data pending: {length} bytes, end of data: {eof}")]
    OptionalData {
        /// Bytes remaining in the current block
        length: usize,
        /// Whether the end of the current payload was reached instead
        eof: bool,
    },

    /// The writer aborted the stream and embedded the causing object
    #[error("writing aborted: stream contains an exception object")]
    WriteAborted {
        /// The embedded exception object, resolvable through the heap
        exception: Value,
    },

    /// A handler rejected the state it decoded
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Internal invariant violated; the decoder must not be used further
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Object nesting exceeded the configured limit
    #[error("object nesting exceeds the limit of {limit}")]
    RecursionLimit {
        /// Configured maximum depth
        limit: usize,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new stream corruption error
    pub fn stream_corrupted(offset: usize, details: impl Into<String>) -> Self {
        Self::StreamCorrupted {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid class error
    pub fn invalid_class(class_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidClass {
            class_name: class_name.into(),
            details: details.into(),
        }
    }

    /// Creates a new class not found error
    pub fn class_not_found(class_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ClassNotFound {
            class_name: class_name.into(),
            details: details.into(),
        }
    }

    /// Creates a new not active error
    pub fn not_active(msg: impl Into<String>) -> Self {
        Self::NotActive(msg.into())
    }

    /// Creates a new illegal mode error
    pub fn illegal_mode(msg: impl Into<String>) -> Self {
        Self::IllegalMode(msg.into())
    }

    /// Creates a new invalid object error
    pub fn invalid_object(msg: impl Into<String>) -> Self {
        Self::InvalidObject(msg.into())
    }

    /// Creates a new illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Returns true if the caller may keep reading after this error
    ///
    /// Only pending optional data qualifies: the caller should consume the
    /// block data (or leave the payload) before requesting another object.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OptionalData { .. })
    }

    /// Returns true if this error marks the end of the readable input
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
