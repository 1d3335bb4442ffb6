//! Error types for jvmhost.
//!
//! # Error Message Style Guide
//!
//! All error messages follow a consistent format for clarity and actionability:
//!
//! - **Format**: `"<operation> failed: <reason>"` or `"<entity> not found: <identifier>"`
//! - **Case**: All lowercase (Rust convention for error messages)
//! - **Context**: Include relevant identifiers (backend name, class name, path) when available
//! - **Actionability**: Messages should help users understand what went wrong and how to fix it
//!
//! ## Preferred Patterns
//!
//! ```text
//! // Operation failures (use "failed" consistently)
//! "vm start failed: no vm library under /opt/jdk"
//! "negotiation failed: decode payload: unexpected end of input"
//!
//! // Not found errors (use structured variants)
//! "class not found: com.example.Missing"
//!
//! // Forbidden lifecycle mutations
//! "unsupported operation: set library path: fixed at vm boot"
//! ```

use thiserror::Error;

/// Result type alias using jvmhost's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jvmhost operations.
///
/// Error messages follow a consistent format. See module documentation for style guide.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid or missing configuration: bad backend identifier, malformed
    /// import spec, missing VM home, unreadable jar.
    #[error("configuration invalid: {reason}")]
    Configuration {
        /// Explanation of what is invalid.
        reason: String,
    },

    // ========================================================================
    // Class Resolution Errors
    // ========================================================================
    /// Requested foreign class does not exist. Raised eagerly at load time,
    /// never deferred to first use.
    #[error("class not found: {name}")]
    ClassNotFound {
        /// Fully-qualified name of the class that was not found.
        name: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Mutation forbidden by VM lifecycle rules (e.g. library-path change
    /// after boot, classpath replace on an append-only backend).
    #[error("unsupported operation: {operation}: {reason}")]
    Unsupported {
        /// The operation that was attempted.
        operation: String,
        /// Why the backend or lifecycle forbids it.
        reason: String,
    },

    /// VM startup failed.
    #[error("vm start failed: {0}")]
    VmStart(String),

    /// A call into the running VM failed.
    #[error("vm call failed: {operation}: {reason}")]
    VmCall {
        /// The operation that failed (e.g. "get property", "reflect class").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    // ========================================================================
    // Loader Registry Errors
    // ========================================================================
    /// Attempted release of a loader resource that still has children.
    #[error("loader release refused: {children} live child loader(s), release children first")]
    LoaderInUse {
        /// Number of children still registered under the node.
        children: usize,
    },

    // ========================================================================
    // Negotiation Errors
    // ========================================================================
    /// Child-process property fetch failed (non-zero exit, missing or
    /// undecodable output).
    #[error("negotiation failed: {operation}: {reason}")]
    Negotiation {
        /// The negotiation step that failed (e.g. "spawn worker", "decode payload").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Child-process property fetch did not finish within the deadline.
    #[error("negotiation timed out after {seconds}s for backend {backend}")]
    NegotiationTimeout {
        /// Backend identifier the negotiation was for.
        backend: String,
        /// Deadline that expired, in seconds.
        seconds: u64,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Property-snapshot encode/decode failed.
    #[error("codec operation failed: {operation}: {reason}")]
    Codec {
        /// The operation that failed ("encode" or "decode").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// IO error wrapper.
    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a class-not-found error.
    pub fn class_not_found(name: impl Into<String>) -> Self {
        Self::ClassNotFound { name: name.into() }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a VM start error.
    pub fn vm_start(reason: impl Into<String>) -> Self {
        Self::VmStart(reason.into())
    }

    /// Create a VM call error.
    pub fn vm_call(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VmCall {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a loader-in-use error.
    pub fn loader_in_use(children: usize) -> Self {
        Self::LoaderInUse { children }
    }

    /// Create a negotiation error.
    pub fn negotiation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Negotiation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a negotiation timeout error.
    pub fn negotiation_timeout(backend: impl Into<String>, seconds: u64) -> Self {
        Self::NegotiationTimeout {
            backend: backend.into(),
            seconds,
        }
    }

    /// Create a codec error.
    pub fn codec(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Codec {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
