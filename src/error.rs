//! Error types for mcp-rpc-core.
//!
//! Protocol-level failures (parse errors, unknown methods, unknown tools) are
//! not Rust errors: they become JSON-RPC error responses. The types here cover
//! everything that does not fit on the wire: configuration loading, server
//! construction, and handler faults that escape [`Server::handle`].
//!
//! [`Server::handle`]: crate::mcp::Server::handle

use std::path::PathBuf;

use thiserror::Error;

use crate::mcp::protocol::RequestId;

/// A fault raised by a tool or prompt handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that can occur while constructing a server.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServerBuildError {
    /// Two tools were registered under the same name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Two prompts were registered under the same name.
    #[error("duplicate prompt name: {0}")]
    DuplicatePrompt(String),

    /// The server name is empty.
    #[error("server name must not be empty")]
    EmptyName,
}

/// A panic caught inside a tool or prompt handler.
#[derive(Error, Debug)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    /// The panic payload, if it was a string.
    pub message: String,
}

/// A handler fault that was reported and then propagated out of the core.
///
/// The core does not turn these into responses. The transport decides how to
/// surface them; the stdio transport answers with an Internal error.
#[derive(Error, Debug)]
#[error("unhandled fault in {method}")]
pub struct UnhandledFault {
    /// ID of the request that faulted. Notifications are never dispatched,
    /// so a fault always belongs to a request with an ID.
    pub id: RequestId,
    /// Method of the request that faulted.
    pub method: String,
    /// The underlying fault.
    #[source]
    pub source: BoxError,
}
