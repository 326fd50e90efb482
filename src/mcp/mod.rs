//! Model Context Protocol (MCP) request engine.
//!
//! This module turns one JSON-RPC message into at most one JSON-RPC message.
//! Transports own framing and byte I/O; the server owns routing, the tool and
//! prompt registries, fault reporting and instrumentation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│ Tools and   │    │
//! │   │   (stdio)   │    │  (envelope) │    │  Prompts    │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │              JSON-RPC Messages                  │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Servers default to MCP protocol version 2024-11-05; see
//! [`configuration::set_default_protocol_version`] to override it.

pub mod configuration;
pub mod content;
pub mod instrumentation;
pub mod prompt;
pub mod protocol;
pub mod server;
pub mod tool;
pub mod transport;

pub use configuration::{Configuration, ReportContext, DEFAULT_PROTOCOL_VERSION};
pub use content::{Content, Role};
pub use instrumentation::{EventError, InstrumentationEvent};
pub use prompt::{FnPrompt, Prompt, PromptArgument, PromptMessage, PromptResult};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, RequestId, RpcError};
pub use server::{Server, ServerBuilder, ServerContext};
pub use tool::{FnTool, Tool, ToolAnnotations, ToolResponse};
pub use transport::StdioTransport;
