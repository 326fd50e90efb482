//! mcp-rpc-core: JSON-RPC request/response engine for Model Context Protocol servers
//!
//! The crate accepts one JSON-RPC payload at a time, routes it by `method` to
//! a fixed set of handlers (`initialize`, `ping`, `tools/list`, `tools/call`,
//! `prompts/list`, `prompts/get`) and produces one JSON-RPC 2.0 response.
//!
//! # Example
//!
//! ```
//! use mcp_rpc_core::mcp::{FnTool, Server, ToolResponse};
//!
//! let server = Server::builder("example")
//!     .tool(FnTool::new("hello", |_args, _ctx| Ok(ToolResponse::text("hi"))))
//!     .build()
//!     .unwrap();
//!
//! let reply = server
//!     .handle_json(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"hello"}}"#)
//!     .unwrap()
//!     .unwrap();
//! assert!(reply.contains(r#""text":"hi""#));
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration file loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol engine and stdio transport

pub mod config;
pub mod error;
pub mod mcp;
