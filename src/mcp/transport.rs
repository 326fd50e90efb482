//! stdio transport for an MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! Each line is handed to [`Server::handle_json`] and answered before the
//! next line is read. A fault propagated out of the server is answered with
//! an Internal error response and does not stop the loop.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::mcp::protocol::JsonRpcResponse;
use crate::mcp::server::{fault_response, Server};

/// A line-delimited MCP transport.
///
/// Generic over its streams so it can be driven from in-memory buffers in
/// tests; [`StdioTransport::new`] wires it to the process's stdin/stdout.
pub struct StdioTransport<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Buffered reader for incoming lines.
    reader: R,
    /// Writer for outgoing lines.
    writer: W,
}

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    pub const fn with_streams(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line as raw bytes, without its terminator.
    ///
    /// Returns `None` if the input is closed (EOF). The bytes are not checked
    /// for UTF-8 here; [`StdioTransport::handle_message`] answers invalid
    /// text with a Parse error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes a serialised message with newline termination.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_line(&mut self, json: &str) -> io::Result<()> {
        // MCP stdio framing: one message per line
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Handles one raw input line. Bytes that are not UTF-8 are answered with
    /// a Parse error and do not stop the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn handle_message(&mut self, server: &Server, bytes: &[u8]) -> io::Result<()> {
        match std::str::from_utf8(bytes) {
            Ok(line) => self.handle_line(server, line).await,
            Err(e) => {
                warn!(error = %e, "Received a line that is not valid UTF-8");
                self.write_line(&JsonRpcResponse::parse_error().to_json())
                    .await
            }
        }
    }

    /// Handles one input line, writing the response if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn handle_line(&mut self, server: &Server, line: &str) -> io::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        match server.handle_json(line) {
            Ok(Some(response)) => self.write_line(&response).await,
            Ok(None) => Ok(()),
            Err(fault) => {
                error!(
                    method = %fault.method,
                    error = %fault.source,
                    "Request failed with unhandled fault"
                );
                self.write_line(&fault_response(&fault).to_json()).await
            }
        }
    }

    /// Serves requests until the input is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until_eof(&mut self, server: &Server) -> io::Result<()> {
        while let Some(line) = self.read_line().await? {
            self.handle_message(server, &line).await?;
        }
        Ok(())
    }
}

/// Serves `server` over stdin/stdout until EOF or a shutdown signal.
///
/// # Errors
///
/// Returns an error if transport I/O fails.
pub async fn run_stdio(server: &Server) -> io::Result<()> {
    let mut transport = StdioTransport::new();
    run_with_shutdown(&mut transport, server).await
}

/// Runs the main loop and handles shutdown.
#[cfg(unix)]
async fn run_with_shutdown(transport: &mut StdioTransport, server: &Server) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
                return Ok(());
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                return Ok(());
            }

            line_result = transport.read_line() => {
                let Some(line) = line_result? else {
                    info!("stdin closed");
                    return Ok(());
                };
                transport.handle_message(server, &line).await?;
            }
        }
    }
}

/// Runs the main loop and handles shutdown.
#[cfg(windows)]
async fn run_with_shutdown(transport: &mut StdioTransport, server: &Server) -> io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                return Ok(());
            }

            line_result = transport.read_line() => {
                let Some(line) = line_result? else {
                    info!("stdin closed");
                    return Ok(());
                };
                transport.handle_message(server, &line).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::mcp::prompt::{FnPrompt, PromptResult};
    use crate::mcp::tool::{FnTool, ToolResponse};
    use serde_json::Value;

    fn test_server() -> Server {
        Server::builder("transport-test")
            .protocol_version("2024-11-05")
            .tool(FnTool::new("echo", |args, _ctx| {
                Ok(ToolResponse::text(args["message"].as_str().unwrap_or_default()))
            }))
            .prompt(FnPrompt::new("broken", |_args, _ctx| -> Result<PromptResult, BoxError> {
                Err("template missing".into())
            }))
            .build()
            .unwrap()
    }

    async fn run(input: &str) -> Vec<Value> {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> Vec<Value> {
        let server = test_server();
        let mut output = Vec::new();
        let mut transport = StdioTransport::with_streams(input, &mut output);
        transport.serve_until_eof(&server).await.unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn transport_default() {
        let _transport = StdioTransport::default();
    }

    #[tokio::test]
    async fn answers_each_request_line() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
            "\r\n",
        );
        let responses = run(input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn skips_blank_lines_and_notifications() {
        let input = concat!(
            "\n",
            "   \n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
        );
        assert!(run(input).await.is_empty());
    }

    #[tokio::test]
    async fn parse_error_is_answered_with_null_id() {
        let responses = run("{not json\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn propagated_fault_becomes_internal_error_and_loop_continues() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"a","method":"prompts/get","params":{"name":"broken"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"b","method":"ping"}"#,
            "\n",
        );
        let responses = run(input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], "a");
        assert_eq!(responses[0]["error"]["code"], -32603);
        assert_eq!(responses[1]["id"], "b");
        assert_eq!(responses[1]["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_parse_error_and_loop_continues() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.push(b'\n');

        let responses = run_bytes(&input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn last_line_without_newline_is_handled() {
        let responses = run(r#"{"jsonrpc":"2.0","id":"tail","method":"ping"}"#).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], "tail");
    }
}
