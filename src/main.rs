//! mcp-rpc-core: a Model Context Protocol server over stdio
//!
//! Serves a small set of demonstration tools and prompts through the
//! JSON-RPC core provided by the library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_rpc_core::config::{self, Config};
use mcp_rpc_core::error::{BoxError, ServerBuildError};
use mcp_rpc_core::mcp::configuration::set_default_protocol_version;
use mcp_rpc_core::mcp::transport::run_stdio;
use mcp_rpc_core::mcp::{
    Configuration, FnPrompt, FnTool, PromptArgument, PromptMessage, PromptResult, Server,
    ToolAnnotations, ToolResponse,
};

/// Model Context Protocol server over stdio.
///
/// Reads newline-delimited JSON-RPC requests on stdin and writes responses
/// on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "mcp-rpc-core")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Protocol version to report; takes precedence over the configuration file
    #[arg(long, value_name = "VERSION")]
    protocol_version: Option<String>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Hooks that route instrumentation and fault reports into the log.
fn logging_configuration() -> Configuration {
    Configuration::new()
        .with_instrumentation_callback(|event| {
            debug!(
                method = %event.method,
                tool = event.tool_name.as_deref(),
                prompt = event.prompt_name.as_deref(),
                error = event.error.map(|e| e.as_str()),
                duration_ms = event.duration.as_secs_f64() * 1000.0,
                "Request handled"
            );
        })
        .with_exception_reporter(|fault, context| {
            error!(error = %fault, context = %context.to_value(), "Handler fault");
        })
}

/// Echoes its `message` argument back as text.
fn echo_tool() -> FnTool {
    FnTool::new("echo", |args, _ctx| {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or("message must be a string")?;
        Ok(ToolResponse::text(message))
    })
    .with_description("Echo a message back to the caller")
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "message": { "type": "string", "description": "Text to echo" }
        },
        "required": ["message"]
    }))
    .with_annotations(ToolAnnotations {
        read_only_hint: Some(true),
        idempotent_hint: Some(true),
        ..ToolAnnotations::default()
    })
}

/// Adds two numbers.
fn add_tool() -> FnTool {
    FnTool::new("add", |args, _ctx| {
        let (Some(a), Some(b)) = (
            args.get("a").and_then(Value::as_f64),
            args.get("b").and_then(Value::as_f64),
        ) else {
            return Ok(ToolResponse::error("a and b must both be numbers"));
        };
        Ok(ToolResponse::text((a + b).to_string()))
    })
    .with_description("Add two numbers")
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "a": { "type": "number" },
            "b": { "type": "number" }
        },
        "required": ["a", "b"]
    }))
    .with_annotations(ToolAnnotations {
        read_only_hint: Some(true),
        ..ToolAnnotations::default()
    })
}

/// Renders a code review request.
fn code_review_prompt() -> FnPrompt {
    FnPrompt::new("code_review", |args, _ctx| -> Result<PromptResult, BoxError> {
        let code = args
            .get("code")
            .and_then(Value::as_str)
            .ok_or("code must be a string")?;
        let mut messages = Vec::with_capacity(2);
        if let Some(focus) = args.get("focus").and_then(Value::as_str) {
            messages.push(PromptMessage::user(format!("Focus on: {focus}")));
        }
        messages.push(PromptMessage::user(format!(
            "Please review the following code:\n\n{code}"
        )));
        Ok(PromptResult {
            description: Some("Code review request".to_string()),
            messages,
        })
    })
    .with_description("Ask for a review of a code snippet")
    .with_argument(PromptArgument::required("code", "The code to review"))
    .with_argument(PromptArgument::optional("focus", "What the review should focus on"))
}

/// Builds the server from the loaded configuration.
///
/// A protocol version given on the command line wins over the file's pin.
fn build_server(
    cfg: &Config,
    cli_protocol_version: Option<&str>,
) -> Result<Server, ServerBuildError> {
    let mut builder = Server::builder(cfg.server.name.clone())
        .version(cfg.server.version.clone())
        .tool(echo_tool())
        .tool(add_tool())
        .prompt(code_review_prompt())
        .configuration(logging_configuration());

    if let Some(instructions) = &cfg.server.instructions {
        builder = builder.instructions(instructions.clone());
    }
    if let Some(version) = cli_protocol_version.or(cfg.server.protocol_version.as_deref()) {
        builder = builder.protocol_version(version);
    }

    builder.build()
}

/// Entry point for the mcp-rpc-core server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if let Some(source) = std::error::Error::source(&e) {
                eprintln!("  caused by: {source}");
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    if let Some(version) = args.protocol_version.as_deref() {
        set_default_protocol_version(Some(version));
    }

    let server = match build_server(&cfg, args.protocol_version.as_deref()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to build server");
            return ExitCode::FAILURE;
        }
    };

    info!(
        name = server.name(),
        version = server.version(),
        protocol_version = server.protocol_version(),
        tools = server.tools().len(),
        prompts = server.prompts().len(),
        "MCP server ready, waiting for client connection..."
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_stdio(&server)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }

    fn demo_server() -> Server {
        let cfg = Config::default();
        Server::builder(cfg.server.name)
            .protocol_version("2024-11-05")
            .tool(echo_tool())
            .tool(add_tool())
            .prompt(code_review_prompt())
            .build()
            .unwrap()
    }

    #[test]
    fn cli_protocol_version_beats_config_file() {
        let cfg: Config =
            serde_json::from_str(r#"{"server": {"protocol_version": "2024-11-05"}}"#).unwrap();

        let from_file = build_server(&cfg, None).unwrap();
        assert_eq!(from_file.protocol_version(), "2024-11-05");

        let from_cli = build_server(&cfg, Some("2025-06-18")).unwrap();
        assert_eq!(from_cli.protocol_version(), "2025-06-18");
    }

    fn call(server: &Server, request: &Value) -> Value {
        let text = server.handle_json(&request.to_string()).unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn demo_tools_are_listed_in_order() {
        let server = demo_server();
        let response = call(&server, &json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["echo", "add"]);
    }

    #[test]
    fn add_sums_numbers() {
        let server = demo_server();
        let response = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "add", "arguments": {"a": 2, "b": 3.5}}
            }),
        );
        assert_eq!(response["result"]["content"][0]["text"], "5.5");
    }

    #[test]
    fn add_rejects_non_numbers_in_result() {
        let server = demo_server();
        let response = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "add", "arguments": {"a": "x", "b": 1}}
            }),
        );
        assert_eq!(response["result"]["isError"], true);
    }

    #[test]
    fn code_review_prompt_renders_focus_first() {
        let server = demo_server();
        let response = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 4, "method": "prompts/get",
                "params": {"name": "code_review", "arguments": {"code": "fn f() {}", "focus": "naming"}}
            }),
        );
        let messages = response["result"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"]["text"], "Focus on: naming");
    }
}
