//! MCP server: method routing, handlers and the execution envelope.
//!
//! A [`Server`] is built once from a name, tools, prompts, a context mapping
//! and a [`Configuration`], and is immutable afterwards. Transports hand it
//! one message at a time through [`Server::handle_json`] (raw text) or
//! [`Server::handle`] (parsed JSON) and get back at most one response.
//!
//! # Error channels
//!
//! - Malformed input, unknown methods, unknown tools/prompts and bad params
//!   become JSON-RPC `error` responses.
//! - A faulting tool becomes a *successful* response whose result is
//!   `{"error": "Internal error occurred", "isError": true}`.
//! - A faulting prompt (or any other handler) is reported and then returned
//!   as [`UnhandledFault`]; no response is synthesised.
//!
//! # Concurrency
//!
//! `handle` takes `&self` and holds no locks, so one server may serve many
//! threads at once as long as the registered handlers allow it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::error::{BoxError, HandlerPanic, ServerBuildError, UnhandledFault};
use crate::mcp::configuration::{
    default_protocol_version, global_configuration, Configuration, ReportContext,
};
use crate::mcp::instrumentation::{EventError, PendingEvent};
use crate::mcp::prompt::{
    missing_required_arguments as missing_prompt_arguments, Prompt, PromptRegistry,
};
use crate::mcp::protocol::{parse_message, ErrorCode, JsonRpcRequest, JsonRpcResponse, RpcError};
use crate::mcp::tool::{
    is_false, missing_required_arguments as missing_tool_arguments, Tool, ToolRegistry,
    ToolResponse,
};

/// Opaque request-scoped data handed unchanged to every handler.
pub type ServerContext = Map<String, Value>;

/// Message placed in the result of a tool call whose handler faulted.
pub const TOOL_FAULT_MESSAGE: &str = "Internal error occurred";

/// Method label used in instrumentation for unsupported methods.
pub const UNSUPPORTED_METHOD: &str = "unsupported_method";

/// The fixed set of methods this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `ping`
    Ping,
    /// `tools/list`
    ToolsList,
    /// `tools/call`
    ToolsCall,
    /// `prompts/list`
    PromptsList,
    /// `prompts/get`
    PromptsGet,
}

impl Method {
    /// Every supported method.
    pub const ALL: [Self; 6] = [
        Self::Initialize,
        Self::Ping,
        Self::ToolsList,
        Self::ToolsCall,
        Self::PromptsList,
        Self::PromptsGet,
    ];

    /// Looks up a method by exact name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == name)
    }

    /// Returns the wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::PromptsList => "prompts/list",
            Self::PromptsGet => "prompts/get",
        }
    }
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Present when at least one tool is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapability>,
    /// Present when at least one prompt is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListCapability>,
}

/// Capability flags for a listable registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session. Registries are
    /// immutable, so this is always `false`.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool. Absent and `null` both mean none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arguments: Map<String, Value>,
}

/// Parameters for `prompts/get`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    /// Name of the prompt to render.
    pub name: String,
    /// Arguments for the prompt. Absent and `null` both mean none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arguments: Map<String, Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of invoking a tool handler.
///
/// Prompts have no counterpart: their faults propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallOutcome {
    /// The handler returned normally.
    Completed(ToolResponse),
    /// The handler faulted; the fault has already been reported.
    Failed,
}

impl ToolCallOutcome {
    /// Converts the outcome into the `result` member of the response.
    #[must_use]
    pub fn into_result(self) -> Value {
        match self {
            Self::Completed(response) => json!(response),
            Self::Failed => json!({ "error": TOOL_FAULT_MESSAGE, "isError": true }),
        }
    }
}

/// Why a handler did not produce a result.
enum HandlerError {
    /// Answer with this JSON-RPC error.
    Rpc(RpcError),
    /// Report, then propagate.
    Fault(BoxError),
}

impl HandlerError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self::Rpc(RpcError::with_message(ErrorCode::InvalidParams, message))
    }
}

/// An MCP server: immutable registries plus the request engine.
pub struct Server {
    name: String,
    version: String,
    instructions: Option<String>,
    protocol_version: String,
    tools: ToolRegistry,
    prompts: PromptRegistry,
    context: ServerContext,
    configuration: Configuration,
}

impl Server {
    /// Starts building a server with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(name)
    }

    /// Server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server version reported in `serverInfo`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Protocol version captured when the server was built.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Registered tools.
    #[must_use]
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Registered prompts.
    #[must_use]
    pub const fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Context handed to every handler.
    #[must_use]
    pub const fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Active configuration.
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Handles one line of raw JSON-RPC text.
    ///
    /// Returns the serialised response, or `None` for notifications.
    ///
    /// # Errors
    ///
    /// Returns [`UnhandledFault`] if a non-tool handler faulted.
    pub fn handle_json(&self, text: &str) -> Result<Option<String>, UnhandledFault> {
        let request = match parse_message(text) {
            Ok(request) => request,
            Err(response) => {
                debug!("Rejected malformed message");
                return Ok(Some(response.to_json()));
            }
        };
        Ok(self.handle_request(&request)?.map(|r| r.to_json()))
    }

    /// Handles one already-parsed JSON-RPC message.
    ///
    /// # Errors
    ///
    /// Returns [`UnhandledFault`] if a non-tool handler faulted.
    pub fn handle(&self, message: Value) -> Result<Option<JsonRpcResponse>, UnhandledFault> {
        match JsonRpcRequest::from_value(message) {
            Ok(request) => self.handle_request(&request),
            Err(response) => Ok(Some(*response)),
        }
    }

    /// Handles a validated request.
    ///
    /// # Errors
    ///
    /// Returns [`UnhandledFault`] if a non-tool handler faulted.
    pub fn handle_request(
        &self,
        request: &JsonRpcRequest,
    ) -> Result<Option<JsonRpcResponse>, UnhandledFault> {
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Dropping notification");
            return Ok(None);
        };

        debug!(method = %request.method, id = %id, "Handling request");

        let Some(method) = Method::from_name(&request.method) else {
            warn!(method = %request.method, "Method not found");
            let mut event = PendingEvent::start(UNSUPPORTED_METHOD);
            event.set_error(EventError::MethodNotFound);
            self.configuration.instrument(&event.finish());
            return Ok(Some(JsonRpcResponse::method_not_found(id, &request.method)));
        };

        let mut event = PendingEvent::start(method.as_str());
        let outcome = self.dispatch(method, request, &mut event);

        match outcome {
            Ok(result) => {
                self.configuration.instrument(&event.finish());
                Ok(Some(JsonRpcResponse::success(id, result)))
            }
            Err(HandlerError::Rpc(rpc_error)) => {
                self.configuration.instrument(&event.finish());
                Ok(Some(JsonRpcResponse::error(id, rpc_error)))
            }
            Err(HandlerError::Fault(fault)) => {
                error!(method = %request.method, id = %id, error = %fault, "Handler fault");
                self.configuration.report_exception(
                    &*fault,
                    &ReportContext::Request {
                        request: request.to_value(),
                    },
                );
                event.set_error(EventError::InternalError);
                self.configuration.instrument(&event.finish());
                Err(UnhandledFault {
                    id,
                    method: request.method.clone(),
                    source: fault,
                })
            }
        }
    }

    fn dispatch(
        &self,
        method: Method,
        request: &JsonRpcRequest,
        event: &mut PendingEvent,
    ) -> Result<Value, HandlerError> {
        match method {
            Method::Initialize => Ok(self.initialize_result()),
            Method::Ping => Ok(json!({})),
            Method::ToolsList => Ok(json!({ "tools": self.tools.definitions() })),
            Method::ToolsCall => self.call_tool(request, event),
            Method::PromptsList => Ok(json!({ "prompts": self.prompts.definitions() })),
            Method::PromptsGet => self.get_prompt(request, event),
        }
    }

    fn initialize_result(&self) -> Value {
        let capabilities = ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ListCapability::default),
            prompts: (!self.prompts.is_empty()).then(ListCapability::default),
        };
        let server_info = ServerInfo {
            name: self.name.clone(),
            version: self.version.clone(),
        };
        let mut result = json!({
            "protocolVersion": self.protocol_version,
            "capabilities": capabilities,
            "serverInfo": server_info,
        });
        if let (Some(instructions), Some(obj)) = (&self.instructions, result.as_object_mut()) {
            obj.insert(
                "instructions".to_string(),
                Value::String(instructions.clone()),
            );
        }
        result
    }

    fn call_tool(
        &self,
        request: &JsonRpcRequest,
        event: &mut PendingEvent,
    ) -> Result<Value, HandlerError> {
        let params: ToolCallParams = parse_params(request, event)?;

        let Some(tool) = self.tools.get(&params.name) else {
            warn!(tool = %params.name, "Tool not found");
            event.set_error(EventError::ToolNotFound);
            return Err(HandlerError::invalid_params(format!(
                "Tool not found: {}",
                params.name
            )));
        };
        event.set_tool_name(params.name.as_str());

        let schema = tool.input_schema();
        let missing = missing_tool_arguments(&schema, &params.arguments);
        if !missing.is_empty() {
            event.set_error(EventError::InvalidParams);
            return Err(HandlerError::invalid_params(format!(
                "Missing required arguments: {}",
                missing.join(", ")
            )));
        }
        if let Err(reason) = self
            .configuration
            .validate_arguments(&schema, &params.arguments)
        {
            event.set_error(EventError::InvalidParams);
            return Err(HandlerError::invalid_params(format!(
                "Invalid arguments: {reason}"
            )));
        }

        let outcome = self.invoke_tool(&params.name, tool.as_ref(), &params.arguments);
        if outcome == ToolCallOutcome::Failed {
            event.set_error(EventError::InternalError);
        }
        Ok(outcome.into_result())
    }

    /// Runs a tool handler, reporting and absorbing any fault.
    fn invoke_tool(
        &self,
        name: &str,
        tool: &dyn Tool,
        arguments: &Map<String, Value>,
    ) -> ToolCallOutcome {
        match guarded(|| tool.call(arguments, &self.context)) {
            Ok(response) => ToolCallOutcome::Completed(response),
            Err(fault) => {
                error!(tool = name, error = %fault, "Tool handler failed");
                self.configuration.report_exception(
                    &*fault,
                    &ReportContext::ToolCall {
                        tool_name: name.to_string(),
                        arguments: arguments.clone(),
                    },
                );
                ToolCallOutcome::Failed
            }
        }
    }

    fn get_prompt(
        &self,
        request: &JsonRpcRequest,
        event: &mut PendingEvent,
    ) -> Result<Value, HandlerError> {
        let params: PromptGetParams = parse_params(request, event)?;

        let Some(prompt) = self.prompts.get(&params.name) else {
            warn!(prompt = %params.name, "Prompt not found");
            event.set_error(EventError::PromptNotFound);
            return Err(HandlerError::invalid_params(format!(
                "Prompt not found: {}",
                params.name
            )));
        };
        event.set_prompt_name(params.name.as_str());

        let missing = missing_prompt_arguments(prompt.as_ref(), &params.arguments);
        if !missing.is_empty() {
            event.set_error(EventError::InvalidParams);
            return Err(HandlerError::invalid_params(format!(
                "Missing required arguments: {}",
                missing.join(", ")
            )));
        }

        let result =
            guarded(|| prompt.get(&params.arguments, &self.context)).map_err(HandlerError::Fault)?;
        serde_json::to_value(result).map_err(|e| HandlerError::Fault(e.into()))
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("protocol_version", &self.protocol_version)
            .field("tools", &self.tools)
            .field("prompts", &self.prompts)
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

/// Deserialises request params, mapping failures to Invalid params.
fn parse_params<T: DeserializeOwned>(
    request: &JsonRpcRequest,
    event: &mut PendingEvent,
) -> Result<T, HandlerError> {
    let params = request.params.clone().unwrap_or_else(|| json!({}));
    serde_json::from_value(params).map_err(|e| {
        warn!(method = %request.method, error = %e, "Invalid params");
        event.set_error(EventError::InvalidParams);
        HandlerError::invalid_params(format!("Invalid params for {}: {e}", request.method))
    })
}

/// Runs a handler, turning a panic into an ordinary fault.
fn guarded<T>(handler: impl FnOnce() -> Result<T, BoxError>) -> Result<T, BoxError> {
    catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        Err(HandlerPanic {
            message: panic_message(payload.as_ref()),
        }
        .into())
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    protocol_version: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    prompts: Vec<Arc<dyn Prompt>>,
    context: ServerContext,
    configuration: Option<Configuration>,
}

impl ServerBuilder {
    /// Creates a builder with no tools, prompts or context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            protocol_version: None,
            tools: Vec::new(),
            prompts: Vec::new(),
            context: ServerContext::new(),
            configuration: None,
        }
    }

    /// Sets the version reported in `serverInfo`.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the instructions returned from `initialize`.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Pins the protocol version, taking precedence over the configuration
    /// and the process-wide default.
    #[must_use]
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    /// Registers a tool.
    #[must_use]
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Registers already-shared tools.
    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Registers a prompt.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompts.push(Arc::new(prompt));
        self
    }

    /// Registers already-shared prompts.
    #[must_use]
    pub fn prompts(mut self, prompts: impl IntoIterator<Item = Arc<dyn Prompt>>) -> Self {
        self.prompts.extend(prompts);
        self
    }

    /// Sets the context handed to every handler.
    #[must_use]
    pub fn context(mut self, context: ServerContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the configuration, layered over the process-wide default.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Builds the server.
    ///
    /// The protocol version is resolved here, once: the builder's pin, else
    /// the configuration's pin, else the process-wide default.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or two tools or two prompts
    /// share a name.
    pub fn build(self) -> Result<Server, ServerBuildError> {
        if self.name.is_empty() {
            return Err(ServerBuildError::EmptyName);
        }

        let global = global_configuration();
        let configuration = match &self.configuration {
            Some(configuration) => global.merge(configuration),
            None => global,
        };
        let protocol_version = self
            .protocol_version
            .or_else(|| configuration.protocol_version().map(str::to_string))
            .unwrap_or_else(default_protocol_version);

        Ok(Server {
            name: self.name,
            version: self.version,
            instructions: self.instructions,
            protocol_version,
            tools: ToolRegistry::new(self.tools)?,
            prompts: PromptRegistry::new(self.prompts)?,
            context: self.context,
            configuration,
        })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("prompts", &self.prompts.len())
            .finish_non_exhaustive()
    }
}

/// Builds the Internal error response a transport sends for a propagated
/// fault.
#[must_use]
pub fn fault_response(fault: &UnhandledFault) -> JsonRpcResponse {
    JsonRpcResponse::internal_error(
        fault.id.clone(),
        ErrorCode::InternalError.default_message(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::configuration::DEFAULT_PROTOCOL_VERSION;
    use crate::mcp::instrumentation::InstrumentationEvent;
    use crate::mcp::prompt::{FnPrompt, PromptArgument, PromptMessage, PromptResult};
    use crate::mcp::protocol::RequestId;
    use crate::mcp::tool::FnTool;
    use serial_test::serial;
    use std::sync::Mutex;

    fn echo_tool() -> FnTool {
        FnTool::new("echo", |args, _ctx| {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .ok_or("message must be a string")?;
            Ok(ToolResponse::text(message))
        })
        .with_input_schema(json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        }))
    }

    fn request(id: i64, method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }

    fn recording_configuration() -> (Configuration, Arc<Mutex<Vec<InstrumentationEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let config = Configuration::new()
            .with_protocol_version(DEFAULT_PROTOCOL_VERSION)
            .with_instrumentation_callback(move |event| sink.lock().unwrap().push(event.clone()));
        (config, events)
    }

    #[test]
    fn method_lookup_is_exact() {
        assert_eq!(Method::from_name("tools/call"), Some(Method::ToolsCall));
        assert_eq!(Method::from_name("tools/"), None);
        assert_eq!(Method::from_name("Ping"), None);
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.as_str()), Some(method));
        }
    }

    #[test]
    fn server_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Server>();
    }

    #[test]
    fn build_rejects_empty_name() {
        assert_eq!(
            Server::builder("").build().err(),
            Some(ServerBuildError::EmptyName)
        );
    }

    #[test]
    fn build_rejects_duplicate_tools() {
        let err = Server::builder("dup")
            .tool(echo_tool())
            .tool(echo_tool())
            .build()
            .err();
        assert_eq!(err, Some(ServerBuildError::DuplicateTool("echo".to_string())));
    }

    #[test]
    fn initialize_advertises_only_populated_registries() {
        let server = Server::builder("caps")
            .protocol_version("2025-03-26")
            .version("9.9.9")
            .instructions("Be nice")
            .tool(echo_tool())
            .build()
            .unwrap();

        let response = server
            .handle(request(1, "initialize", json!({})))
            .unwrap()
            .unwrap();
        let result = response.result().unwrap();

        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"], json!({"name": "caps", "version": "9.9.9"}));
        assert_eq!(result["capabilities"], json!({"tools": {}}));
        assert_eq!(result["instructions"], "Be nice");
    }

    #[test]
    fn ping_ignores_params() {
        let server = Server::builder("ping").build().unwrap();
        for params in [json!({}), json!([1, 2]), json!("junk")] {
            let response = server.handle(request(5, "ping", params)).unwrap().unwrap();
            assert_eq!(response.result(), Some(&json!({})));
        }
    }

    #[test]
    fn empty_registries_list_empty() {
        let server = Server::builder("empty").build().unwrap();
        let tools = server.handle(request(1, "tools/list", json!({}))).unwrap().unwrap();
        assert_eq!(tools.result(), Some(&json!({"tools": []})));
        let prompts = server.handle(request(2, "prompts/list", json!({}))).unwrap().unwrap();
        assert_eq!(prompts.result(), Some(&json!({"prompts": []})));
    }

    #[test]
    fn tools_call_success() {
        let server = Server::builder("t").tool(echo_tool()).build().unwrap();
        let response = server
            .handle(request(
                3,
                "tools/call",
                json!({"name": "echo", "arguments": {"message": "hi"}}),
            ))
            .unwrap()
            .unwrap();
        assert_eq!(
            response.result(),
            Some(&json!({"content": [{"type": "text", "text": "hi"}]}))
        );
    }

    #[test]
    fn tools_call_missing_required_argument_is_invalid_params() {
        let (config, events) = recording_configuration();
        let server = Server::builder("t")
            .tool(echo_tool())
            .configuration(config)
            .build()
            .unwrap();
        let response = server
            .handle(request(3, "tools/call", json!({"name": "echo"})))
            .unwrap()
            .unwrap();
        let error = response.rpc_error().unwrap();
        assert_eq!(error.code, ErrorCode::InvalidParams.code());
        assert!(error.message.contains("message"));

        let events = events.lock().unwrap();
        assert_eq!(events[0].error, Some(EventError::InvalidParams));
        assert_eq!(events[0].tool_name.as_deref(), Some("echo"));
    }

    #[test]
    fn tools_call_without_name_is_invalid_params() {
        let server = Server::builder("t").tool(echo_tool()).build().unwrap();
        let response = server
            .handle(request(3, "tools/call", json!({"arguments": {}})))
            .unwrap()
            .unwrap();
        assert_eq!(response.rpc_error().unwrap().code, ErrorCode::InvalidParams.code());
    }

    #[test]
    fn validator_rejection_is_invalid_params() {
        let config = Configuration::new().with_argument_validator(
            |_schema: &Value, _args: &Map<String, Value>| Err("too loud".to_string()),
        );
        let server = Server::builder("t")
            .tool(echo_tool())
            .configuration(config)
            .build()
            .unwrap();
        let response = server
            .handle(request(
                3,
                "tools/call",
                json!({"name": "echo", "arguments": {"message": "HI"}}),
            ))
            .unwrap()
            .unwrap();
        let error = response.rpc_error().unwrap();
        assert_eq!(error.code, ErrorCode::InvalidParams.code());
        assert_eq!(error.message, "Invalid arguments: too loud");
    }

    #[test]
    fn panicking_tool_is_converted() {
        let server = Server::builder("t")
            .tool(FnTool::new("explode", |_args, _ctx| panic!("kaboom")))
            .build()
            .unwrap();
        let response = server
            .handle(request(8, "tools/call", json!({"name": "explode"})))
            .unwrap()
            .unwrap();
        assert_eq!(
            response.result(),
            Some(&json!({"error": "Internal error occurred", "isError": true}))
        );
    }

    #[test]
    fn tool_reported_error_passes_through() {
        let server = Server::builder("t")
            .tool(FnTool::new("refuse", |_args, _ctx| {
                Ok(ToolResponse::error("quota exceeded"))
            }))
            .build()
            .unwrap();
        let response = server
            .handle(request(8, "tools/call", json!({"name": "refuse"})))
            .unwrap()
            .unwrap();
        assert_eq!(
            response.result(),
            Some(&json!({
                "content": [{"type": "text", "text": "quota exceeded"}],
                "isError": true
            }))
        );
    }

    #[test]
    fn handler_receives_server_context() {
        let mut context = ServerContext::new();
        context.insert("user_id".to_string(), json!(42));
        let server = Server::builder("ctx")
            .context(context)
            .tool(FnTool::new("whoami", |_args, ctx| {
                Ok(ToolResponse::text(ctx["user_id"].to_string()))
            }))
            .build()
            .unwrap();
        let response = server
            .handle(request(1, "tools/call", json!({"name": "whoami"})))
            .unwrap()
            .unwrap();
        assert_eq!(response.result().unwrap()["content"][0]["text"], "42");
    }

    #[test]
    fn prompts_get_renders_and_checks_required() {
        let prompt = FnPrompt::new("greet", |args, _ctx| {
            let who = args.get("who").and_then(Value::as_str).unwrap_or("world");
            Ok(PromptResult {
                description: None,
                messages: vec![PromptMessage::user(format!("Say hello to {who}"))],
            })
        })
        .with_argument(PromptArgument::required("who", "Who to greet"));
        let server = Server::builder("p").prompt(prompt).build().unwrap();

        let ok = server
            .handle(request(1, "prompts/get", json!({"name": "greet", "arguments": {"who": "Ada"}})))
            .unwrap()
            .unwrap();
        assert_eq!(
            ok.result().unwrap()["messages"][0]["content"]["text"],
            "Say hello to Ada"
        );

        let missing = server
            .handle(request(2, "prompts/get", json!({"name": "greet"})))
            .unwrap()
            .unwrap();
        assert_eq!(missing.rpc_error().unwrap().code, ErrorCode::InvalidParams.code());
    }

    #[test]
    fn null_arguments_mean_no_arguments() {
        let tool = FnTool::new("count", |args, _ctx| Ok(ToolResponse::text(args.len().to_string())));
        let prompt = FnPrompt::new("plain", |args, _ctx| {
            Ok(PromptResult {
                description: None,
                messages: vec![PromptMessage::user(format!("{} arguments", args.len()))],
            })
        });
        let server = Server::builder("n").tool(tool).prompt(prompt).build().unwrap();

        let called = server
            .handle(request(1, "tools/call", json!({"name": "count", "arguments": null})))
            .unwrap()
            .unwrap();
        assert_eq!(called.result().unwrap()["content"][0]["text"], "0");

        let rendered = server
            .handle(request(2, "prompts/get", json!({"name": "plain", "arguments": null})))
            .unwrap()
            .unwrap();
        assert_eq!(
            rendered.result().unwrap()["messages"][0]["content"]["text"],
            "0 arguments"
        );

        let not_an_object = server
            .handle(request(3, "tools/call", json!({"name": "count", "arguments": [1]})))
            .unwrap()
            .unwrap();
        assert_eq!(
            not_an_object.rpc_error().unwrap().code,
            ErrorCode::InvalidParams.code()
        );
    }

    #[test]
    fn prompt_fault_reports_the_message_as_received() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let config = Configuration::new().with_exception_reporter(move |_fault, context| {
            sink.lock().unwrap().push(context.to_value());
        });
        let prompt = FnPrompt::new("broken", |_args, _ctx| -> Result<PromptResult, BoxError> {
            Err("template missing".into())
        });
        let server = Server::builder("r")
            .prompt(prompt)
            .configuration(config)
            .build()
            .unwrap();

        let message = json!({
            "jsonrpc": "2.0",
            "id": "req-7",
            "method": "prompts/get",
            "params": {"name": "broken", "arguments": null},
            "x-trace": "abc"
        });
        let fault = server.handle(message.clone()).unwrap_err();

        assert_eq!(fault.id, RequestId::from("req-7"));
        assert_eq!(*reports.lock().unwrap(), vec![json!({"request": message})]);
    }

    #[test]
    fn list_changed_is_omitted_when_false() {
        let capability = ListCapability::default();
        assert_eq!(serde_json::to_value(capability).unwrap(), json!({}));
        let changing = ListCapability { list_changed: true };
        assert_eq!(
            serde_json::to_value(changing).unwrap(),
            json!({"listChanged": true})
        );
    }

    #[test]
    fn unknown_prompt_is_rpc_error() {
        let (config, events) = recording_configuration();
        let server = Server::builder("p").configuration(config).build().unwrap();
        let response = server
            .handle(request(1, "prompts/get", json!({"name": "nope"})))
            .unwrap()
            .unwrap();
        assert_eq!(response.rpc_error().unwrap().message, "Prompt not found: nope");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error, Some(EventError::PromptNotFound));
        assert_eq!(events[0].prompt_name, None);
    }

    #[test]
    fn unknown_method_is_instrumented_without_its_name() {
        let (config, events) = recording_configuration();
        let server = Server::builder("m").configuration(config).build().unwrap();
        let response = server
            .handle(request(1, "resources/list", json!({})))
            .unwrap()
            .unwrap();
        assert_eq!(response.rpc_error().unwrap().code, ErrorCode::MethodNotFound.code());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, UNSUPPORTED_METHOD);
        assert_eq!(events[0].error, Some(EventError::MethodNotFound));
    }

    #[test]
    fn notifications_are_not_dispatched() {
        let (config, events) = recording_configuration();
        let server = Server::builder("n")
            .tool(FnTool::new("explode", |_args, _ctx| panic!("must not run")))
            .configuration(config)
            .build()
            .unwrap();
        let outcome = server
            .handle(json!({"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "explode"}}))
            .unwrap();
        assert!(outcome.is_none());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn fault_response_uses_request_id() {
        let fault = UnhandledFault {
            id: RequestId::from(12),
            method: "prompts/get".to_string(),
            source: "boom".into(),
        };
        let response = fault_response(&fault);
        assert_eq!(response.id, RequestId::from(12));
        assert_eq!(response.rpc_error().unwrap().code, ErrorCode::InternalError.code());
        assert_eq!(response.rpc_error().unwrap().message, "Internal error");
    }

    #[test]
    #[serial]
    fn server_captures_protocol_version_at_build() {
        crate::mcp::configuration::set_default_protocol_version(Some("2099-01-01"));
        let pinned = Server::builder("v").build().unwrap();
        crate::mcp::configuration::set_default_protocol_version(None);
        let fresh = Server::builder("v").build().unwrap();

        assert_eq!(pinned.protocol_version(), "2099-01-01");
        assert_eq!(fresh.protocol_version(), DEFAULT_PROTOCOL_VERSION);
    }

    #[test]
    #[serial]
    fn configuration_pin_beats_process_default() {
        crate::mcp::configuration::set_default_protocol_version(Some("2099-01-01"));
        let server = Server::builder("v")
            .configuration(Configuration::new().with_protocol_version("2025-03-26"))
            .build()
            .unwrap();
        crate::mcp::configuration::set_default_protocol_version(None);

        assert_eq!(server.protocol_version(), "2025-03-26");
    }
}
