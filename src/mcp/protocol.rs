//! JSON-RPC 2.0 message types for the MCP protocol.
//!
//! This module is the message model of the engine: it turns raw text into a
//! validated [`JsonRpcRequest`] and turns a [`JsonRpcResponse`] back into text.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Notification**: A request without `id`; never answered
//! - **Response**: Exactly one of `result` or `error`, echoing the request `id`
//!
//! # Validation
//!
//! Text that is not JSON yields a Parse error (`-32700`). JSON that is not an
//! object, lacks a `method` string, or carries a `jsonrpc` value other than
//! `"2.0"` yields an Invalid Request error (`-32600`). Serialisation performs
//! no further validation.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// The only accepted value of the `jsonrpc` member.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
///
/// IDs are echoed back exactly as received. Numbers keep their original text
/// (`1e2` stays `1e2`, `7.50` stays `7.50`) because `serde_json` is built with
/// `arbitrary_precision`. `Null` is used both for a literal `"id": null` and
/// for error responses whose request ID could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(Number),
    /// String request ID.
    String(String),
    /// `null` request ID.
    Null,
}

impl RequestId {
    /// Converts a raw JSON `id` member into a request ID.
    ///
    /// Returns `None` for values JSON-RPC does not allow as IDs (objects,
    /// arrays and booleans).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| de::Error::custom("request id must be a number, string or null"))
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// A validated JSON-RPC 2.0 request.
///
/// A request without `id` is a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0" once validated.
    pub jsonrpc: String,

    /// Request identifier; `None` for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// The message exactly as received, when it came off the wire.
    #[serde(skip)]
    original: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request with the given ID.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
            original: None,
        }
    }

    /// Creates a notification (a request without ID).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
            original: None,
        }
    }

    /// Validates an already-parsed JSON value as a request.
    ///
    /// # Errors
    ///
    /// Returns the Invalid Request response to send back if the value is not
    /// a well-formed JSON-RPC 2.0 request.
    pub fn from_value(value: Value) -> Result<Self, Box<JsonRpcResponse>> {
        let original = value.clone();
        let Value::Object(mut obj) = value else {
            return Err(Box::new(JsonRpcResponse::invalid_request(RequestId::Null)));
        };

        let id = match obj.remove("id") {
            None => None,
            Some(raw) => Some(RequestId::from_value(&raw).ok_or_else(|| {
                Box::new(JsonRpcResponse::invalid_request(RequestId::Null))
            })?),
        };
        let reply_id = id.clone().unwrap_or(RequestId::Null);

        match obj.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            _ => return Err(Box::new(JsonRpcResponse::invalid_request(reply_id))),
        }

        let Some(Value::String(method)) = obj.remove("method") else {
            return Err(Box::new(JsonRpcResponse::invalid_request(reply_id)));
        };

        let params = obj.remove("params").filter(|p| !p.is_null());

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params,
            original: Some(original),
        })
    }

    /// Returns `true` if this request is a notification.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the parameters as an object, treating absent params as empty.
    ///
    /// Returns `None` if params are present but not an object.
    #[must_use]
    pub fn params_object(&self) -> Option<Map<String, Value>> {
        match &self.params {
            None => Some(Map::new()),
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => None,
        }
    }

    /// Returns the request as a JSON value, as handed to exception reporters.
    ///
    /// A request parsed from the wire yields the message exactly as received,
    /// including members the engine ignores.
    #[must_use]
    pub fn to_value(&self) -> Value {
        if let Some(original) = &self.original {
            return original.clone();
        }
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), Value::String(self.jsonrpc.clone()));
        if let Some(id) = &self.id {
            obj.insert(
                "id".to_string(),
                serde_json::to_value(id).unwrap_or(Value::Null),
            );
        }
        obj.insert("method".to_string(), Value::String(self.method.clone()));
        if let Some(params) = &self.params {
            obj.insert("params".to_string(), params.clone());
        }
        Value::Object(obj)
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The outcome carried by a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    /// Successful result.
    Result(Value),
    /// RPC-level error.
    Error(RpcError),
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,

    /// The request ID this response corresponds to (`null` if unknown).
    pub id: RequestId,

    /// Result or error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::error(RequestId::Null, RpcError::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId) -> Self {
        Self::error(id, RpcError::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::error(
            id,
            RpcError::with_message(ErrorCode::MethodNotFound, format!("Method not found: {method}")),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(id, RpcError::with_message(ErrorCode::InvalidParams, message))
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(id, RpcError::with_message(ErrorCode::InternalError, message))
    }

    /// Returns the result, if this is a success response.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    /// Returns the error, if this is an error response.
    #[must_use]
    pub const fn rpc_error(&self) -> Option<&RpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(error) => Some(error),
        }
    }

    /// Serialises the response to a single line of JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        // The payload is built from `Value`s with string keys, which always serialise.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parses a JSON string into a request.
///
/// # Errors
///
/// Returns the error response to send back if the JSON is malformed
/// (Parse error) or is not a valid request (Invalid Request).
pub fn parse_message(json: &str) -> Result<JsonRpcRequest, Box<JsonRpcResponse>> {
    let value: Value =
        serde_json::from_str(json).map_err(|_| Box::new(JsonRpcResponse::parse_error()))?;
    JsonRpcRequest::from_value(value)
}
