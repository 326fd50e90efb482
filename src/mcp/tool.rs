//! Tool capability and the tool registry.
//!
//! A tool is any value implementing [`Tool`]. Simple tools can be built from a
//! closure with [`FnTool`]; richer ones implement the trait directly, in which
//! case the name defaults to the snake_case form of the type name.
//!
//! # Concurrency
//!
//! A server may be shared across threads, so handlers must be `Send + Sync`
//! and must tolerate concurrent invocation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{BoxError, ServerBuildError};
use crate::mcp::content::Content;
use crate::mcp::server::ServerContext;

/// A named, schema-described capability a client may invoke.
pub trait Tool: Send + Sync {
    /// Unique name of the tool within a server.
    fn name(&self) -> String {
        default_name::<Self>()
    }

    /// Human-readable description.
    fn description(&self) -> Option<String> {
        None
    }

    /// JSON Schema for the tool's arguments.
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// Descriptive hints about the tool's behaviour. Never enforced.
    fn annotations(&self) -> Option<ToolAnnotations> {
        None
    }

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Any returned error is reported and turned into an `isError` result; it
    /// never becomes a JSON-RPC error.
    fn call(
        &self,
        arguments: &Map<String, Value>,
        context: &ServerContext,
    ) -> Result<ToolResponse, BoxError>;
}

/// Optional behavioural hints advertised in `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not modify its environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// The tool may perform destructive updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeated calls with the same arguments have no additional effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool interacts with an open world of external entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// A tool entry in the `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// Behavioural hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
pub(crate) const fn is_false(b: &bool) -> bool {
    !*b
}

/// Content returned by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// Content blocks, in order.
    pub content: Vec<Content>,
    /// Set by the tool itself to flag an application-level failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolResponse {
    /// Creates a successful response from content blocks.
    #[must_use]
    pub const fn new(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates a successful text response.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)])
    }

    /// Creates a text response flagged as an application-level error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }
}

type ToolFn =
    dyn Fn(&Map<String, Value>, &ServerContext) -> Result<ToolResponse, BoxError> + Send + Sync;

/// A tool built from a closure plus metadata.
pub struct FnTool {
    name: String,
    description: Option<String>,
    input_schema: Value,
    annotations: Option<ToolAnnotations>,
    handler: Box<ToolFn>,
}

impl FnTool {
    /// Creates a tool with an empty object schema.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>, &ServerContext) -> Result<ToolResponse, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            input_schema: json!({ "type": "object" }),
            annotations: None,
            handler: Box::new(handler),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

impl Tool for FnTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn annotations(&self) -> Option<ToolAnnotations> {
        self.annotations.clone()
    }

    fn call(
        &self,
        arguments: &Map<String, Value>,
        context: &ServerContext,
    ) -> Result<ToolResponse, BoxError> {
        (self.handler)(arguments, context)
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Tools keyed by name, in registration order. Immutable once built.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds a registry, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`ServerBuildError::DuplicateTool`] if two tools share a name.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, ServerBuildError> {
        let mut map = IndexMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name();
            if map.contains_key(&name) {
                return Err(ServerBuildError::DuplicateTool(name));
            }
            map.insert(name, tool);
        }
        Ok(Self { tools: map })
    }

    /// Looks up a tool by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the `tools/list` entries in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDefinition {
                name: name.clone(),
                description: tool.description(),
                input_schema: tool.input_schema(),
                annotations: tool.annotations(),
            })
            .collect()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

/// Returns the names listed in `schema.required` that `arguments` lacks.
#[must_use]
pub fn missing_required_arguments(schema: &Value, arguments: &Map<String, Value>) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|name| !arguments.contains_key(*name))
        .map(str::to_string)
        .collect()
}

/// Derives a default name from a type name: `my_crate::CodeReview` becomes
/// `code_review`.
pub(crate) fn default_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    let last = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);
    snake_case(last)
}

/// Converts a CamelCase identifier to snake_case (`HTTPServer` -> `http_server`).
pub(crate) fn snake_case(identifier: &str) -> String {
    let chars: Vec<char> = identifier.chars().collect();
    let mut out = String::with_capacity(identifier.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
