//! Instrumentation events emitted once per handled request.
//!
//! The optional name fields are populated only once a matching tool or prompt
//! was found, so metrics keyed on them never see arbitrary client input.

use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

/// Error tag attached to an instrumentation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventError {
    /// The request named a method the server does not support.
    MethodNotFound,
    /// `tools/call` named a tool that is not registered.
    ToolNotFound,
    /// `prompts/get` named a prompt that is not registered.
    PromptNotFound,
    /// The request parameters were rejected.
    InvalidParams,
    /// A handler raised a fault.
    InternalError,
}

impl EventError {
    /// Returns the tag as it appears in the serialised event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MethodNotFound => "method_not_found",
            Self::ToolNotFound => "tool_not_found",
            Self::PromptNotFound => "prompt_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
        }
    }
}

/// A completed instrumentation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentationEvent {
    /// The JSON-RPC method that was handled.
    pub method: String,
    /// Name of the tool that ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Name of the prompt that ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_name: Option<String>,
    /// URI of the resource that was read. Reserved: the engine serves no
    /// resource methods, so this is never set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,
    /// Error tag, if the request did not complete normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
    /// Wall-clock time spent handling the request, serialised in seconds.
    #[serde(serialize_with = "serialize_seconds")]
    pub duration: Duration,
}

fn serialize_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// An event under construction while its request is being handled.
#[derive(Debug)]
pub struct PendingEvent {
    started: Instant,
    event: InstrumentationEvent,
}

impl PendingEvent {
    /// Starts timing a request for `method`.
    #[must_use]
    pub fn start(method: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            event: InstrumentationEvent {
                method: method.into(),
                tool_name: None,
                prompt_name: None,
                resource_uri: None,
                error: None,
                duration: Duration::ZERO,
            },
        }
    }

    /// Records the tool that was matched.
    pub fn set_tool_name(&mut self, name: impl Into<String>) {
        self.event.tool_name = Some(name.into());
    }

    /// Records the prompt that was matched.
    pub fn set_prompt_name(&mut self, name: impl Into<String>) {
        self.event.prompt_name = Some(name.into());
    }

    /// Tags the event with an error.
    pub fn set_error(&mut self, error: EventError) {
        self.event.error = Some(error);
    }

    /// Stops the timer and returns the finished event.
    #[must_use]
    pub fn finish(mut self) -> InstrumentationEvent {
        self.event.duration = self.started.elapsed();
        self.event
    }
}
