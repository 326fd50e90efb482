//! Runtime configuration for a server: fault reporting, instrumentation,
//! argument validation and protocol version pinning.
//!
//! A [`Configuration`] is injected when a server is built. For callers that
//! cannot thread one through, a process-wide default configuration and a
//! process-wide protocol version override are also available; a server reads
//! them once, at construction, and never again.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::mcp::instrumentation::InstrumentationEvent;

/// The protocol version used when nothing overrides it.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Capability invoked with every fault raised by a handler.
pub type ExceptionReporter = Arc<dyn Fn(&(dyn Error + 'static), &ReportContext) + Send + Sync>;

/// Capability invoked with the instrumentation event of every handled request.
pub type InstrumentationCallback = Arc<dyn Fn(&InstrumentationEvent) + Send + Sync>;

/// Validates tool arguments against a tool's input schema.
pub trait ArgumentValidator: Send + Sync {
    /// Returns a human-readable reason if `arguments` do not satisfy `schema`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    fn validate(&self, schema: &Value, arguments: &Map<String, Value>) -> Result<(), String>;
}

impl<F> ArgumentValidator for F
where
    F: Fn(&Value, &Map<String, Value>) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, schema: &Value, arguments: &Map<String, Value>) -> Result<(), String> {
        self(schema, arguments)
    }
}

/// What was being handled when a fault was reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportContext {
    /// A tool handler faulted.
    ToolCall {
        /// The tool that was invoked.
        tool_name: String,
        /// The arguments it was invoked with.
        arguments: Map<String, Value>,
    },
    /// Any other handler faulted.
    Request {
        /// The original request.
        request: Value,
    },
}

impl ReportContext {
    /// Returns the context as a JSON mapping.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Hooks and pins applied to one server.
///
/// Every hook is optional; a missing hook is a no-op.
#[derive(Clone, Default)]
pub struct Configuration {
    exception_reporter: Option<ExceptionReporter>,
    instrumentation_callback: Option<InstrumentationCallback>,
    argument_validator: Option<Arc<dyn ArgumentValidator>>,
    protocol_version: Option<String>,
}

impl Configuration {
    /// Creates a configuration with no hooks installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the exception reporter.
    #[must_use]
    pub fn with_exception_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&(dyn Error + 'static), &ReportContext) + Send + Sync + 'static,
    {
        self.exception_reporter = Some(Arc::new(reporter));
        self
    }

    /// Installs the instrumentation callback.
    #[must_use]
    pub fn with_instrumentation_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&InstrumentationEvent) + Send + Sync + 'static,
    {
        self.instrumentation_callback = Some(Arc::new(callback));
        self
    }

    /// Installs a schema validator consulted before each tool call.
    #[must_use]
    pub fn with_argument_validator<V>(mut self, validator: V) -> Self
    where
        V: ArgumentValidator + 'static,
    {
        self.argument_validator = Some(Arc::new(validator));
        self
    }

    /// Pins the protocol version for servers built with this configuration.
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    /// Returns the pinned protocol version, if any.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Returns a copy of `self` with every hook set in `overrides` replacing ours.
    #[must_use]
    pub fn merge(&self, overrides: &Self) -> Self {
        Self {
            exception_reporter: overrides
                .exception_reporter
                .clone()
                .or_else(|| self.exception_reporter.clone()),
            instrumentation_callback: overrides
                .instrumentation_callback
                .clone()
                .or_else(|| self.instrumentation_callback.clone()),
            argument_validator: overrides
                .argument_validator
                .clone()
                .or_else(|| self.argument_validator.clone()),
            protocol_version: overrides
                .protocol_version
                .clone()
                .or_else(|| self.protocol_version.clone()),
        }
    }

    /// Passes a fault to the exception reporter.
    pub fn report_exception(&self, fault: &(dyn Error + 'static), context: &ReportContext) {
        if let Some(reporter) = &self.exception_reporter {
            reporter(fault, context);
        }
    }

    /// Passes a finished event to the instrumentation callback.
    pub fn instrument(&self, event: &InstrumentationEvent) {
        if let Some(callback) = &self.instrumentation_callback {
            callback(event);
        }
    }

    /// Runs the argument validator, if one is installed.
    ///
    /// # Errors
    ///
    /// Returns the validator's rejection reason.
    pub fn validate_arguments(
        &self,
        schema: &Value,
        arguments: &Map<String, Value>,
    ) -> Result<(), String> {
        self.argument_validator
            .as_ref()
            .map_or(Ok(()), |validator| validator.validate(schema, arguments))
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("exception_reporter", &self.exception_reporter.is_some())
            .field("instrumentation_callback", &self.instrumentation_callback.is_some())
            .field("argument_validator", &self.argument_validator.is_some())
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}

static PROTOCOL_VERSION_OVERRIDE: RwLock<Option<String>> = RwLock::new(None);

static GLOBAL_CONFIGURATION: RwLock<Option<Configuration>> = RwLock::new(None);

/// Overrides the protocol version for servers constructed from now on.
///
/// `None` or an empty string clears the override, restoring
/// [`DEFAULT_PROTOCOL_VERSION`]. Servers that already exist are unaffected.
pub fn set_default_protocol_version(version: Option<&str>) {
    let version = version.filter(|v| !v.is_empty()).map(str::to_string);
    *PROTOCOL_VERSION_OVERRIDE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = version;
}

/// Returns the protocol version a server constructed now would use by default.
#[must_use]
pub fn default_protocol_version() -> String {
    PROTOCOL_VERSION_OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string())
}

/// Installs the configuration used by servers built without one.
///
/// `None` restores the no-op configuration.
pub fn set_global_configuration(configuration: Option<Configuration>) {
    *GLOBAL_CONFIGURATION
        .write()
        .unwrap_or_else(PoisonError::into_inner) = configuration;
}

/// Returns the process-wide default configuration.
#[must_use]
pub fn global_configuration() -> Configuration {
    GLOBAL_CONFIGURATION
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_default()
}
