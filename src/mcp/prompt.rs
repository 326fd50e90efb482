//! Prompt capability and the prompt registry.
//!
//! Prompts mirror tools, with one difference that matters to the server: a
//! prompt fault has no in-result error convention, so it always escapes
//! `handle` after being reported.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BoxError, ServerBuildError};
use crate::mcp::content::{Content, Role};
use crate::mcp::server::ServerContext;
use crate::mcp::tool::default_name;

/// A named template producing a conversation fragment.
pub trait Prompt: Send + Sync {
    /// Unique name of the prompt within a server.
    fn name(&self) -> String {
        default_name::<Self>()
    }

    /// Human-readable description.
    fn description(&self) -> Option<String> {
        None
    }

    /// Declared arguments, in order.
    fn arguments(&self) -> Vec<PromptArgument> {
        Vec::new()
    }

    /// Renders the prompt.
    ///
    /// # Errors
    ///
    /// Any returned error is reported and then propagated out of the server.
    fn get(
        &self,
        arguments: &Map<String, Value>,
        context: &ServerContext,
    ) -> Result<PromptResult, BoxError>;
}

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Argument description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    /// Creates a required argument.
    #[must_use]
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: true,
        }
    }

    /// Creates an optional argument.
    #[must_use]
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: false,
        }
    }
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

impl PromptMessage {
    /// Creates a user text message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// Creates an assistant text message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// The rendered prompt returned by `prompts/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResult {
    /// Description of the rendered prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Messages, in order.
    pub messages: Vec<PromptMessage>,
}

/// A prompt entry in the `prompts/list` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    pub arguments: Vec<PromptArgument>,
}

type PromptFn =
    dyn Fn(&Map<String, Value>, &ServerContext) -> Result<PromptResult, BoxError> + Send + Sync;

/// A prompt built from a closure plus metadata.
pub struct FnPrompt {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    handler: Box<PromptFn>,
}

impl FnPrompt {
    /// Creates a prompt with no declared arguments.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>, &ServerContext) -> Result<PromptResult, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            handler: Box::new(handler),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a declared argument.
    #[must_use]
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }
}

impl Prompt for FnPrompt {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        self.arguments.clone()
    }

    fn get(
        &self,
        arguments: &Map<String, Value>,
        context: &ServerContext,
    ) -> Result<PromptResult, BoxError> {
        (self.handler)(arguments, context)
    }
}

impl fmt::Debug for FnPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPrompt")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Prompts keyed by name, in registration order. Immutable once built.
#[derive(Clone, Default)]
pub struct PromptRegistry {
    prompts: IndexMap<String, Arc<dyn Prompt>>,
}

impl PromptRegistry {
    /// Builds a registry, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`ServerBuildError::DuplicatePrompt`] if two prompts share a name.
    pub fn new(prompts: Vec<Arc<dyn Prompt>>) -> Result<Self, ServerBuildError> {
        let mut map = IndexMap::with_capacity(prompts.len());
        for prompt in prompts {
            let name = prompt.name();
            if map.contains_key(&name) {
                return Err(ServerBuildError::DuplicatePrompt(name));
            }
            map.insert(name, prompt);
        }
        Ok(Self { prompts: map })
    }

    /// Looks up a prompt by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Prompt>> {
        self.prompts.get(name)
    }

    /// Number of registered prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Returns `true` if no prompts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Returns the `prompts/list` entries in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<PromptDefinition> {
        self.prompts
            .iter()
            .map(|(name, prompt)| PromptDefinition {
                name: name.clone(),
                description: prompt.description(),
                arguments: prompt.arguments(),
            })
            .collect()
    }
}

impl fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.prompts.keys()).finish()
    }
}

/// Returns the required arguments of `prompt` that `arguments` lacks.
#[must_use]
pub fn missing_required_arguments(
    prompt: &dyn Prompt,
    arguments: &Map<String, Value>,
) -> Vec<String> {
    prompt
        .arguments()
        .into_iter()
        .filter(|arg| arg.required && !arguments.contains_key(&arg.name))
        .map(|arg| arg.name)
        .collect()
}
