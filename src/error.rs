use crate::lifecycle::LifecycleError;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IocError>;

/// Phase of an object's life in which user-supplied code failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Construct,
    SetProperty,
    Start,
    Stop,
}

#[derive(Debug, Error)]
pub enum IocError {
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Object definition with name {name} already registered in {context}")]
    AlreadyRegistered { name: String, context: String },

    #[error("No object definition with name {name} registered in the context {context}")]
    NotFound { name: String, context: String },

    #[error("No object definition of type {type_name} registered in the context {context}")]
    TypeNotFound { type_name: String, context: String },

    #[error("Multiple object definitions of type {type_name} found: {}", candidates.join(", "))]
    AmbiguousType {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency detected while resolving {name}: {trace}")]
    CircularDependency { name: String, trace: String },

    #[error("Class {class} has no method {method}")]
    UnknownMethod { class: String, method: String },

    #[error("Class {class} has no property {property}")]
    UnknownProperty { class: String, property: String },

    #[error("Object definition {name} is stopping, cannot be retrieved")]
    Stopping { name: String },

    #[error("Object definition {name} hasn't been added to a context")]
    NoContext { name: String },

    #[error("Configuration key {key} not found")]
    ConfigNotFound { key: String },

    #[error("Configuration error for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Failed to downcast value to {type_name}")]
    Downcast { type_name: String },

    #[error("Object definition {owner} has no argument at index {index}")]
    MissingArgument { owner: String, index: usize },

    #[error("Unable to resolve {param} for {owner}: {source}")]
    Dependency {
        owner: String,
        param: String,
        #[source]
        source: Box<IocError>,
    },

    #[error("Failed to {phase} {name} (trace: {trace}): {source}")]
    Phase {
        name: String,
        phase: Phase,
        trace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Plugin {plugin} failed in {hook}: {source}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Timeout during {phase} after {millis}ms")]
    Timeout { phase: String, millis: u128 },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl IocError {
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn downcast<T: ?Sized>() -> Self {
        Self::Downcast {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Whether the error already names the object and chain it happened in.
    pub(crate) fn carries_context(&self) -> bool {
        matches!(
            self,
            Self::Dependency { .. }
                | Self::Phase { .. }
                | Self::CircularDependency { .. }
                | Self::Lifecycle(_)
        )
    }
}

pub(crate) fn format_trace(trace: &[String]) -> String {
    trace.join(" -> ")
}
