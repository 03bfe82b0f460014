//! Object definitions and the machinery that resolves them.
//!
//! A [`Class`] describes how to build and drive one Rust type; an
//! [`ObjectDefinition`] binds a class to a name, constructor arguments,
//! properties and lifecycle methods inside a [`crate::Context`].

mod class;
mod context_definition;
mod definition;
mod param;
mod resolve;
mod singleton;
mod wired;

pub use class::{AutowireDeclaration, Class, ClassBuilder, Component, Markers};
pub use context_definition::CONTEXT_DEFINITION_NAME;
pub(crate) use context_definition::ContextDefinition;
pub use definition::{ObjectDefinition, PostLoad, Trace};
pub(crate) use definition::settle_all;
pub use param::{Args, Instance, ParamDefinition, Resolved, downcast, downcast_dyn};
pub use singleton::SingletonDefinition;
pub use wired::{Assign, Setting, Wired, WiredAll, WiredDyn};
