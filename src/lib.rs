//! # Trellis
//!
//! An asynchronous inversion-of-control container with lifecycle-managed
//! object definitions.
//!
//! ## Features
//!
//! - **Object definitions**: named recipes producing one instance each, wired
//!   by reference, type, type array, group or configuration key
//! - **Lifecycle**: every object moves through instantiate, set properties and
//!   start, exactly once, even under concurrent lookups
//! - **Context tree**: child contexts shadow and fall back to their parent
//! - **Inspectors**: rewrite definitions before a context starts
//! - **Plugins**: compose an application lifecycle around a root context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! #[derive(Component, Default)]
//! #[component(lazy = false, start = "open")]
//! pub struct Repository {
//!     #[autowire = "#db.url"]
//!     url: Setting<String>,
//! }
//!
//! impl Repository {
//!     async fn open(&self) -> anyhow::Result<()> {
//!         tracing::info!(url = ?self.url.get(), "opening");
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Component)]
//! pub struct UserService {
//!     #[autowire = "~Repository"]
//!     repository: Wired<Repository>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> trellis::Result<()> {
//!     let context = Context::builder("app")
//!         .config(ConfigService::from_json_str(r#"{"db": {"url": "mem://"}}"#)?)
//!         .build();
//!     context.register_component::<Repository>()?;
//!     context.register_component::<UserService>()?;
//!
//!     context.lc_start().await?;
//!     let users = context.get::<UserService>("UserService").await?;
//!     context.lc_stop().await
//! }
//! ```

extern crate self as trellis;

pub mod app;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod inspector;
pub mod lifecycle;
pub mod logging;

// Re-export core types
pub use app::{Application, ApplicationBuilder, Plugin};
pub use config::{ConfigAdapter, ConfigService};
pub use context::{Context, ContextBuilder, Singleton};
pub use di::{
    Args, AutowireDeclaration, Class, ClassBuilder, Component, Instance, ObjectDefinition,
    ParamDefinition, Resolved, Setting, SingletonDefinition, Wired, WiredAll, WiredDyn,
};
pub use error::{IocError, Result};
pub use lifecycle::{Lifecycle, LifecycleState};

// Re-export macros
pub use trellis_macro::Component;

// Re-export commonly used types from dependencies
pub use anyhow;
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{Application, ApplicationBuilder, Plugin, ShutdownHandler, shutdown_signal};
    pub use crate::config::{ConfigAdapter, ConfigService};
    pub use crate::context::{Context, ContextBuilder, Singleton};
    pub use crate::di::{
        Args, AutowireDeclaration, Class, Component, ObjectDefinition, ParamDefinition, Resolved,
        Setting, SingletonDefinition, Wired, WiredAll, WiredDyn,
    };
    pub use crate::error::{IocError, Result};
    pub use crate::inspector::{
        InspectorFilter, MatchingInspector, NamePattern, ObjectDefinitionInspector,
    };
    pub use crate::lifecycle::{Lifecycle, LifecycleState};
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use trellis_macro::Component;
}
