//! Application Bootstrap
//!
//! Composes plugins around a root [`Context`] and drives both through one
//! lifecycle.

use super::{Plugin, ShutdownHandler, shutdown_signal};
use crate::config::ConfigAdapter;
use crate::context::Context;
use crate::error::{IocError, Result};
use crate::lifecycle::{Lifecycle, StateMachine};
use crate::logging::LoggingBuilder;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
enum Hook {
    WillStart,
    Start,
    DidStart,
    WillStop,
    Stop,
    DidStop,
}

/// A root context plus the plugins that extend it.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::main]
/// async fn main() -> trellis::Result<()> {
///     let app = Application::builder()
///         .name("billing")
///         .config(ConfigService::load("config", "production")?)
///         .plugin(DatabasePlugin::default())
///         .build();
///
///     app.run_until_shutdown().await
/// }
/// ```
pub struct Application {
    machine: StateMachine,
    context: Arc<Context>,
    plugins: Vec<Arc<dyn Plugin>>,
    start_timeout: Option<Duration>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn shutdown_handler(self: &Arc<Self>) -> ShutdownHandler {
        ShutdownHandler::new(Arc::clone(self))
    }

    /// Spawn a task that stops the application on SIGTERM or Ctrl+C
    pub fn spawn_shutdown_handler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let handler = self.shutdown_handler();
        tokio::spawn(async move {
            handler.wait_for_shutdown().await;
        })
    }

    /// Start, wait for `signal`, then stop
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.lc_start().await?;
        signal.await;
        self.lc_stop().await
    }

    /// Start and keep running until SIGTERM or Ctrl+C
    pub async fn run_until_shutdown(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    async fn dispatch(&self, plugin: &dyn Plugin, hook: Hook) -> anyhow::Result<()> {
        match hook {
            Hook::WillStart => plugin.will_start(self).await,
            Hook::Start => plugin.start(self).await,
            Hook::DidStart => plugin.did_start(self).await,
            Hook::WillStop => plugin.will_stop(self).await,
            Hook::Stop => plugin.stop(self).await,
            Hook::DidStop => plugin.did_stop(self).await,
        }
    }

    /// Run `hook` on every plugin in order, stopping at the first failure
    async fn call_start_hooks(&self, hook: Hook) -> Result<()> {
        tracing::info!("Calling {} hooks...", hook);

        for plugin in &self.plugins {
            tracing::debug!(plugin = plugin.name(), "{}", hook);
            self.dispatch(plugin.as_ref(), hook)
                .await
                .map_err(|source| IocError::Plugin {
                    plugin: plugin.name().to_string(),
                    hook: hook.into(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Run `hook` on every plugin in reverse order, logging failures
    async fn call_stop_hooks(&self, hook: Hook) {
        tracing::info!("Calling {} hooks...", hook);

        for plugin in self.plugins.iter().rev() {
            tracing::debug!(plugin = plugin.name(), "{}", hook);
            if let Err(e) = self.dispatch(plugin.as_ref(), hook).await {
                tracing::error!(plugin = plugin.name(), "{} failed: {:#}", hook, e);
            }
        }
    }

    async fn start_context(&self) -> Result<()> {
        match self.start_timeout {
            Some(limit) => tokio::time::timeout(limit, self.context.lc_start())
                .await
                .map_err(|_| IocError::Timeout {
                    phase: format!("start of context {}", self.context.name()),
                    millis: limit.as_millis(),
                })?,
            None => self.context.lc_start().await,
        }
    }
}

#[async_trait]
impl Lifecycle for Application {
    fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    async fn do_start(&self) -> Result<()> {
        tracing::info!(plugins = self.plugins.len(), "Starting application...");

        let outcome = async {
            self.call_start_hooks(Hook::WillStart).await?;
            self.start_context().await?;
            self.call_start_hooks(Hook::Start).await?;
            self.call_start_hooks(Hook::DidStart).await
        }
        .await;

        if let Err(e) = outcome {
            tracing::error!("Application start failed, stopping context: {}", e);
            if let Err(stop_err) = self.context.lc_stop().await {
                tracing::warn!("Error while stopping context: {}", stop_err);
            }
            return Err(e);
        }

        tracing::info!("Application started");
        Ok(())
    }

    async fn do_stop(&self) -> Result<()> {
        tracing::info!("Stopping application...");

        self.call_stop_hooks(Hook::WillStop).await;
        self.call_stop_hooks(Hook::Stop).await;
        if let Err(e) = self.context.lc_stop().await {
            tracing::error!("Error while stopping context: {}", e);
        }
        self.call_stop_hooks(Hook::DidStop).await;

        tracing::info!("Application stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.machine.name())
            .field("status", &self.machine.status())
            .field("plugins", &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    name: String,
    config: Option<Arc<dyn ConfigAdapter>>,
    plugins: Vec<Arc<dyn Plugin>>,
    start_timeout: Option<Duration>,
    shutdown_grace: Option<Duration>,
    logging: Option<LoggingBuilder>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            name: "application".to_string(),
            config: None,
            plugins: Vec::new(),
            start_timeout: None,
            shutdown_grace: None,
            logging: None,
        }
    }

    /// Also names the root context
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: impl ConfigAdapter + 'static) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Bound the context start; exceeding it fails with [`IocError::Timeout`]
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Install a global subscriber when the application is built
    pub fn logging(mut self, logging: LoggingBuilder) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn build(self) -> Arc<Application> {
        if let Some(logging) = self.logging {
            if let Err(e) = logging.init() {
                tracing::warn!("Logging not installed: {}", e);
            }
        }

        let mut context = Context::builder(self.name.clone());
        if let Some(config) = self.config {
            context = context.config_adapter(config);
        }
        if let Some(grace) = self.shutdown_grace {
            context = context.shutdown_grace(grace);
        }

        Arc::new(Application {
            machine: StateMachine::new(self.name),
            context: context.build(),
            plugins: self.plugins,
            start_timeout: self.start_timeout,
        })
    }
}
