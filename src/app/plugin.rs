use super::Application;
use async_trait::async_trait;

/// An extension that takes part in the application lifecycle.
///
/// Hooks run in registration order on start and in reverse order on stop.
/// `will_start` is the place to register definitions: the context has not
/// been started yet.
///
/// # Example
///
/// ```rust,ignore
/// struct Database;
///
/// #[async_trait]
/// impl Plugin for Database {
///     fn name(&self) -> &str {
///         "database"
///     }
///
///     async fn will_start(&self, app: &Application) -> anyhow::Result<()> {
///         app.context().register_component::<Pool>()?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn will_start(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once the context is started
    async fn start(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }

    async fn did_start(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }

    async fn will_stop(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the context is stopped
    async fn did_stop(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }
}
