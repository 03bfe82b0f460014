//! Application layer: plugins composed around a root context.

mod application;
mod plugin;
mod shutdown;

pub use application::{Application, ApplicationBuilder};
pub use plugin::Plugin;
pub use shutdown::{ShutdownHandler, shutdown_signal};
