//! The lifecycle contract shared by contexts, object definitions and applications.

use super::{LifecycleState, StateMachine};
use crate::error::Result;
use async_trait::async_trait;

/// An object that is started once and stopped once.
///
/// Implementors provide the state machine and the `do_start`/`do_stop`
/// hooks; `lc_start`/`lc_stop` drive the transitions around them.
///
/// # Example
///
/// ```rust,ignore
/// use trellis::lifecycle::{Lifecycle, StateMachine};
/// use async_trait::async_trait;
///
/// struct Pool {
///     machine: StateMachine,
/// }
///
/// #[async_trait]
/// impl Lifecycle for Pool {
///     fn state_machine(&self) -> &StateMachine {
///         &self.machine
///     }
///
///     async fn do_start(&self) -> trellis::Result<()> {
///         tracing::info!("Opening connections");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn state_machine(&self) -> &StateMachine;

    fn name(&self) -> &str {
        self.state_machine().name()
    }

    fn status(&self) -> LifecycleState {
        self.state_machine().status()
    }

    /// Called between STARTING and STARTED
    async fn do_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called between STOPPING and STOPPED
    async fn do_stop(&self) -> Result<()> {
        Ok(())
    }

    async fn lc_start(&self) -> Result<()> {
        self.state_machine().start_with(self.do_start()).await
    }

    async fn lc_stop(&self) -> Result<()> {
        self.state_machine().stop_with(self.do_stop()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        machine: StateMachine,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Lifecycle for Counter {
        fn state_machine(&self) -> &StateMachine {
            &self.machine
        }

        async fn do_start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn do_stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_once() {
        let counter = Counter {
            machine: StateMachine::new("counter"),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        };

        counter.lc_start().await.unwrap();
        assert!(counter.lc_start().await.is_err());
        counter.lc_stop().await.unwrap();
        counter.lc_stop().await.unwrap();

        assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
        assert_eq!(counter.status(), LifecycleState::Stopped);
        assert_eq!(counter.name(), "counter");
    }
}
