//! The object definition contract and the state every definition shares.

use super::class::Class;
use super::param::Instance;
use super::singleton::SingletonDefinition;
use crate::context::Context;
use crate::error::{IocError, Result};
use crate::lifecycle::{Lifecycle, LifecycleState, StateMachine};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

/// Names of the definitions currently being resolved, outermost first
pub type Trace = Vec<String>;

/// Definitions handed out below STARTED during one top-level resolution.
///
/// They are driven to STARTED once the resolution that deferred them returns,
/// keeping the trace they were first requested through.
#[derive(Default)]
pub struct PostLoad {
    pending: Mutex<Vec<(Arc<dyn ObjectDefinition>, Trace)>>,
}

impl PostLoad {
    pub(crate) fn add(&self, definition: Arc<dyn ObjectDefinition>, trace: Trace) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.iter().any(|(d, _)| Arc::ptr_eq(d, &definition)) {
            pending.push((definition, trace));
        }
    }

    fn drain(&self) -> Vec<(Arc<dyn ObjectDefinition>, Trace)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Describes how one named object is produced, wired, started and stopped
#[async_trait]
pub trait ObjectDefinition: Lifecycle + Any {
    fn as_any(&self) -> &dyn Any;

    fn class(&self) -> &Class;

    fn is_lazy(&self) -> bool;

    /// The flag set through [`ObjectDefinition::with_lazy_loading`], if any
    fn lazy_loading(&self) -> Option<bool>;

    /// Only allowed while NOT_STARTED
    fn with_lazy_loading(&self, lazy: bool) -> Result<()>;

    fn is_autowire_candidate(&self) -> bool;

    /// Only allowed while NOT_STARTED
    fn set_autowire_candidate(&self, candidate: bool) -> Result<()>;

    fn context(&self) -> Result<Arc<Context>>;

    /// Bind the definition to the context it is registered in
    fn attach(&self, context: &Arc<Context>) -> Result<()>;

    /// The produced object, once instantiated
    fn instance(&self) -> Option<Instance>;

    /// A fresh, unattached definition with the same wiring
    fn copy(&self) -> Arc<dyn ObjectDefinition>;

    /// Definitions the container registers for itself
    fn is_internal(&self) -> bool {
        false
    }

    /// Definitions that must be instantiated before this one can be constructed
    fn constructor_dependencies(&self) -> Vec<Arc<dyn ObjectDefinition>> {
        Vec::new()
    }

    /// Resolve to at least `min`, recording the chain in `trace`
    #[doc(hidden)]
    async fn get_instance_at(
        &self,
        min: LifecycleState,
        trace: Trace,
        post_load: &PostLoad,
    ) -> Result<Instance>;

    /// Resolve to a started object, then start everything deferred on the way
    async fn get_instance(&self) -> Result<Instance> {
        self.get_started_instance(vec![self.name().to_string()])
            .await
    }

    /// [`ObjectDefinition::get_instance`] reached through `trace`
    #[doc(hidden)]
    async fn get_started_instance(&self, trace: Trace) -> Result<Instance> {
        let post_load = PostLoad::default();
        let instance = self
            .get_instance_at(LifecycleState::Started, trace, &post_load)
            .await?;

        let deferred = post_load.drain();
        if !deferred.is_empty() {
            tracing::debug!(
                parent: self.state_machine().span(),
                count = deferred.len(),
                "starting deferred definitions"
            );
            settle_all(
                deferred
                    .iter()
                    .map(|(definition, trace)| definition.get_started_instance(trace.clone())),
            )
            .await?;
        }
        Ok(instance)
    }
}

/// Run every future to completion, then report the first error in order.
///
/// Siblings of a failing resolution are never dropped half way.
pub(crate) async fn settle_all<T, F>(futures: impl IntoIterator<Item = F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>>,
{
    join_all(futures).await.into_iter().collect()
}

impl dyn ObjectDefinition {
    pub fn as_singleton(&self) -> Option<&SingletonDefinition> {
        self.as_any().downcast_ref()
    }
}

impl std::fmt::Debug for dyn ObjectDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDefinition")
            .field("name", &self.name())
            .field("class", &self.class().name())
            .field("status", &self.status())
            .finish()
    }
}

/// State common to every definition implementation
pub(crate) struct DefinitionCore {
    pub(crate) machine: StateMachine,
    pub(crate) class: Class,
    lazy: Mutex<Option<bool>>,
    autowire_candidate: AtomicBool,
    context: OnceLock<Weak<Context>>,
    instance: OnceLock<Instance>,
}

impl DefinitionCore {
    pub(crate) fn new(name: impl Into<String>, class: Class) -> Self {
        Self {
            machine: StateMachine::new(name),
            class,
            lazy: Mutex::new(None),
            autowire_candidate: AtomicBool::new(true),
            context: OnceLock::new(),
            instance: OnceLock::new(),
        }
    }

    pub(crate) fn ensure_not_started(&self, action: &str) -> Result<()> {
        let status = self.machine.status();
        if status != LifecycleState::NotStarted {
            return Err(IocError::illegal_state(format!(
                "cannot {action} on {} while it is {status}",
                self.machine.name()
            )));
        }
        Ok(())
    }

    /// Lazy unless told otherwise
    pub(crate) fn is_lazy(&self) -> bool {
        self.lazy_loading().unwrap_or(true)
    }

    pub(crate) fn lazy_loading(&self) -> Option<bool> {
        *self.lazy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_lazy(&self, lazy: bool) -> Result<()> {
        self.ensure_not_started("change lazy loading")?;
        *self.lazy.lock().unwrap_or_else(PoisonError::into_inner) = Some(lazy);
        Ok(())
    }

    pub(crate) fn is_autowire_candidate(&self) -> bool {
        self.autowire_candidate.load(Ordering::Acquire)
    }

    pub(crate) fn set_autowire_candidate(&self, candidate: bool) -> Result<()> {
        self.ensure_not_started("change autowire candidacy")?;
        self.autowire_candidate.store(candidate, Ordering::Release);
        Ok(())
    }

    pub(crate) fn context(&self) -> Result<Arc<Context>> {
        self.context
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| IocError::NoContext {
                name: self.machine.name().to_string(),
            })
    }

    pub(crate) fn attach(&self, context: &Arc<Context>) -> Result<()> {
        let weak = Arc::downgrade(context);
        match self.context.get() {
            Some(existing) if Weak::ptr_eq(existing, &weak) => Ok(()),
            Some(_) => Err(IocError::illegal_state(format!(
                "{} is already attached to another context",
                self.machine.name()
            ))),
            None => {
                let _ = self.context.set(weak);
                Ok(())
            }
        }
    }

    pub(crate) fn instance(&self) -> Option<Instance> {
        self.instance.get().cloned()
    }

    pub(crate) fn set_instance(&self, instance: Instance) -> Result<()> {
        self.instance.set(instance).map_err(|_| {
            IocError::illegal_state(format!("{} was instantiated twice", self.machine.name()))
        })
    }

    /// Copy the flags, not the state
    pub(crate) fn copy_flags_to(&self, other: &DefinitionCore) {
        *other.lazy.lock().unwrap_or_else(PoisonError::into_inner) = self.lazy_loading();
        other
            .autowire_candidate
            .store(self.is_autowire_candidate(), Ordering::Release);
    }
}
