use super::class::Class;
use super::definition::{DefinitionCore, ObjectDefinition, PostLoad, Trace};
use super::param::Instance;
use crate::context::Context;
use crate::error::{IocError, Result};
use crate::lifecycle::{Lifecycle, LifecycleState, StateMachine};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Name under which every context registers itself
pub const CONTEXT_DEFINITION_NAME: &str = "context";

/// Exposes the owning context as an injectable object
pub(crate) struct ContextDefinition {
    core: DefinitionCore,
}

impl ContextDefinition {
    fn detached() -> Self {
        let class = Class::builder::<Context, _>(|_| {
            Err(anyhow::anyhow!("contexts are not built by the container"))
        })
        .named("Context")
        .build();
        let core = DefinitionCore::new(CONTEXT_DEFINITION_NAME, class);
        // Nothing to construct or start; the context manages its own lifecycle.
        let _ = core.machine.set_status(LifecycleState::Started);
        Self { core }
    }

    pub(crate) fn new(context: &Arc<Context>) -> Self {
        let definition = Self::detached();
        // A fresh definition has no context yet, attaching cannot fail.
        let _ = definition.core.attach(context);
        definition
    }
}

#[async_trait]
impl Lifecycle for ContextDefinition {
    fn state_machine(&self) -> &StateMachine {
        &self.core.machine
    }
}

#[async_trait]
impl ObjectDefinition for ContextDefinition {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn class(&self) -> &Class {
        &self.core.class
    }

    fn is_lazy(&self) -> bool {
        true
    }

    fn lazy_loading(&self) -> Option<bool> {
        Some(true)
    }

    fn with_lazy_loading(&self, _lazy: bool) -> Result<()> {
        Err(IocError::illegal_state("the context definition is always lazy"))
    }

    fn is_autowire_candidate(&self) -> bool {
        true
    }

    fn set_autowire_candidate(&self, _candidate: bool) -> Result<()> {
        Err(IocError::illegal_state(
            "the context definition is always an autowire candidate",
        ))
    }

    fn context(&self) -> Result<Arc<Context>> {
        self.core.context()
    }

    fn attach(&self, context: &Arc<Context>) -> Result<()> {
        self.core.attach(context)
    }

    fn instance(&self) -> Option<Instance> {
        self.core.context().ok().map(|context| context as Instance)
    }

    fn copy(&self) -> Arc<dyn ObjectDefinition> {
        Arc::new(Self::detached())
    }

    fn is_internal(&self) -> bool {
        true
    }

    async fn get_instance_at(
        &self,
        _min: LifecycleState,
        _trace: Trace,
        _post_load: &PostLoad,
    ) -> Result<Instance> {
        let context: Instance = self.core.context()?;
        Ok(context)
    }
}
