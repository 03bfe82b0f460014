use super::Context;
use crate::config::{ConfigAdapter, ConfigService};
use crate::di::ContextDefinition;
use crate::inspector::{ObjectDefinitionInspector, default_inspectors};
use crate::lifecycle::StateMachine;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A fluent builder for [`Context`].
///
/// A child context reads configuration from its parent unless an adapter is
/// given explicitly.
pub struct ContextBuilder {
    name: String,
    parent: Option<Arc<Context>>,
    config: Option<Arc<dyn ConfigAdapter>>,
    shutdown_grace: Option<Duration>,
    inspectors: Option<Vec<Arc<dyn ObjectDefinitionInspector>>>,
}

impl ContextBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            config: None,
            shutdown_grace: None,
            inspectors: None,
        }
    }

    pub fn parent(mut self, parent: Arc<Context>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn config(mut self, config: impl ConfigAdapter + 'static) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn config_adapter(mut self, config: Arc<dyn ConfigAdapter>) -> Self {
        self.config = Some(config);
        self
    }

    /// Delay between the stop request and stopping the objects
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Start with no inspectors instead of the default set
    pub fn without_default_inspectors(mut self) -> Self {
        self.inspectors = Some(Vec::new());
        self
    }

    pub(crate) fn inspectors(mut self, inspectors: Vec<Arc<dyn ObjectDefinitionInspector>>) -> Self {
        self.inspectors = Some(inspectors);
        self
    }

    pub fn build(self) -> Arc<Context> {
        let config = self
            .config
            .or_else(|| self.parent.as_ref().map(|p| Arc::clone(p.config())))
            .unwrap_or_else(|| Arc::new(ConfigService::new()));

        let context = Arc::new_cyclic(|this| Context {
            machine: StateMachine::new(self.name.clone()),
            this: this.clone(),
            parent: self.parent,
            config,
            shutdown_grace: self.shutdown_grace,
            definitions: RwLock::new(Vec::new()),
            started: DashMap::new(),
            inspectors: RwLock::new(self.inspectors.unwrap_or_else(default_inspectors)),
            groups: RwLock::new(HashMap::new()),
        });

        let definition = Arc::new(ContextDefinition::new(&context));
        context.write_definitions().push(definition);

        tracing::debug!(context = %self.name, "context created");
        context
    }
}
