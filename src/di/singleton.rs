//! The singleton object definition.
//!
//! Resolution walks the states in order, each phase claimed by exactly one
//! caller through a state transition:
//!
//! 1. `INSTANTIATING`: constructor arguments are resolved concurrently and
//!    the factory runs. Other callers wait for `INSTANTIATED`.
//! 2. `SETTING_PROPERTIES`: properties are resolved and assigned, then the
//!    start method runs. Other callers wait for `STARTED`.
//!
//! Dependencies that are not started yet, or that are already on the current
//! trace, are handed out as soon as they are instantiated and started by the
//! post-load sweep of the top-level request. Only constructor cycles are
//! unresolvable; they are detected before anything is built.
//!
//! A caller dropped while holding a phase fails the definition, so nobody
//! waits on it forever.

use super::class::Class;
use super::definition::{DefinitionCore, ObjectDefinition, PostLoad, Trace, settle_all};
use super::param::{Args, Instance, ParamDefinition, Resolved};
use super::resolve::{resolve, resolve_all};
use crate::context::Context;
use crate::error::{IocError, Phase, Result, format_trace};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleState, StateMachine};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Default)]
struct Wiring {
    constructor_args: Vec<ParamDefinition>,
    properties: Vec<(String, ParamDefinition)>,
    start_function: Option<String>,
    stop_function: Option<String>,
}

pub struct SingletonDefinition {
    core: DefinitionCore,
    wiring: Mutex<Wiring>,
}

impl SingletonDefinition {
    pub fn new(name: impl Into<String>, class: Class) -> Self {
        Self {
            core: DefinitionCore::new(name, class),
            wiring: Mutex::new(Wiring::default()),
        }
    }

    /// A definition named after its class
    pub fn of(class: Class) -> Self {
        Self::new(class.name().to_string(), class)
    }

    fn wiring(&self) -> MutexGuard<'_, Wiring> {
        self.wiring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, action: &str, change: impl FnOnce(&mut Wiring)) -> Result<&Self> {
        self.core.ensure_not_started(action)?;
        change(&mut self.wiring());
        Ok(self)
    }

    pub fn constructor_param(&self, param: ParamDefinition) -> Result<&Self> {
        self.mutate("add constructor arguments", |w| w.constructor_args.push(param))
    }

    pub fn constructor_param_by_value(&self, value: impl Into<Resolved>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::Value(value.into()))
    }

    pub fn constructor_param_by_ref(&self, name: impl Into<String>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::Reference(name.into()))
    }

    pub fn constructor_param_by_type(&self, type_name: impl Into<String>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::Type(type_name.into()))
    }

    pub fn constructor_param_by_type_array(&self, type_name: impl Into<String>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::TypeArray(type_name.into()))
    }

    pub fn constructor_param_by_config(&self, key: impl Into<String>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::Config(key.into()))
    }

    pub fn constructor_param_by_group(&self, group: impl Into<String>) -> Result<&Self> {
        self.constructor_param(ParamDefinition::Group(group.into()))
    }

    /// Set or replace how `name` is injected after construction
    pub fn set_property(&self, name: &str, param: ParamDefinition) -> Result<&Self> {
        if !self.core.class.has_property(name) {
            return Err(IocError::UnknownProperty {
                class: self.core.class.name().to_string(),
                property: name.to_string(),
            });
        }
        self.mutate("set properties", |w| {
            match w.properties.iter_mut().find(|(property, _)| property == name) {
                Some((_, existing)) => *existing = param,
                None => w.properties.push((name.to_string(), param)),
            }
        })
    }

    pub fn set_property_by_value(&self, name: &str, value: impl Into<Resolved>) -> Result<&Self> {
        self.set_property(name, ParamDefinition::Value(value.into()))
    }

    pub fn set_property_by_ref(&self, name: &str, reference: impl Into<String>) -> Result<&Self> {
        self.set_property(name, ParamDefinition::Reference(reference.into()))
    }

    pub fn set_property_by_type(&self, name: &str, type_name: impl Into<String>) -> Result<&Self> {
        self.set_property(name, ParamDefinition::Type(type_name.into()))
    }

    pub fn set_property_by_type_array(
        &self,
        name: &str,
        type_name: impl Into<String>,
    ) -> Result<&Self> {
        self.set_property(name, ParamDefinition::TypeArray(type_name.into()))
    }

    pub fn set_property_by_config(&self, name: &str, key: impl Into<String>) -> Result<&Self> {
        self.set_property(name, ParamDefinition::Config(key.into()))
    }

    pub fn set_property_by_group(&self, name: &str, group: impl Into<String>) -> Result<&Self> {
        self.set_property(name, ParamDefinition::Group(group.into()))
    }

    pub fn start_function(&self, method: &str) -> Result<&Self> {
        self.ensure_method(method)?;
        self.mutate("set the start function", |w| {
            w.start_function = Some(method.to_string())
        })
    }

    pub fn stop_function(&self, method: &str) -> Result<&Self> {
        self.ensure_method(method)?;
        self.mutate("set the stop function", |w| {
            w.stop_function = Some(method.to_string())
        })
    }

    fn ensure_method(&self, method: &str) -> Result<()> {
        if self.core.class.has_method(method) {
            Ok(())
        } else {
            Err(IocError::UnknownMethod {
                class: self.core.class.name().to_string(),
                method: method.to_string(),
            })
        }
    }

    pub fn constructor_args(&self) -> Vec<ParamDefinition> {
        self.wiring().constructor_args.clone()
    }

    pub fn properties(&self) -> Vec<(String, ParamDefinition)> {
        self.wiring().properties.clone()
    }

    pub fn start_function_name(&self) -> Option<String> {
        self.wiring().start_function.clone()
    }

    pub fn stop_function_name(&self) -> Option<String> {
        self.wiring().stop_function.clone()
    }

    fn instance_or_err(&self) -> Result<Instance> {
        self.core.instance().ok_or_else(|| {
            IocError::illegal_state(format!("{} has no instance", self.name()))
        })
    }

    fn is_self(&self, other: &Arc<dyn ObjectDefinition>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(other), self as *const Self)
    }

    /// Fail if this definition can reach itself through constructor arguments
    fn check_constructor_cycle(&self) -> Result<()> {
        let mut path = vec![self.name().to_string()];
        let mut visited = HashSet::new();
        for dependency in self.constructor_dependencies() {
            if self.reaches_self(&dependency, &mut path, &mut visited) {
                return Err(IocError::CircularDependency {
                    name: self.name().to_string(),
                    trace: format_trace(&path),
                });
            }
        }
        Ok(())
    }

    fn reaches_self(
        &self,
        node: &Arc<dyn ObjectDefinition>,
        path: &mut Vec<String>,
        visited: &mut HashSet<*const ()>,
    ) -> bool {
        path.push(node.name().to_string());
        if self.is_self(node) {
            return true;
        }
        if node.status() < LifecycleState::Instantiated
            && visited.insert(Arc::as_ptr(node) as *const ())
        {
            for dependency in node.constructor_dependencies() {
                if self.reaches_self(&dependency, path, visited) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    async fn instantiate(
        &self,
        context: &Context,
        trace: &[String],
        post_load: &PostLoad,
    ) -> Result<()> {
        let params = self.constructor_args();
        let values = resolve_all(context, self.name(), &params, trace, post_load).await?;
        let instance = self
            .core
            .class
            .construct(Args::new(self.name(), values))
            .map_err(|source| IocError::Phase {
                name: self.name().to_string(),
                phase: Phase::Construct,
                trace: format_trace(trace),
                source,
            })?;
        self.core.set_instance(instance)?;
        self.core.machine.set_status(LifecycleState::Instantiated)?;
        tracing::debug!(parent: self.core.machine.span(), "instantiated");
        Ok(())
    }

    async fn wire_and_start(
        &self,
        context: &Context,
        trace: &[String],
        post_load: &PostLoad,
    ) -> Result<()> {
        let properties = self.properties();
        let values = settle_all(
            properties
                .iter()
                .map(|(_, param)| resolve(context, self.name(), param, trace, post_load)),
        )
        .await?;

        let instance = self.instance_or_err()?;
        for ((property, _), value) in properties.iter().zip(values) {
            self.core
                .class
                .assign(&instance, property, value)
                .map_err(|source| IocError::Phase {
                    name: self.name().to_string(),
                    phase: Phase::SetProperty,
                    trace: format_trace(trace),
                    source,
                })?;
        }
        self.core.machine.set_status(LifecycleState::PropertiesSet)?;

        let method = self.start_function_name();
        self.core
            .machine
            .start_with(self.invoke(method, Phase::Start, trace))
            .await?;
        context.mark_started(self.name());
        Ok(())
    }

    async fn invoke(&self, method: Option<String>, phase: Phase, trace: &[String]) -> Result<()> {
        let (Some(method), Some(instance)) = (method, self.core.instance()) else {
            return Ok(());
        };
        let call = self
            .core
            .class
            .method(&method)
            .ok_or_else(|| IocError::UnknownMethod {
                class: self.core.class.name().to_string(),
                method: method.clone(),
            })?;
        call(instance).await.map_err(|source| IocError::Phase {
            name: self.name().to_string(),
            phase,
            trace: format_trace(trace),
            source,
        })
    }
}

#[async_trait]
impl Lifecycle for SingletonDefinition {
    fn state_machine(&self) -> &StateMachine {
        &self.core.machine
    }

    async fn do_start(&self) -> Result<()> {
        let method = self.start_function_name();
        self.invoke(method, Phase::Start, &[self.name().to_string()])
            .await
    }

    async fn do_stop(&self) -> Result<()> {
        let method = self.stop_function_name();
        self.invoke(method, Phase::Stop, &[self.name().to_string()])
            .await
    }
}

#[async_trait]
impl ObjectDefinition for SingletonDefinition {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn class(&self) -> &Class {
        &self.core.class
    }

    fn is_lazy(&self) -> bool {
        self.core.is_lazy()
    }

    fn lazy_loading(&self) -> Option<bool> {
        self.core.lazy_loading()
    }

    fn with_lazy_loading(&self, lazy: bool) -> Result<()> {
        self.core.set_lazy(lazy)
    }

    fn is_autowire_candidate(&self) -> bool {
        self.core.is_autowire_candidate()
    }

    fn set_autowire_candidate(&self, candidate: bool) -> Result<()> {
        self.core.set_autowire_candidate(candidate)
    }

    fn context(&self) -> Result<Arc<Context>> {
        self.core.context()
    }

    fn attach(&self, context: &Arc<Context>) -> Result<()> {
        self.core.attach(context)
    }

    fn instance(&self) -> Option<Instance> {
        self.core.instance()
    }

    fn copy(&self) -> Arc<dyn ObjectDefinition> {
        let copy = SingletonDefinition::new(self.name(), self.core.class.clone());
        *copy.wiring() = self.wiring().clone();
        self.core.copy_flags_to(&copy.core);
        Arc::new(copy)
    }

    fn constructor_dependencies(&self) -> Vec<Arc<dyn ObjectDefinition>> {
        let Ok(context) = self.core.context() else {
            return Vec::new();
        };
        self.constructor_args()
            .iter()
            .flat_map(|param| match param {
                ParamDefinition::Reference(name) => context.find_definition(name).into_iter().collect(),
                ParamDefinition::Type(type_name) | ParamDefinition::TypeArray(type_name) => context
                    .get_definitions_by_type(type_name, false)
                    .unwrap_or_default(),
                ParamDefinition::Group(group) => {
                    context.get_definitions_by_group(group).unwrap_or_default()
                }
                ParamDefinition::Value(_) | ParamDefinition::Config(_) => Vec::new(),
            })
            .collect()
    }

    async fn get_instance_at(
        &self,
        min: LifecycleState,
        trace: Trace,
        post_load: &PostLoad,
    ) -> Result<Instance> {
        let machine = &self.core.machine;
        let name = self.name();

        if machine.status() >= LifecycleState::Stopping {
            return Err(IocError::Stopping {
                name: name.to_string(),
            });
        }
        if let Some(reason) = machine.failure() {
            return Err(LifecycleError::aborted(name, min, reason).into());
        }
        if machine.status() >= min {
            return self.instance_or_err();
        }

        let context = self.core.context()?;

        if machine.status() < LifecycleState::Instantiating {
            self.check_constructor_cycle()?;
        }
        if let Some(claim) = machine.claim(LifecycleState::Instantiating) {
            if let Err(e) = self.instantiate(&context, &trace, post_load).await {
                claim.fail(e.to_string());
                return Err(e);
            }
            claim.release();
        } else if machine.status() < LifecycleState::Instantiated {
            if trace[..trace.len().saturating_sub(1)].iter().any(|n| n == name) {
                return Err(IocError::CircularDependency {
                    name: name.to_string(),
                    trace: format_trace(&trace),
                });
            }
            machine.wait_for(LifecycleState::Instantiated).await?;
        }

        if min <= LifecycleState::Instantiated {
            return self.instance_or_err();
        }

        if let Some(claim) = machine.claim(LifecycleState::SettingProperties) {
            if let Err(e) = self.wire_and_start(&context, &trace, post_load).await {
                // A failed start has already been recorded by the state machine
                claim.fail(machine.failure().unwrap_or_else(|| e.to_string()));
                return Err(e);
            }
            claim.release();
        } else {
            machine.wait_for(LifecycleState::Started).await?;
            if machine.status() >= LifecycleState::Stopping {
                return Err(IocError::Stopping {
                    name: name.to_string(),
                });
            }
        }

        self.instance_or_err()
    }
}

impl std::fmt::Debug for SingletonDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonDefinition")
            .field("name", &self.name())
            .field("class", &self.core.class.name())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Wired;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Leaf {
        label: String,
    }

    fn leaf_class() -> Class {
        Class::builder(|args| {
            Ok(Leaf {
                label: args.value(0)?,
            })
        })
        .build()
    }

    #[derive(Default)]
    struct Node {
        peer: Wired<Node>,
        starts: AtomicUsize,
    }

    fn node_class() -> Class {
        Class::builder(|_| Ok(Node::default()))
            .wire("peer", |this: &Node| &this.peer)
            .method("start", |this: Arc<Node>| async move {
                this.starts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_wiring_rejected_after_start() {
        let definition = SingletonDefinition::new("leaf", leaf_class());
        definition.constructor_param_by_value("a").unwrap();
        definition
            .state_machine()
            .set_status(LifecycleState::Started)
            .unwrap();

        assert!(definition.constructor_param_by_value("b").is_err());
        assert!(definition.with_lazy_loading(true).is_err());
        assert_eq!(definition.constructor_args().len(), 1);
    }

    #[test]
    fn test_unknown_members_are_rejected() {
        let definition = SingletonDefinition::new("node", node_class());
        assert!(matches!(
            definition.set_property_by_value("nope", 1),
            Err(IocError::UnknownProperty { .. })
        ));
        assert!(matches!(
            definition.start_function("launch"),
            Err(IocError::UnknownMethod { .. })
        ));
        definition.start_function("start").unwrap();
        assert_eq!(definition.start_function_name().as_deref(), Some("start"));
    }

    #[test]
    fn test_property_replaced_not_duplicated() {
        let definition = SingletonDefinition::new("node", node_class());
        definition.set_property_by_ref("peer", "a").unwrap();
        definition.set_property_by_ref("peer", "b").unwrap();
        let properties = definition.properties();
        assert_eq!(properties.len(), 1);
        assert!(matches!(&properties[0].1, ParamDefinition::Reference(n) if n == "b"));
    }

    #[test]
    fn test_copy_is_detached() {
        let definition = SingletonDefinition::new("leaf", leaf_class());
        definition.constructor_param_by_value("a").unwrap();
        definition.with_lazy_loading(false).unwrap();

        let copy = definition.copy();
        assert_eq!(copy.name(), "leaf");
        assert!(!copy.is_lazy());
        assert_eq!(copy.status(), LifecycleState::NotStarted);
        assert!(matches!(copy.context(), Err(IocError::NoContext { .. })));
        assert_eq!(copy.as_singleton().unwrap().constructor_args().len(), 1);
    }

    #[tokio::test]
    async fn test_requires_context() {
        let definition: Arc<dyn ObjectDefinition> =
            Arc::new(SingletonDefinition::new("leaf", leaf_class()));
        let err = definition.get_instance().await.unwrap_err();
        assert!(matches!(err, IocError::NoContext { .. }));
        assert_eq!(definition.status(), LifecycleState::NotStarted);
    }

    #[tokio::test]
    async fn test_resolves_within_context() {
        let context = Context::new("test");
        let definition = Arc::new(SingletonDefinition::new("leaf", leaf_class()));
        definition.constructor_param_by_value("hello").unwrap();
        context
            .register_definition(definition.clone(), false)
            .unwrap();

        let instance = definition.get_instance().await.unwrap();
        let leaf = instance.downcast::<Leaf>().unwrap();
        assert_eq!(leaf.label, "hello");
        assert_eq!(definition.status(), LifecycleState::Started);

        let again = definition.get_instance().await.unwrap();
        assert!(Arc::ptr_eq(&again.downcast::<Leaf>().unwrap(), &leaf));
    }

    #[tokio::test]
    async fn test_construct_failure_is_recorded() {
        let context = Context::new("test");
        let definition = Arc::new(SingletonDefinition::new("leaf", leaf_class()));
        context
            .register_definition(definition.clone(), false)
            .unwrap();

        let err = definition.get_instance().await.unwrap_err();
        assert!(matches!(
            err,
            IocError::Phase {
                phase: Phase::Construct,
                ..
            }
        ));
        assert!(definition.get_instance().await.is_err());
    }
}
