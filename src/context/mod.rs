//! Object Container
//!
//! A [`Context`] holds named [`ObjectDefinition`]s, answers lookups by name,
//! type and group, and drives every eager definition through its lifecycle
//! when it starts. Contexts form a tree: lookups fall back to the parent,
//! and starting a child starts its parent first.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::{Class, Context, Lifecycle, SingletonDefinition};
//! use std::sync::Arc;
//!
//! let context = Context::new("app");
//! let repo = Arc::new(SingletonDefinition::new("repo", Repo::class()));
//! repo.constructor_param_by_config("db.url")?;
//! context.register_definition(repo, false)?;
//!
//! context.lc_start().await?;
//! let repo = context.get::<Repo>("repo").await?;
//! ```

mod builder;

pub use builder::ContextBuilder;

use crate::config::ConfigAdapter;
use crate::di::{
    CONTEXT_DEFINITION_NAME, Class, Component, Instance, ObjectDefinition, SingletonDefinition,
    downcast, downcast_dyn, settle_all,
};
use crate::error::{IocError, Result};
use crate::inspector::ObjectDefinitionInspector;
use crate::lifecycle::{Lifecycle, LifecycleState, StateMachine};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

/// Something [`Context::register_singletons`] can turn into a definition
pub enum Singleton {
    Definition(Arc<dyn ObjectDefinition>),
    Class(Class),
}

impl Singleton {
    pub fn of<T: Component>() -> Self {
        Self::Class(T::class())
    }

    fn into_definition(self) -> Arc<dyn ObjectDefinition> {
        match self {
            Self::Definition(definition) => definition,
            Self::Class(class) => Arc::new(SingletonDefinition::of(class)),
        }
    }
}

impl From<Class> for Singleton {
    fn from(class: Class) -> Self {
        Self::Class(class)
    }
}

impl From<Arc<dyn ObjectDefinition>> for Singleton {
    fn from(definition: Arc<dyn ObjectDefinition>) -> Self {
        Self::Definition(definition)
    }
}

impl From<Arc<SingletonDefinition>> for Singleton {
    fn from(definition: Arc<SingletonDefinition>) -> Self {
        Self::Definition(definition)
    }
}

impl From<SingletonDefinition> for Singleton {
    fn from(definition: SingletonDefinition) -> Self {
        Self::Definition(Arc::new(definition))
    }
}

pub struct Context {
    machine: StateMachine,
    this: Weak<Context>,
    parent: Option<Arc<Context>>,
    config: Arc<dyn ConfigAdapter>,
    shutdown_grace: Option<Duration>,
    definitions: RwLock<Vec<Arc<dyn ObjectDefinition>>>,
    started: DashMap<String, Arc<dyn ObjectDefinition>>,
    inspectors: RwLock<Vec<Arc<dyn ObjectDefinitionInspector>>>,
    groups: RwLock<HashMap<String, Vec<String>>>,
}

impl Context {
    /// A root context with the default inspectors and an empty configuration
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> ContextBuilder {
        ContextBuilder::new(name)
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn config(&self) -> &Arc<dyn ConfigAdapter> {
        &self.config
    }

    fn read_definitions(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn ObjectDefinition>>> {
        self.definitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_definitions(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn ObjectDefinition>>> {
        self.definitions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn this(&self) -> Result<Arc<Context>> {
        self.this
            .upgrade()
            .ok_or_else(|| IocError::illegal_state(format!("context {} is gone", self.name())))
    }

    fn ensure_not_started(&self, action: &str) -> Result<()> {
        let status = self.status();
        if status != LifecycleState::NotStarted {
            return Err(IocError::illegal_state(format!(
                "cannot {action} in context {} while it is {status}",
                self.name()
            )));
        }
        Ok(())
    }

    // Registration

    /// Register `definition` under its own name.
    ///
    /// Fails when the name is taken here (unless `overwrite`) or anywhere up
    /// the parent chain.
    pub fn register_definition(
        &self,
        definition: Arc<dyn ObjectDefinition>,
        overwrite: bool,
    ) -> Result<()> {
        self.ensure_not_started("register definitions")?;
        let name = definition.name().to_string();

        if name != CONTEXT_DEFINITION_NAME {
            let mut ancestor = self.parent.as_ref();
            while let Some(parent) = ancestor {
                if parent.read_definitions().iter().any(|d| d.name() == name) {
                    return Err(IocError::AlreadyRegistered {
                        name,
                        context: parent.name().to_string(),
                    });
                }
                ancestor = parent.parent.as_ref();
            }
        }

        let this = self.this()?;
        {
            let mut definitions = self.write_definitions();
            let existing = definitions.iter().position(|d| d.name() == name);
            if existing.is_some() && !overwrite {
                return Err(IocError::AlreadyRegistered {
                    name,
                    context: self.name().to_string(),
                });
            }
            definition.attach(&this)?;
            match existing {
                Some(index) => definitions[index] = Arc::clone(&definition),
                None => definitions.push(Arc::clone(&definition)),
            }
        }

        for group in &definition.class().markers().groups {
            self.add_to_group(group, &name)?;
        }
        tracing::debug!(context = %self.name(), definition = %name, "definition registered");
        Ok(())
    }

    pub fn register_singletons<I>(&self, singletons: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Singleton>,
    {
        for singleton in singletons {
            let singleton: Singleton = singleton.into();
            self.register_definition(singleton.into_definition(), false)?;
        }
        Ok(())
    }

    pub fn register_singletons_in_group<I>(&self, group: &str, singletons: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Singleton>,
    {
        for singleton in singletons {
            let singleton: Singleton = singleton.into();
            let definition = singleton.into_definition();
            let name = definition.name().to_string();
            self.register_definition(definition, false)?;
            self.add_to_group(group, &name)?;
        }
        Ok(())
    }

    /// Register `class` under its simple name and return the definition for further wiring
    pub fn register_class(&self, class: Class) -> Result<Arc<SingletonDefinition>> {
        let definition = Arc::new(SingletonDefinition::of(class));
        self.register_definition(Arc::clone(&definition) as Arc<dyn ObjectDefinition>, false)?;
        Ok(definition)
    }

    pub fn register_component<T: Component>(&self) -> Result<Arc<SingletonDefinition>> {
        self.register_class(T::class())
    }

    pub fn add_to_group(&self, group: &str, name: &str) -> Result<()> {
        self.ensure_not_started("add objects to groups")?;
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let members = groups.entry(group.to_string()).or_default();
        if !members.iter().any(|member| member == name) {
            members.push(name.to_string());
        }
        Ok(())
    }

    pub fn add_object_definition_inspector(
        &self,
        inspector: Arc<dyn ObjectDefinitionInspector>,
    ) -> Result<()> {
        self.ensure_not_started("add inspectors")?;
        self.inspectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inspector);
        Ok(())
    }

    // Definition lookups

    /// The definition named `name` here or in the closest ancestor that has one
    pub fn find_definition(&self, name: &str) -> Option<Arc<dyn ObjectDefinition>> {
        let local = self.read_definitions().iter().find(|d| d.name() == name).cloned();
        local.or_else(|| self.parent.as_ref().and_then(|p| p.find_definition(name)))
    }

    pub fn get_definition_by_name(&self, name: &str) -> Result<Arc<dyn ObjectDefinition>> {
        self.find_definition(name).ok_or_else(|| IocError::NotFound {
            name: name.to_string(),
            context: self.name().to_string(),
        })
    }

    /// Autowire candidates whose class matches `type_name`.
    ///
    /// Ancestors' definitions come first; a local definition replaces an
    /// inherited one with the same name.
    pub fn get_definitions_by_type(
        &self,
        type_name: &str,
        fail_on_missing: bool,
    ) -> Result<Vec<Arc<dyn ObjectDefinition>>> {
        let mut found = match &self.parent {
            Some(parent) => parent.get_definitions_by_type(type_name, false)?,
            None => Vec::new(),
        };

        for definition in self
            .read_definitions()
            .iter()
            .filter(|d| d.is_autowire_candidate() && d.class().matches(type_name))
        {
            match found.iter().position(|f| f.name() == definition.name()) {
                Some(index) => found[index] = Arc::clone(definition),
                None => found.push(Arc::clone(definition)),
            }
        }

        if found.is_empty() && fail_on_missing {
            return Err(IocError::TypeNotFound {
                type_name: type_name.to_string(),
                context: self.name().to_string(),
            });
        }
        Ok(found)
    }

    pub fn get_definition_by_type(&self, type_name: &str) -> Result<Arc<dyn ObjectDefinition>> {
        let mut found = self.get_definitions_by_type(type_name, true)?;
        if found.len() > 1 {
            return Err(IocError::AmbiguousType {
                type_name: type_name.to_string(),
                candidates: found.iter().map(|d| d.name().to_string()).collect(),
            });
        }
        Ok(found.remove(0))
    }

    fn group_members(&self, group: &str) -> Vec<String> {
        let mut members = self
            .parent
            .as_ref()
            .map(|parent| parent.group_members(group))
            .unwrap_or_default();
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        for name in groups.get(group).into_iter().flatten() {
            if !members.contains(name) {
                members.push(name.clone());
            }
        }
        members
    }

    /// Definitions in `group`, ancestors' members first; an unknown group is empty
    pub fn get_definitions_by_group(&self, group: &str) -> Result<Vec<Arc<dyn ObjectDefinition>>> {
        self.group_members(group)
            .iter()
            .map(|name| self.get_definition_by_name(name))
            .collect()
    }

    pub fn definition_names(&self) -> Vec<String> {
        self.read_definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    // Object lookups

    pub async fn get_object_by_name(&self, name: &str) -> Result<Instance> {
        self.get_definition_by_name(name)?.get_instance().await
    }

    /// The single object of `type_name`, cast through the alias when one matches
    pub async fn get_object_by_type(&self, type_name: &str) -> Result<Instance> {
        let definition = self.get_definition_by_type(type_name)?;
        let instance = definition.get_instance().await?;
        Ok(definition.class().cast(type_name, instance))
    }

    /// Every object of `type_name`, ordered by the class sort key
    pub async fn get_objects_by_type(&self, type_name: &str) -> Result<Vec<Instance>> {
        let definitions = self.get_definitions_by_type(type_name, false)?;
        let instances = settle_all(definitions.iter().map(|d| d.get_instance())).await?;

        let mut ordered: Vec<(i64, Instance)> = definitions
            .iter()
            .zip(instances)
            .map(|(definition, instance)| {
                let order = definition.class().order_of(&instance);
                (order, definition.class().cast(type_name, instance))
            })
            .collect();
        ordered.sort_by_key(|(order, _)| *order);
        Ok(ordered.into_iter().map(|(_, instance)| instance).collect())
    }

    pub async fn get_objects_by_group(&self, group: &str) -> Result<Vec<Instance>> {
        let definitions = self.get_definitions_by_group(group)?;
        settle_all(definitions.iter().map(|d| d.get_instance())).await
    }

    pub async fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(self.get_object_by_name(name).await?)
    }

    pub async fn get_by_type<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        downcast(self.get_object_by_type(std::any::type_name::<T>()).await?)
    }

    pub async fn get_all_by_type<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>> {
        self.get_objects_by_type(std::any::type_name::<T>())
            .await?
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// The single object registered with the trait alias `alias`
    pub async fn get_dyn<T: ?Sized + Send + Sync + 'static>(&self, alias: &str) -> Result<Arc<T>> {
        downcast_dyn(self.get_object_by_type(alias).await?)
    }

    pub async fn get_all_dyn<T: ?Sized + Send + Sync + 'static>(
        &self,
        alias: &str,
    ) -> Result<Vec<Arc<T>>> {
        self.get_objects_by_type(alias)
            .await?
            .into_iter()
            .map(downcast_dyn)
            .collect()
    }

    // Configuration

    pub fn has_config(&self, key: &str) -> bool {
        self.config.has_config(key)
    }

    pub fn get_config(&self, key: &str) -> Result<Value> {
        self.config.get_config(key).ok_or_else(|| IocError::ConfigNotFound {
            key: key.to_string(),
        })
    }

    pub fn get_config_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.config.get_config(key).unwrap_or_else(|| default.into())
    }

    pub fn get_config_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        serde_json::from_value(self.get_config(key)?).map_err(|e| IocError::Config {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    // Composition

    /// A detached copy of this context: same parent, configuration and
    /// inspectors, fresh copies of every definition, nothing started.
    pub fn clone_context(&self, name: impl Into<String>) -> Result<Arc<Context>> {
        self.ensure_not_started("clone")?;

        let inspectors = self
            .inspectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut builder = Context::builder(name)
            .config_adapter(Arc::clone(&self.config))
            .inspectors(inspectors);
        if let Some(parent) = &self.parent {
            builder = builder.parent(Arc::clone(parent));
        }
        if let Some(grace) = self.shutdown_grace {
            builder = builder.shutdown_grace(grace);
        }
        let clone = builder.build();
        clone.copy_from(self, false)?;
        Ok(clone)
    }

    /// Copy every definition and group of `other` into this context
    pub fn import_context(&self, other: &Context, overwrite: bool) -> Result<()> {
        self.ensure_not_started("import contexts")?;
        other.ensure_not_started("be imported")?;
        self.copy_from(other, overwrite)
    }

    fn copy_from(&self, other: &Context, overwrite: bool) -> Result<()> {
        let definitions: Vec<_> = other
            .read_definitions()
            .iter()
            .filter(|d| !d.is_internal())
            .cloned()
            .collect();
        for definition in definitions {
            self.register_definition(definition.copy(), overwrite)?;
        }

        let groups = other
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (group, members) in groups {
            for member in members {
                self.add_to_group(&group, &member)?;
            }
        }
        Ok(())
    }

    // Lifecycle

    pub(crate) fn mark_started(&self, name: &str) {
        if let Some(definition) = self.find_definition(name) {
            self.started.insert(name.to_string(), definition);
        }
    }

    pub fn started_object_names(&self) -> Vec<String> {
        self.started.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Give every inspector a chance to adjust or replace each definition
    fn apply_inspectors(&self) -> Result<()> {
        let inspectors = self
            .inspectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if inspectors.is_empty() {
            return Ok(());
        }

        let this = self.this()?;
        let snapshot: Vec<_> = self.read_definitions().clone();
        // Definitions resolved before the context started keep their wiring.
        let pending = snapshot
            .into_iter()
            .filter(|d| !d.is_internal() && d.status() == LifecycleState::NotStarted);
        for original in pending {
            let mut current = Arc::clone(&original);
            for inspector in &inspectors {
                if let Some(replacement) = inspector.inspect(&current)? {
                    current = replacement;
                }
            }
            if !Arc::ptr_eq(&current, &original) {
                current.attach(&this)?;
                tracing::debug!(definition = %original.name(), "definition replaced by inspector");
                let mut definitions = self.write_definitions();
                if let Some(slot) = definitions.iter_mut().find(|d| Arc::ptr_eq(d, &original)) {
                    *slot = current;
                }
            }
        }
        Ok(())
    }

    async fn stop_started_objects(&self) -> Result<()> {
        let started: Vec<_> = self
            .started
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let results = join_all(started.iter().map(|d| d.lc_stop())).await;
        for (definition, result) in started.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(
                    context = %self.name(),
                    definition = %definition.name(),
                    error = %e,
                    "failed to stop object"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Context {
    fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    async fn do_start(&self) -> Result<()> {
        self.apply_inspectors()?;

        let eager: Vec<_> = self
            .read_definitions()
            .iter()
            .filter(|d| !d.is_internal() && !d.is_lazy())
            .cloned()
            .collect();
        tracing::info!(context = %self.name(), eager = eager.len(), "starting objects");

        if let Err(e) = settle_all(eager.iter().map(|d| d.get_instance())).await {
            tracing::error!(context = %self.name(), error = %e, "start failed, stopping started objects");
            if let Err(stop_error) = self.machine.stop_with(self.stop_started_objects()).await {
                tracing::error!(context = %self.name(), error = %stop_error, "stop after failed start failed");
            }
            return Err(e);
        }

        tracing::info!(context = %self.name(), started = self.started.len(), "context started");
        Ok(())
    }

    async fn do_stop(&self) -> Result<()> {
        if let Some(grace) = self.shutdown_grace {
            tracing::info!(context = %self.name(), ?grace, "waiting before stopping objects");
            tokio::time::sleep(grace).await;
        }
        self.stop_started_objects().await
    }

    /// Starts the parent first when it has not been started yet
    async fn lc_start(&self) -> Result<()> {
        if let Some(parent) = &self.parent {
            match parent.status() {
                LifecycleState::NotStarted => parent.lc_start().await?,
                status if status < LifecycleState::Started => {
                    parent.state_machine().wait_for(LifecycleState::Started).await?
                }
                _ => {}
            }
        }
        self.machine.start_with(self.do_start()).await
    }

    /// Stops this context, then its parent
    async fn lc_stop(&self) -> Result<()> {
        let result = self.machine.stop_with(self.do_stop()).await;
        if let Some(parent) = &self.parent {
            parent.lc_stop().await?;
        }
        result
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("definitions", &self.definition_names())
            .finish()
    }
}

#[cfg(test)]
mod tests;
