//! Type-erased descriptions of the classes a definition produces.
//!
//! A [`Class`] carries everything the container needs to build and drive an
//! object without knowing its concrete type: the factory, named property
//! setters, named async methods, trait alias casters and the declarative
//! markers read by the default inspectors.

use super::param::{Args, Instance, Resolved};
use super::wired::Assign;
use crate::error::IocError;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

type FactoryFn = Arc<dyn Fn(Args) -> anyhow::Result<Instance> + Send + Sync>;
type SetterFn = Arc<dyn Fn(&Instance, Resolved) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type MethodFn =
    Arc<dyn Fn(Instance) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
/// Turns the concrete instance into an `Arc<Arc<dyn Trait>>` behind `dyn Any`
type CasterFn = Arc<dyn Fn(Instance) -> Instance + Send + Sync>;
type OrderFn = Arc<dyn Fn(&Instance) -> i64 + Send + Sync>;

/// A type the container can build from its own class description
pub trait Component: Any + Send + Sync + Sized {
    fn class() -> Class;
}

/// Autowire strings for constructor arguments and properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutowireDeclaration {
    pub constructor: Vec<String>,
    pub properties: Vec<(String, String)>,
}

impl AutowireDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructor(mut self, spec: impl Into<String>) -> Self {
        self.constructor.push(spec.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.properties.push((name.into(), spec.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constructor.is_empty() && self.properties.is_empty()
    }
}

/// Declarations consumed by the default inspectors
#[derive(Debug, Clone, Default)]
pub struct Markers {
    pub start_method: Option<String>,
    pub stop_method: Option<String>,
    pub lazy: Option<bool>,
    pub autowire: Option<AutowireDeclaration>,
    pub decorations: Option<AutowireDeclaration>,
    pub groups: Vec<String>,
}

struct ClassInner {
    name: String,
    type_path: &'static str,
    type_id: TypeId,
    factory: FactoryFn,
    setters: HashMap<String, SetterFn>,
    methods: HashMap<String, MethodFn>,
    aliases: Vec<(String, CasterFn)>,
    order: Option<OrderFn>,
    markers: Markers,
}

#[derive(Clone)]
pub struct Class {
    inner: Arc<ClassInner>,
}

impl Class {
    pub fn builder<T, F>(factory: F) -> ClassBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn(Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        ClassBuilder {
            inner: ClassInner {
                name: simple_name(std::any::type_name::<T>()).to_string(),
                type_path: std::any::type_name::<T>(),
                type_id: TypeId::of::<T>(),
                factory: Arc::new(move |args| factory(args).map(|value| Arc::new(value) as Instance)),
                setters: HashMap::new(),
                methods: HashMap::new(),
                aliases: Vec::new(),
                order: None,
                markers: Markers::default(),
            },
            _marker: PhantomData,
        }
    }

    pub fn of<T: Component>() -> Self {
        T::class()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn type_path(&self) -> &'static str {
        self.inner.type_path
    }

    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    pub fn markers(&self) -> &Markers {
        &self.inner.markers
    }

    /// Whether a lookup by `type_name` selects this class.
    ///
    /// Matches the class name, the full type path or any declared alias.
    pub fn matches(&self, type_name: &str) -> bool {
        self.inner.name == type_name
            || self.inner.type_path == type_name
            || self.inner.aliases.iter().any(|(alias, _)| alias == type_name)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.inner.setters.contains_key(property)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.inner.methods.contains_key(method)
    }

    pub(crate) fn construct(&self, args: Args) -> anyhow::Result<Instance> {
        (self.inner.factory)(args)
    }

    pub(crate) fn assign(
        &self,
        instance: &Instance,
        property: &str,
        value: Resolved,
    ) -> anyhow::Result<()> {
        let setter = self.inner.setters.get(property).ok_or_else(|| IocError::UnknownProperty {
            class: self.inner.name.clone(),
            property: property.to_string(),
        })?;
        setter(instance, value)
    }

    pub(crate) fn method(&self, method: &str) -> Option<MethodFn> {
        self.inner.methods.get(method).cloned()
    }

    /// Present `instance` as `type_name`, casting through an alias when one matches
    pub(crate) fn cast(&self, type_name: &str, instance: Instance) -> Instance {
        match self.inner.aliases.iter().find(|(alias, _)| alias == type_name) {
            Some((_, caster)) => caster(instance),
            None => instance,
        }
    }

    pub(crate) fn order_of(&self, instance: &Instance) -> i64 {
        self.inner.order.as_ref().map_or(0, |order| order(instance))
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.inner.name)
            .field("type_path", &self.inner.type_path)
            .field("aliases", &self.inner.aliases.iter().map(|(a, _)| a).collect::<Vec<_>>())
            .finish()
    }
}

pub struct ClassBuilder<T> {
    inner: ClassInner,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    /// Override the simple name used for by-type lookups
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn property<F>(mut self, name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&T, Resolved) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let setter: SetterFn = Arc::new(move |instance: &Instance, value| {
            let target = instance
                .downcast_ref::<T>()
                .ok_or_else(IocError::downcast::<T>)?;
            setter(target, value)
        });
        self.inner.setters.insert(name.into(), setter);
        self
    }

    /// A property backed by a wiring slot such as [`super::Wired`]
    pub fn wire<S: Assign + 'static>(self, name: impl Into<String>, slot: fn(&T) -> &S) -> Self {
        self.property(name, move |target, value| slot(target).assign(value))
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let method: MethodFn = Arc::new(move |instance: Instance| -> BoxFuture<'static, _> {
            match instance.downcast::<T>() {
                Ok(target) => Box::pin(method(target)),
                Err(_) => Box::pin(async { Err(IocError::downcast::<T>().into()) }),
            }
        });
        self.inner.methods.insert(name.into(), method);
        self
    }

    /// Make the class selectable by `alias`, handing out `Arc<U>` for it
    pub fn implements<U, F>(mut self, alias: impl Into<String>, cast: F) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        let caster: CasterFn = Arc::new(move |instance: Instance| {
            match Arc::clone(&instance).downcast::<T>() {
                Ok(concrete) => Arc::new(cast(concrete)) as Instance,
                Err(_) => instance,
            }
        });
        self.inner.aliases.push((alias.into(), caster));
        self
    }

    /// Sort key used when several objects are returned for one type
    pub fn order_by(mut self, order: fn(&T) -> i64) -> Self {
        self.inner.order = Some(Arc::new(move |instance: &Instance| {
            instance.downcast_ref::<T>().map_or(0, order)
        }));
        self
    }

    pub fn start_method(mut self, name: impl Into<String>) -> Self {
        self.inner.markers.start_method = Some(name.into());
        self
    }

    pub fn stop_method(mut self, name: impl Into<String>) -> Self {
        self.inner.markers.stop_method = Some(name.into());
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.inner.markers.lazy = Some(lazy);
        self
    }

    pub fn autowire(mut self, declaration: AutowireDeclaration) -> Self {
        self.inner.markers.autowire = Some(declaration);
        self
    }

    pub fn decorated(mut self, declaration: AutowireDeclaration) -> Self {
        self.inner.markers.decorations = Some(declaration);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.inner.markers.groups.push(group.into());
        self
    }

    pub fn build(self) -> Class {
        Class {
            inner: Arc::new(self.inner),
        }
    }
}

/// `app::service::Db<T>` -> `Db`
fn simple_name(type_path: &str) -> &str {
    let base = type_path.split('<').next().unwrap_or(type_path);
    base.rsplit("::").next().unwrap_or(base)
}
