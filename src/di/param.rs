//! The declarative dependency vocabulary and the values it resolves to.

use crate::error::{IocError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A produced object, type-erased
pub type Instance = Arc<dyn Any + Send + Sync>;

/// How one constructor argument or property is obtained
#[derive(Clone, Debug)]
pub enum ParamDefinition {
    /// A literal, passed as-is
    Value(Resolved),
    /// The object registered under this name
    Reference(String),
    /// The single autowire candidate of this type
    Type(String),
    /// Every autowire candidate of this type, possibly none
    TypeArray(String),
    /// A configuration value
    Config(String),
    /// Every object registered in this group
    Group(String),
}

impl ParamDefinition {
    /// Parse an autowire string.
    ///
    /// `~` selects by type, `*` by type array, `#` by configuration key,
    /// `%` by group; anything else is an object name.
    pub fn parse(spec: &str) -> Self {
        let mut chars = spec.chars();
        match chars.next() {
            Some('~') => Self::Type(chars.as_str().to_string()),
            Some('*') => Self::TypeArray(chars.as_str().to_string()),
            Some('#') => Self::Config(chars.as_str().to_string()),
            Some('%') => Self::Group(chars.as_str().to_string()),
            _ => Self::Reference(spec.to_string()),
        }
    }
}

impl fmt::Display for ParamDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "value {value:?}"),
            Self::Reference(name) => write!(f, "reference {name}"),
            Self::Type(name) => write!(f, "type {name}"),
            Self::TypeArray(name) => write!(f, "type array {name}"),
            Self::Config(key) => write!(f, "config {key}"),
            Self::Group(name) => write!(f, "group {name}"),
        }
    }
}

/// The value of a resolved parameter
#[derive(Clone)]
pub enum Resolved {
    Value(Value),
    Object(Instance),
    List(Vec<Instance>),
}

impl Resolved {
    pub fn object_of<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self::Object(object)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn object<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        match self {
            Self::Object(instance) => downcast(Arc::clone(instance)),
            _ => Err(IocError::downcast::<T>()),
        }
    }

    /// An object that was looked up through a trait alias
    pub fn object_dyn<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        match self {
            Self::Object(instance) => downcast_dyn(Arc::clone(instance)),
            _ => Err(IocError::downcast::<T>()),
        }
    }

    pub fn objects<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>> {
        match self {
            Self::List(items) => items.iter().cloned().map(downcast).collect(),
            _ => Err(IocError::downcast::<Vec<Arc<T>>>()),
        }
    }

    pub fn objects_dyn<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        match self {
            Self::List(items) => items.iter().cloned().map(downcast_dyn).collect(),
            _ => Err(IocError::downcast::<Vec<Arc<T>>>()),
        }
    }

    pub fn value<D: DeserializeOwned>(&self) -> Result<D> {
        match self {
            Self::Value(value) => {
                serde_json::from_value(value.clone()).map_err(|_| IocError::downcast::<D>())
            }
            _ => Err(IocError::downcast::<D>()),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Object(_) => f.write_str("<object>"),
            Self::List(items) => write!(f, "<{} objects>", items.len()),
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Resolved {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Resolved {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for Resolved {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Resolved {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Resolved {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

/// Positional access to resolved constructor arguments
pub struct Args {
    owner: String,
    values: Vec<Resolved>,
}

impl Args {
    pub(crate) fn new(owner: impl Into<String>, values: Vec<Resolved>) -> Self {
        Self {
            owner: owner.into(),
            values,
        }
    }

    /// Name of the definition being constructed
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Resolved> {
        self.values.get(index).ok_or_else(|| IocError::MissingArgument {
            owner: self.owner.clone(),
            index,
        })
    }

    pub fn object<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        self.get(index)?.object()
    }

    pub fn object_dyn<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.get(index)?.object_dyn()
    }

    pub fn objects<T: Any + Send + Sync>(&self, index: usize) -> Result<Vec<Arc<T>>> {
        self.get(index)?.objects()
    }

    pub fn value<D: DeserializeOwned>(&self, index: usize) -> Result<D> {
        self.get(index)?.value()
    }

    pub fn into_values(self) -> Vec<Resolved> {
        self.values
    }
}

pub fn downcast<T: Any + Send + Sync>(instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| IocError::downcast::<T>())
}

/// Unwrap an instance produced by a trait alias cast
pub fn downcast_dyn<T: ?Sized + Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<Arc<T>>()
        .map(|wrapper| wrapper.as_ref().clone())
        .map_err(|_| IocError::downcast::<T>())
}
