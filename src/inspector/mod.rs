//! Object definition inspectors.
//!
//! Inspectors run once per definition when a context starts, before anything
//! is instantiated. They may adjust a definition in place or return a
//! replacement for it.

mod autowire;
mod decorator;
mod lazy;
mod start_stop;

pub use autowire::AutowireInspector;
pub use decorator::DecoratorInspector;
pub use lazy::LazyLoadingInspector;
pub use start_stop::StartStopMethodsInspector;

use crate::di::{AutowireDeclaration, ObjectDefinition, ParamDefinition, SingletonDefinition};
use crate::error::{IocError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

pub trait ObjectDefinitionInspector: Send + Sync {
    /// `Ok(Some(_))` replaces the definition in its context
    fn inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>>;
}

/// How an inspector selects definitions by name
#[derive(Debug, Clone)]
pub enum NamePattern {
    Exact(String),
    Regex(Regex),
}

impl NamePattern {
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| IocError::illegal_state(format!("invalid name pattern {pattern}: {e}")))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Which definitions a [`MatchingInspector`] is interested in
#[derive(Debug, Clone, Default)]
pub struct InspectorFilter {
    inspect_all: bool,
    classes: HashSet<String>,
    names: Vec<NamePattern>,
}

impl InspectorFilter {
    /// Matches nothing until classes or names are added
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            inspect_all: true,
            ..Self::default()
        }
    }

    pub fn class(mut self, type_name: impl Into<String>) -> Self {
        self.classes.insert(type_name.into());
        self
    }

    pub fn name(mut self, pattern: NamePattern) -> Self {
        self.names.push(pattern);
        self
    }

    pub fn interested_in(&self, definition: &dyn ObjectDefinition) -> bool {
        self.inspect_all
            || self
                .classes
                .iter()
                .any(|class| definition.class().matches(class))
            || self.names.iter().any(|pattern| pattern.matches(definition.name()))
    }
}

/// An inspector that only sees definitions its filter selects
pub trait MatchingInspector: Send + Sync {
    fn filter(&self) -> &InspectorFilter;

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>>;
}

impl<I: MatchingInspector> ObjectDefinitionInspector for I {
    fn inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        if self.filter().interested_in(definition.as_ref()) {
            self.do_inspect(definition)
        } else {
            Ok(None)
        }
    }
}

/// The inspectors every context starts with
pub fn default_inspectors() -> Vec<Arc<dyn ObjectDefinitionInspector>> {
    vec![
        Arc::new(StartStopMethodsInspector::new()) as Arc<dyn ObjectDefinitionInspector>,
        Arc::new(AutowireInspector::new()),
        Arc::new(DecoratorInspector::new()),
        Arc::new(LazyLoadingInspector::new()),
    ]
}

/// Append the parsed autowire strings to a singleton's wiring
pub(crate) fn apply_declaration(
    definition: &SingletonDefinition,
    declaration: &AutowireDeclaration,
) -> Result<()> {
    for spec in &declaration.constructor {
        definition.constructor_param(ParamDefinition::parse(spec))?;
    }
    for (property, spec) in &declaration.properties {
        definition.set_property(property, ParamDefinition::parse(spec))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Class;

    struct Probe;

    fn definition(name: &str) -> Arc<dyn ObjectDefinition> {
        Arc::new(SingletonDefinition::new(
            name,
            Class::builder(|_| Ok(Probe)).build(),
        ))
    }

    #[test]
    fn test_filter_by_name_and_class() {
        let filter = InspectorFilter::new()
            .name(NamePattern::exact("db"))
            .name(NamePattern::regex("^cache-[0-9]+$").unwrap());

        assert!(filter.interested_in(definition("db").as_ref()));
        assert!(filter.interested_in(definition("cache-12").as_ref()));
        assert!(!filter.interested_in(definition("cache-x").as_ref()));

        let by_class = InspectorFilter::new().class("Probe");
        assert!(by_class.interested_in(definition("anything").as_ref()));
        assert!(InspectorFilter::all().interested_in(definition("x").as_ref()));
        assert!(!InspectorFilter::new().interested_in(definition("x").as_ref()));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(NamePattern::regex("(").is_err());
    }
}
