use super::{InspectorFilter, MatchingInspector, apply_declaration};
use crate::di::ObjectDefinition;
use crate::error::Result;
use std::sync::Arc;

/// Applies the wiring a class declares through decorations.
///
/// Decorations use the same string syntax as autowire declarations and are
/// applied after them.
pub struct DecoratorInspector {
    filter: InspectorFilter,
}

impl DecoratorInspector {
    pub fn new() -> Self {
        Self {
            filter: InspectorFilter::all(),
        }
    }
}

impl Default for DecoratorInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingInspector for DecoratorInspector {
    fn filter(&self) -> &InspectorFilter {
        &self.filter
    }

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        if let (Some(singleton), Some(declaration)) = (
            definition.as_singleton(),
            &definition.class().markers().decorations,
        ) {
            apply_declaration(singleton, declaration)?;
        }
        Ok(None)
    }
}
