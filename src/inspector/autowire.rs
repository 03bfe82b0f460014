use super::{InspectorFilter, MatchingInspector, apply_declaration};
use crate::di::ObjectDefinition;
use crate::error::Result;
use std::sync::Arc;

/// Turns a class's autowire declaration into constructor arguments and
/// properties.
///
/// See [`crate::di::ParamDefinition::parse`] for the string syntax.
pub struct AutowireInspector {
    filter: InspectorFilter,
}

impl AutowireInspector {
    pub fn new() -> Self {
        Self {
            filter: InspectorFilter::all(),
        }
    }
}

impl Default for AutowireInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingInspector for AutowireInspector {
    fn filter(&self) -> &InspectorFilter {
        &self.filter
    }

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        if let (Some(singleton), Some(declaration)) = (
            definition.as_singleton(),
            &definition.class().markers().autowire,
        ) {
            tracing::trace!(definition = %definition.name(), ?declaration, "applying autowire declaration");
            apply_declaration(singleton, declaration)?;
        }
        Ok(None)
    }
}
