use super::{InspectorFilter, MatchingInspector};
use crate::di::ObjectDefinition;
use crate::error::Result;
use std::sync::Arc;

/// Applies the lazy flag a class declares, unless the definition already
/// sets its own
pub struct LazyLoadingInspector {
    filter: InspectorFilter,
}

impl LazyLoadingInspector {
    pub fn new() -> Self {
        Self {
            filter: InspectorFilter::all(),
        }
    }
}

impl Default for LazyLoadingInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingInspector for LazyLoadingInspector {
    fn filter(&self) -> &InspectorFilter {
        &self.filter
    }

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        let marker = definition.class().markers().lazy;
        if let (Some(lazy), None) = (marker, definition.lazy_loading()) {
            definition.with_lazy_loading(lazy)?;
        }
        Ok(None)
    }
}
