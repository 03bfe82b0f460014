use super::{InspectorFilter, MatchingInspector};
use crate::di::ObjectDefinition;
use crate::error::Result;
use std::sync::Arc;

/// Applies the start and stop methods a class declares, unless the
/// definition already names its own
pub struct StartStopMethodsInspector {
    filter: InspectorFilter,
}

impl StartStopMethodsInspector {
    pub fn new() -> Self {
        Self {
            filter: InspectorFilter::all(),
        }
    }
}

impl Default for StartStopMethodsInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingInspector for StartStopMethodsInspector {
    fn filter(&self) -> &InspectorFilter {
        &self.filter
    }

    fn do_inspect(
        &self,
        definition: &Arc<dyn ObjectDefinition>,
    ) -> Result<Option<Arc<dyn ObjectDefinition>>> {
        let Some(singleton) = definition.as_singleton() else {
            return Ok(None);
        };
        let markers = definition.class().markers();

        if let Some(method) = &markers.start_method {
            if singleton.start_function_name().is_none() {
                singleton.start_function(method)?;
            }
        }
        if let Some(method) = &markers.stop_method {
            if singleton.stop_function_name().is_none() {
                singleton.stop_function(method)?;
            }
        }
        Ok(None)
    }
}
