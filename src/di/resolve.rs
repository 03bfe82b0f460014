use super::definition::{ObjectDefinition, PostLoad, settle_all};
use super::param::{Instance, ParamDefinition, Resolved};
use crate::context::Context;
use crate::error::{IocError, Result};
use crate::lifecycle::LifecycleState;
use std::sync::Arc;

/// Resolve `params` concurrently, keeping their order
pub(crate) async fn resolve_all(
    context: &Context,
    owner: &str,
    params: &[ParamDefinition],
    trace: &[String],
    post_load: &PostLoad,
) -> Result<Vec<Resolved>> {
    settle_all(
        params
            .iter()
            .map(|param| resolve(context, owner, param, trace, post_load)),
    )
    .await
}

pub(crate) async fn resolve(
    context: &Context,
    owner: &str,
    param: &ParamDefinition,
    trace: &[String],
    post_load: &PostLoad,
) -> Result<Resolved> {
    let resolved = match param {
        ParamDefinition::Value(value) => Ok(value.clone()),
        ParamDefinition::Config(key) => context.get_config(key).map(Resolved::Value),
        ParamDefinition::Reference(name) => match context.get_definition_by_name(name) {
            Ok(definition) => max_state_instance(&definition, trace, post_load)
                .await
                .map(Resolved::Object),
            Err(e) => Err(e),
        },
        ParamDefinition::Type(type_name) => match context.get_definition_by_type(type_name) {
            Ok(definition) => max_state_instance(&definition, trace, post_load)
                .await
                .map(|instance| Resolved::Object(definition.class().cast(type_name, instance))),
            Err(e) => Err(e),
        },
        ParamDefinition::TypeArray(type_name) => {
            match context.get_definitions_by_type(type_name, false) {
                Ok(definitions) => resolve_list(&definitions, type_name, trace, post_load)
                    .await
                    .map(Resolved::List),
                Err(e) => Err(e),
            }
        }
        ParamDefinition::Group(group) => match context.get_definitions_by_group(group) {
            Ok(definitions) => resolve_list(&definitions, "", trace, post_load)
                .await
                .map(Resolved::List),
            Err(e) => Err(e),
        },
    };

    resolved.map_err(|e| {
        if e.carries_context() {
            e
        } else {
            IocError::Dependency {
                owner: owner.to_string(),
                param: param.to_string(),
                source: Box::new(e),
            }
        }
    })
}

async fn resolve_list(
    definitions: &[Arc<dyn ObjectDefinition>],
    type_name: &str,
    trace: &[String],
    post_load: &PostLoad,
) -> Result<Vec<Instance>> {
    let instances = settle_all(
        definitions
            .iter()
            .map(|definition| max_state_instance(definition, trace, post_load)),
    )
    .await?;
    Ok(definitions
        .iter()
        .zip(instances)
        .map(|(definition, instance)| definition.class().cast(type_name, instance))
        .collect())
}

/// The most-started instance available without deadlocking.
///
/// A target already on the trace, or not yet started, is only instantiated
/// and deferred to the post-load sweep; anything else is fully started.
pub(crate) async fn max_state_instance(
    definition: &Arc<dyn ObjectDefinition>,
    trace: &[String],
    post_load: &PostLoad,
) -> Result<Instance> {
    let name = definition.name();
    let mut next = trace.to_vec();
    next.push(name.to_string());

    if trace.iter().any(|entry| entry == name) || definition.status() < LifecycleState::Started {
        post_load.add(Arc::clone(definition), next.clone());
        definition
            .get_instance_at(LifecycleState::Instantiated, next, post_load)
            .await
    } else {
        definition
            .get_instance_at(LifecycleState::Started, next, post_load)
            .await
    }
}
