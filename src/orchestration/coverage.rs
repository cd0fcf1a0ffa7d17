use crate::orchestration::outcome::Outcome;
use crate::orchestration::registry::WorkflowRegistry;
use serde::Serialize;

pub const DEFAULT_DEFINITION_NAMESPACE: &str = "waypoint";

/// One declared edge, as consumed by external consistency tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionTriple {
    pub workflow: String,
    pub from_step: String,
    pub outcome: Outcome,
    pub to_step: String,
}

/// The agent and prompt definition names a step is expected to ship with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinitionNames {
    pub workflow: String,
    pub step: String,
    pub base_name: String,
    pub agent_file: String,
    pub prompt_file: String,
}

pub fn transition_triples(registry: &WorkflowRegistry) -> Vec<TransitionTriple> {
    registry
        .iter()
        .flat_map(|definition| {
            definition
                .transitions()
                .iter()
                .map(move |transition| TransitionTriple {
                    workflow: definition.name().to_string(),
                    from_step: transition.from.clone(),
                    outcome: transition.outcome,
                    to_step: transition.to.clone(),
                })
        })
        .collect()
}

/// Names follow `<namespace>.<workflow>.<step>` for every step of every workflow.
pub fn expected_definition_names(
    registry: &WorkflowRegistry,
    namespace: &str,
) -> Vec<StepDefinitionNames> {
    let mut names = Vec::new();
    for definition in registry.iter() {
        for step in definition.steps() {
            let base_name = format!("{namespace}.{}.{step}", definition.name());
            names.push(StepDefinitionNames {
                workflow: definition.name().to_string(),
                agent_file: format!("{base_name}.agent.md"),
                prompt_file: format!("{base_name}.prompt.md"),
                step,
                base_name,
            });
        }
    }
    names
}
