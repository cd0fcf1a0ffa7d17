use crate::app::command_support::{open_controller, GlobalOptions};
use crate::orchestration::coverage::{
    expected_definition_names, transition_triples, DEFAULT_DEFINITION_NAMESPACE,
};

pub fn cmd_workflows(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: workflows".to_string());
    }
    let controller = open_controller(options)?;
    let mut lines = Vec::new();
    for definition in controller.registry().iter() {
        let terminal = definition
            .terminal_steps()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        lines.push(format!(
            "workflow={} initial_step={} terminal_steps={} steps={} description={}",
            definition.name(),
            definition.initial_step(),
            terminal.join(","),
            definition.steps().join(","),
            definition.description()
        ));
    }
    Ok(lines.join("\n"))
}

/// Prints every declared edge and the definition files each step should ship
/// with, for external consistency checks.
pub fn cmd_coverage(options: &GlobalOptions, args: &[String]) -> Result<String, String> {
    let namespace = match args {
        [] => DEFAULT_DEFINITION_NAMESPACE,
        [namespace] => namespace.as_str(),
        _ => return Err("usage: coverage [namespace]".to_string()),
    };
    if namespace.trim().is_empty() || namespace.contains('/') {
        return Err(format!("invalid namespace `{namespace}`"));
    }

    let controller = open_controller(options)?;
    let registry = controller.registry();
    let mut lines = Vec::new();
    for triple in transition_triples(registry) {
        lines.push(format!(
            "transition={}:{}:{}:{}",
            triple.workflow, triple.from_step, triple.outcome, triple.to_step
        ));
    }
    for names in expected_definition_names(registry, namespace) {
        lines.push(format!(
            "definition={} agent={} prompt={}",
            names.base_name, names.agent_file, names.prompt_file
        ));
    }
    Ok(lines.join("\n"))
}
