use crate::config::{Settings, WorkflowDeclaration};
use crate::orchestration::catalog::register_builtin_workflows;
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::outcome::Outcome;
use crate::shared::ids::{validate_identifier_value, validate_workflow_name};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub outcome: Outcome,
    pub to: String,
}

impl Transition {
    pub fn new(from: impl Into<String>, outcome: Outcome, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            outcome,
            to: to.into(),
        }
    }
}

/// A validated, immutable transition graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    name: String,
    description: String,
    initial_step: String,
    transitions: Vec<Transition>,
    edges: BTreeMap<(String, Outcome), String>,
    terminal_steps: BTreeSet<String>,
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        initial_step: impl Into<String>,
        transitions: Vec<Transition>,
        terminal_steps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, OrchestratorError> {
        let name = name.into();
        let initial_step = initial_step.into();
        let terminal_steps = terminal_steps
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>();
        let workflow_name = name.clone();
        let invalid = |reason: String| OrchestratorError::InvalidWorkflowDefinition {
            workflow: workflow_name.clone(),
            reason,
        };

        validate_workflow_name(&name).map_err(invalid)?;
        validate_identifier_value("initial step", &initial_step).map_err(invalid)?;
        if terminal_steps.is_empty() {
            return Err(invalid("at least one terminal step is required".to_string()));
        }
        for step in &terminal_steps {
            validate_identifier_value("terminal step", step).map_err(invalid)?;
        }

        let mut edges = BTreeMap::new();
        let mut ordered = Vec::with_capacity(transitions.len());
        for transition in transitions {
            validate_identifier_value("transition source step", &transition.from)
                .map_err(invalid)?;
            validate_identifier_value("transition target step", &transition.to)
                .map_err(invalid)?;
            let key = (transition.from.clone(), transition.outcome);
            match edges.get(&key) {
                Some(existing) if existing == &transition.to => continue,
                Some(existing) => {
                    return Err(invalid(format!(
                        "step `{}` on outcome `{}` targets both `{existing}` and `{}`",
                        transition.from, transition.outcome, transition.to
                    )))
                }
                None => {
                    edges.insert(key, transition.to.clone());
                    ordered.push(transition);
                }
            }
        }

        let definition = Self {
            name,
            description: String::new(),
            initial_step,
            transitions: ordered,
            edges,
            terminal_steps,
        };
        definition.validate_graph().map_err(invalid)?;
        Ok(definition)
    }

    /// A workflow with one step that is both initial and terminal.
    pub fn single_step(
        name: impl Into<String>,
        step: impl Into<String>,
    ) -> Result<Self, OrchestratorError> {
        let step = step.into();
        Self::new(name, step.clone(), Vec::new(), [step])
    }

    pub fn from_declaration(declaration: &WorkflowDeclaration) -> Result<Self, OrchestratorError> {
        let transitions = declaration
            .transitions
            .iter()
            .map(|t| Transition::new(t.from.as_str(), t.outcome, t.to.as_str()))
            .collect();
        Ok(Self::new(
            declaration.name.as_str(),
            declaration.initial_step.as_str(),
            transitions,
            declaration.terminal_steps.iter().map(|step| step.as_str()),
        )?
        .with_description(declaration.description.clone()))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn validate_graph(&self) -> Result<(), String> {
        for step in self.steps() {
            if !self.is_terminal(&step) && !self.has_outgoing(&step) {
                return Err(format!(
                    "step `{step}` is not terminal and has no outgoing transition"
                ));
            }
        }

        let mut reachable = BTreeSet::from([self.initial_step.clone()]);
        let mut queue = VecDeque::from([self.initial_step.clone()]);
        while let Some(step) = queue.pop_front() {
            for transition in self.transitions.iter().filter(|t| t.from == step) {
                if reachable.insert(transition.to.clone()) {
                    queue.push_back(transition.to.clone());
                }
            }
        }
        let unreachable = self
            .steps()
            .into_iter()
            .filter(|step| !reachable.contains(step))
            .collect::<Vec<_>>();
        if !unreachable.is_empty() {
            return Err(format!(
                "steps unreachable from initial step `{}`: {}",
                self.initial_step,
                unreachable.join(", ")
            ));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn initial_step(&self) -> &str {
        &self.initial_step
    }

    pub fn terminal_steps(&self) -> &BTreeSet<String> {
        &self.terminal_steps
    }

    /// Declared transitions in registration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn is_single_step(&self) -> bool {
        self.transitions.is_empty()
            && self.terminal_steps.len() == 1
            && self.terminal_steps.contains(&self.initial_step)
    }

    /// Every step named anywhere in the definition, sorted.
    pub fn steps(&self) -> Vec<String> {
        let mut steps = BTreeSet::new();
        steps.insert(self.initial_step.clone());
        steps.extend(self.terminal_steps.iter().cloned());
        for transition in &self.transitions {
            steps.insert(transition.from.clone());
            steps.insert(transition.to.clone());
        }
        steps.into_iter().collect()
    }

    pub fn has_step(&self, step: &str) -> bool {
        step == self.initial_step
            || self.terminal_steps.contains(step)
            || self
                .transitions
                .iter()
                .any(|transition| transition.from == step || transition.to == step)
    }

    pub fn is_terminal(&self, step: &str) -> bool {
        self.terminal_steps.contains(step)
    }

    pub fn has_outgoing(&self, step: &str) -> bool {
        self.transitions.iter().any(|transition| transition.from == step)
    }

    pub fn transition(&self, from: &str, outcome: Outcome) -> Option<&str> {
        self.edges
            .get(&(from.to_string(), outcome))
            .map(String::as_str)
    }

    /// Resolves the step that follows `from` on `outcome`. A missing pair is a
    /// definition bug, never a runtime condition to retry.
    pub fn next_step(&self, from: &str, outcome: Outcome) -> Result<&str, OrchestratorError> {
        self.transition(from, outcome)
            .ok_or_else(|| OrchestratorError::NoTransition {
                workflow: self.name.clone(),
                step: from.to_string(),
                outcome,
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_workflows() -> Result<Self, OrchestratorError> {
        let mut registry = Self::new();
        register_builtin_workflows(&mut registry)?;
        Ok(registry)
    }

    /// Built-in catalog plus the workflows declared in settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, OrchestratorError> {
        let mut registry = Self::with_builtin_workflows()?;
        for declaration in &settings.workflows {
            registry.register(WorkflowDefinition::from_declaration(declaration)?)?;
        }
        Ok(registry)
    }

    pub fn define(
        &mut self,
        name: &str,
        initial_step: &str,
        transitions: Vec<Transition>,
        terminal_steps: &[&str],
    ) -> Result<&WorkflowDefinition, OrchestratorError> {
        let definition = WorkflowDefinition::new(
            name,
            initial_step,
            transitions,
            terminal_steps.iter().copied(),
        )?;
        self.register(definition)
    }

    pub fn define_single_step(
        &mut self,
        name: &str,
        step: &str,
    ) -> Result<&WorkflowDefinition, OrchestratorError> {
        self.register(WorkflowDefinition::single_step(name, step)?)
    }

    pub fn register(
        &mut self,
        definition: WorkflowDefinition,
    ) -> Result<&WorkflowDefinition, OrchestratorError> {
        let name = definition.name().to_string();
        if self.workflows.contains_key(&name) {
            return Err(OrchestratorError::DuplicateWorkflow { workflow: name });
        }
        Ok(&*self.workflows.entry(name).or_insert(definition))
    }

    pub fn lookup(&self, name: &str) -> Result<&WorkflowDefinition, OrchestratorError> {
        self.workflows
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownWorkflow {
                workflow: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values()
    }
}
