//! Staged execution pipeline over registry components.
//!
//! An [`ExecutionPipeline`] groups registered components into named
//! stages, wires stages to each other with `depends_on` edges, and
//! executes them in dependency order using the same leaves-first DFS
//! the registry uses for single components — applied to the stage
//! graph instead.
//!
//! Stages run strictly sequentially, components within a stage too.
//! Two stages with no dependency between them still run one after the
//! other in the computed order; the guarantee that matters is that a
//! stage never runs before everything it `depends_on` has completed.
//!
//! Unlike agent failures in the committee orchestrator, a component
//! failing here aborts the whole `execute` call: a pipeline component
//! erroring means the infrastructure is miswired, not that an
//! untrusted participant exercised fallible judgment.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;
use crate::registry::{ComponentRegistry, ResolutionContext};

// ── Pipeline component contract ──────────────────────────────────

/// Capability every pipeline-eligible component implements.
///
/// The trait replaces a runtime "does it have a run method?" probe:
/// only types implementing it can be stored in the pipeline's registry,
/// so eligibility is enforced by the compiler instead of at call time.
#[async_trait]
pub trait PipelineComponent: Send + Sync {
    /// Execute this component against the shared run context and
    /// return its result value.
    async fn run(&self, context: &Value) -> anyhow::Result<Value>;
}

/// Handle type stored in a pipeline's registry.
pub type ComponentHandle = Arc<dyn PipelineComponent>;

// ── Stage ────────────────────────────────────────────────────────

/// A named, orderable unit of execution containing one or more components.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique stage name.
    pub name: String,
    /// Registered component names to run, in declaration order.
    pub components: Vec<String>,
    /// Stages that must complete before this one runs.
    pub depends_on: Vec<String>,
    /// Whether every component of this stage has succeeded.
    pub completed: bool,
}

// ── Execution context ────────────────────────────────────────────

/// Inputs threaded through one `execute` call.
///
/// `data` is the payload handed to every component's `run`; `overrides`
/// pre-seeds component instances into registry resolution (test doubles,
/// shared singletons). Stage results are *not* fed back automatically —
/// a caller wanting stage N's output visible to stage N+1 re-executes
/// with the results merged into `data`.
#[derive(Default)]
pub struct ExecutionContext {
    /// Run payload visible to every component.
    pub data: Value,
    /// Instance injection for registry resolution.
    pub overrides: ResolutionContext<ComponentHandle>,
}

impl ExecutionContext {
    /// An empty context (`data` is JSON `null`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Builder-style instance override.
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, handle: ComponentHandle) -> Self {
        self.overrides.insert(name, handle);
        self
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

/// Ordered, dependency-aware executor of component stages.
pub struct ExecutionPipeline {
    registry: Arc<ComponentRegistry<ComponentHandle>>,
    stages: Vec<Stage>,
}

impl ExecutionPipeline {
    /// Create a pipeline over a fully wired registry.
    ///
    /// The registry is taken as shared and read-only: all registration
    /// happens during single-threaded startup, before stages execute.
    pub fn new(registry: Arc<ComponentRegistry<ComponentHandle>>) -> Self {
        Self {
            registry,
            stages: Vec::new(),
        }
    }

    /// Add a stage, failing fast before any execution.
    ///
    /// Errors on a duplicate or empty stage name, an empty component
    /// list, or any component name absent from the registry. Stage
    /// dependency names are validated at `execute` time, since the
    /// stage they reference may legitimately be added later.
    pub fn add_stage(
        &mut self,
        name: impl Into<String>,
        components: Vec<String>,
        depends_on: Vec<String>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "stage name must be a non-empty string".into(),
            ));
        }
        if components.is_empty() {
            return Err(PipelineError::EmptyStage(name));
        }
        if components.iter().any(|c| c.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(format!(
                "stage '{name}' has an empty component name"
            )));
        }
        if depends_on.iter().any(|d| d.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(format!(
                "stage '{name}' has an empty dependency name"
            )));
        }
        if self.stages.iter().any(|s| s.name == name) {
            return Err(PipelineError::DuplicateStage(name));
        }

        let missing: Vec<String> = components
            .iter()
            .filter(|c| !self.registry.has(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::UnknownComponents {
                stage: name,
                missing,
            });
        }

        tracing::info!(
            stage = %name,
            components = components.len(),
            depends_on = depends_on.len(),
            "stage added"
        );
        self.stages.push(Stage {
            name,
            components,
            depends_on,
            completed: false,
        });
        Ok(())
    }

    /// Execute every stage in dependency order.
    ///
    /// Returns the per-component results keyed by component name. Any
    /// component error aborts the call immediately with the stage and
    /// component identified; stages completed before the failure keep
    /// their `completed` flag until [`reset`](Self::reset).
    pub async fn execute(
        &mut self,
        context: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, PipelineError> {
        self.validate_stage_dependencies()?;

        let order = self.execution_order()?;
        if order.is_empty() {
            tracing::warn!("pipeline has no stages to execute");
            return Ok(HashMap::new());
        }
        tracing::info!(stages = order.len(), "pipeline execution started");

        let mut results = HashMap::new();
        for stage_name in order {
            let Some(stage) = self.stage(&stage_name).cloned() else {
                continue;
            };
            self.execute_stage(&stage, context, &mut results).await?;
        }

        tracing::info!(
            stages_completed = self.stages.iter().filter(|s| s.completed).count(),
            components_executed = results.len(),
            "pipeline execution finished"
        );
        Ok(results)
    }

    async fn execute_stage(
        &mut self,
        stage: &Stage,
        context: &ExecutionContext,
        results: &mut HashMap<String, Value>,
    ) -> Result<(), PipelineError> {
        // Precondition: every dependency stage has completed. The
        // topological order makes this hold by construction, but a
        // violated flag after an earlier aborted run must not pass.
        for dep in &stage.depends_on {
            let done = self.stages.iter().any(|s| s.name == *dep && s.completed);
            if !done {
                return Err(PipelineError::IncompleteDependency {
                    stage: stage.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        tracing::info!(stage = %stage.name, components = stage.components.len(), "stage started");
        for component_name in &stage.components {
            let component = self.registry.get(component_name, &context.overrides)?;
            let value = component.run(&context.data).await.map_err(|source| {
                PipelineError::ComponentFailed {
                    stage: stage.name.clone(),
                    component: component_name.clone(),
                    source,
                }
            })?;
            tracing::debug!(stage = %stage.name, component = %component_name, "component succeeded");
            results.insert(component_name.clone(), value);
        }

        if let Some(entry) = self.stages.iter_mut().find(|s| s.name == stage.name) {
            entry.completed = true;
        }
        tracing::info!(stage = %stage.name, "stage completed");
        Ok(())
    }

    /// Leaves-first order over the stage graph, with cycle detection.
    fn execution_order(&self) -> Result<Vec<String>, PipelineError> {
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = Vec::new();

        for stage in &self.stages {
            if !visited.contains(&stage.name) {
                self.visit_stage(stage, &mut visiting, &mut visited, &mut ordered)?;
            }
        }
        Ok(ordered)
    }

    fn visit_stage(
        &self,
        stage: &Stage,
        visiting: &mut Vec<String>,
        visited: &mut HashSet<String>,
        ordered: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        if visiting.iter().any(|v| v == &stage.name) {
            let mut cycle = visiting.clone();
            cycle.push(stage.name.clone());
            return Err(PipelineError::StageCycle { cycle });
        }
        if visited.contains(&stage.name) {
            return Ok(());
        }

        visiting.push(stage.name.clone());
        for dep_name in &stage.depends_on {
            let dep = self.stages.iter().find(|s| &s.name == dep_name).ok_or_else(|| {
                PipelineError::UnknownStageDependency {
                    stage: stage.name.clone(),
                    dependency: dep_name.clone(),
                }
            })?;
            self.visit_stage(dep, visiting, visited, ordered)?;
        }
        visiting.pop();
        visited.insert(stage.name.clone());
        ordered.push(stage.name.clone());
        Ok(())
    }

    fn validate_stage_dependencies(&self) -> Result<(), PipelineError> {
        let names: HashSet<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(PipelineError::UnknownStageDependency {
                        stage: stage.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Clear every stage's `completed` flag.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.completed = false;
        }
        tracing::info!("pipeline reset");
    }

    /// Snapshot of all stages in declaration order.
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.clone()
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

// ── Tests ────────────────────────────────────────────────────────
