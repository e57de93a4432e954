//! Structural error taxonomy for the registry and pipeline.
//!
//! These errors represent wiring bugs — duplicate names, missing or
//! circular dependencies, misconfigured stages — and are always fatal
//! and synchronous at registration/resolution/setup time. Agent-level
//! failures (timeouts, panicked analyses) never appear here: the
//! orchestrator absorbs those into failing [`AgentResult`]s instead.
//!
//! [`AgentResult`]: crate::committee::AgentResult

use thiserror::Error;

// ── Registry errors ──────────────────────────────────────────────

/// Errors raised by [`ComponentRegistry`](crate::registry::ComponentRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A component with this name is already registered.
    #[error("component '{0}' is already registered")]
    DuplicateName(String),

    /// A registration or lookup used an empty name or malformed spec.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One or more mandatory dependencies were not registered first.
    #[error("missing dependencies for '{component}': {}. register them before '{component}'", missing.join(", "))]
    MissingDependency {
        /// The component being registered.
        component: String,
        /// Every mandatory dependency that is not yet registered.
        missing: Vec<String>,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The exact cycle path, ending where it started.
        cycle: Vec<String>,
    },

    /// The requested component was never registered.
    #[error("component '{0}' is not registered")]
    Unregistered(String),

    /// The component cannot be unregistered while others depend on it.
    #[error("cannot unregister '{name}': still required by {}", dependents.join(", "))]
    DependentsExist {
        /// The component being unregistered.
        name: String,
        /// Registrations that list it as a dependency.
        dependents: Vec<String>,
    },

    /// A component factory returned an error.
    #[error("factory for '{name}' failed")]
    FactoryFailed {
        /// The component whose factory failed.
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

// ── Pipeline errors ──────────────────────────────────────────────

/// Errors raised by [`ExecutionPipeline`](crate::pipeline::ExecutionPipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage with this name already exists.
    #[error("stage '{0}' already exists")]
    DuplicateStage(String),

    /// A stage was declared with no components.
    #[error("stage '{0}' has no components")]
    EmptyStage(String),

    /// A stage declaration used an empty name somewhere.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stage references components that are not in the registry.
    #[error("stage '{stage}' references unregistered components: {}", missing.join(", "))]
    UnknownComponents {
        /// The stage being added.
        stage: String,
        /// Component names absent from the registry.
        missing: Vec<String>,
    },

    /// A stage depends on a stage that does not exist.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownStageDependency {
        /// The stage with the bad edge.
        stage: String,
        /// The missing dependency stage.
        dependency: String,
    },

    /// The stage graph contains a cycle.
    #[error("circular stage dependency detected: {}", cycle.join(" -> "))]
    StageCycle {
        /// The exact cycle path, ending where it started.
        cycle: Vec<String>,
    },

    /// A stage was reached before one of its dependencies completed.
    #[error("precondition not met: stage '{dependency}' has not completed before '{stage}'")]
    IncompleteDependency {
        /// The stage about to run.
        stage: String,
        /// The dependency that is not completed.
        dependency: String,
    },

    /// Component resolution through the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A component's `run` failed; the whole execute call aborts.
    #[error("component '{component}' failed in stage '{stage}'")]
    ComponentFailed {
        /// The stage that was running.
        stage: String,
        /// The component that failed.
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

// ── Tests ────────────────────────────────────────────────────────
