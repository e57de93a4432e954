//! Committee-reviewed artifact approval.
//!
//! codequorum coordinates a fixed committee of specialized reviewer
//! agents that approve or reject a generated artifact, and ships the
//! generic machinery that wires reviewers together:
//!
//! - [`registry`] — a name→instance [`ComponentRegistry`] with
//!   dependency injection, optional dependencies, and cycle detection.
//! - [`pipeline`] — an [`ExecutionPipeline`] applying the same
//!   dependency-resolution primitive to named stages of components.
//! - [`committee`] — the [`CommitteeOrchestrator`] running the fixed
//!   five-phase workflow with per-call timeouts, a hard security veto,
//!   and weighted [`ConsensusSystem`] scoring.
//!
//! Concrete agents (LLM-backed reviewers, static scanners) live
//! outside this crate; they implement the [`Agent`] trait and are
//! registered at a composition root. The same root constructs the
//! registry and pipeline explicitly — there is no process-wide
//! singleton anywhere.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use codequorum::committee::{Agent, AgentRole, CommitteeContext, CommitteeOrchestrator};
//! use codequorum::config::CommitteeConfig;
//!
//! # async fn example(security_agent: Arc<dyn Agent>) {
//! let config = CommitteeConfig::default();
//! let mut orchestrator = CommitteeOrchestrator::new(&config);
//! orchestrator.register_role(AgentRole::Security, security_agent);
//!
//! let context = CommitteeContext::new("build a csv parser", "rust", "req-1");
//! let outcome = orchestrator.run_committee(&context).await;
//! println!("approved: {} (score {:.2})", outcome.success, outcome.score);
//! # }
//! ```
//!
//! [`ComponentRegistry`]: registry::ComponentRegistry
//! [`ExecutionPipeline`]: pipeline::ExecutionPipeline
//! [`CommitteeOrchestrator`]: committee::CommitteeOrchestrator
//! [`ConsensusSystem`]: committee::ConsensusSystem
//! [`Agent`]: committee::Agent

pub mod committee;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use committee::{
    Agent, AgentResult, AgentRole, CommitteeContext, CommitteeOrchestrator, CommitteeOutcome,
    ConsensusSystem, Verdict,
};
pub use config::CommitteeConfig;
pub use error::{PipelineError, RegistryError};
pub use pipeline::{ComponentHandle, ExecutionContext, ExecutionPipeline, PipelineComponent};
pub use registry::{ComponentRegistry, DependencySpec, ResolutionContext, ResolvedDeps};
