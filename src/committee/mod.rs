//! Multi-agent committee orchestration.
//!
//! A committee run takes one request through five ordered phases:
//!
//! ```text
//! context ─▸ architect ─▸ coder ─┬─▸ reviewer    ─┐
//!              (seq)      (seq)  ├─▸ security    ─┤  parallel
//!                                ├─▸ performance ─┤  (phase 3)
//!                                └─▸ ux          ─┘
//!                                        │ no veto
//!                                ┌─▸ tester    ─┐  parallel
//!                                └─▸ adversary ─┘  (phase 4)
//!                                        │
//!                                   consensus ─▸ Verdict
//! ```
//!
//! Rejections by the architect or coder terminate the run early; a
//! security rejection in phase 3 is a hard veto that skips phase 4
//! and consensus entirely. Every other agent failure — timeout,
//! error, panic — is absorbed into a failing result and weighed by
//! consensus like any other vote.
//!
//! ## Extension
//!
//! Implement [`Agent`] and register the instance under its seat name
//! via [`CommitteeOrchestrator::register_role`].

pub mod agent;
pub mod consensus;
pub mod orchestrator;

pub use agent::{Agent, AgentResult, AgentRole, AgentState, CommitteeContext, StateGate};
pub use consensus::{ConsensusSystem, Verdict};
pub use orchestrator::{CommitteeOrchestrator, CommitteeOutcome};
