//! The agent contract every committee participant implements.
//!
//! The orchestration core depends on nothing but this surface: an
//! [`Agent`] initializes, analyzes a [`CommitteeContext`] into an
//! [`AgentResult`], and shuts down. Concrete agents (LLM-backed
//! reviewers, static scanners) live outside this crate.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Agent result ─────────────────────────────────────────────────

/// Verdict of a single agent call. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the agent approves the artifact.
    pub approved: bool,
    /// Confidence score in `[0, 1]`.
    pub score: f64,
    /// Human-readable justification.
    pub reason: String,
    /// Opaque agent-specific payload (architecture plan, generated
    /// code, findings). `Null` when the agent has nothing to attach.
    #[serde(default)]
    pub data: Value,
}

impl AgentResult {
    /// An approving result.
    pub fn approved(score: f64, reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            score: score.clamp(0.0, 1.0),
            reason: reason.into(),
            data: Value::Null,
        }
    }

    /// A rejecting result.
    pub fn rejected(score: f64, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            score: score.clamp(0.0, 1.0),
            reason: reason.into(),
            data: Value::Null,
        }
    }

    /// Builder-style payload attachment.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

// ── Committee context ────────────────────────────────────────────

/// Context threaded through a committee run.
///
/// Starts with the request fields and accumulates phase outputs:
/// `architecture` after the architecture phase, `code` after the
/// implementation phase. Never mutated in place — each phase builds an
/// extended copy via the `with_*` methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeContext {
    /// The user's request.
    pub prompt: String,
    /// Target implementation language.
    pub language: String,
    /// Extracted requirements, if any.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Correlation identifier for this run.
    pub request_id: String,
    /// Architecture plan produced by the architecture phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Value>,
    /// Generated code produced by the implementation phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CommitteeContext {
    /// Minimal context for a fresh committee run.
    pub fn new(
        prompt: impl Into<String>,
        language: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            language: language.into(),
            requirements: Vec::new(),
            request_id: request_id.into(),
            architecture: None,
            code: None,
        }
    }

    /// Builder-style requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Extended copy carrying the architecture plan.
    #[must_use]
    pub fn with_architecture(&self, architecture: Value) -> Self {
        let mut next = self.clone();
        next.architecture = Some(architecture);
        next
    }

    /// Extended copy carrying the generated code and its language.
    #[must_use]
    pub fn with_code(&self, code: impl Into<String>, language: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.code = Some(code.into());
        next.language = language.into();
        next
    }
}

// ── Agent trait ──────────────────────────────────────────────────

/// A committee participant.
///
/// `analyze` is the sole entry point the orchestrator calls. Errors
/// returned from it (and timeouts) are absorbed into failing results
/// by the orchestrator, never propagated. Implementations enforce the
/// idle → working → idle|error state machine via a [`StateGate`] so
/// re-entrant calls made while working are rejected.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier used to key this agent's results.
    fn name(&self) -> &str;

    /// Prepare the agent. Idempotent; default is a no-op.
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Analyze the context and produce a verdict.
    async fn analyze(&self, context: &CommitteeContext) -> anyhow::Result<AgentResult>;

    /// Release agent resources. Default is a no-op.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── State gate ───────────────────────────────────────────────────

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Ready for the next analysis.
    Idle,
    /// Currently analyzing; re-entrant calls are rejected.
    Working,
    /// The last analysis failed; the next `begin` recovers.
    Error,
}

const STATE_IDLE: u8 = 0;
const STATE_WORKING: u8 = 1;
const STATE_ERROR: u8 = 2;

/// Atomic idle → working → idle|error gate for agent implementations.
///
/// Embed one in a concrete agent and call [`begin`](Self::begin) at
/// the top of `analyze`. The returned [`WorkGuard`] restores `Idle` on
/// [`complete`](WorkGuard::complete); dropping it without completing
/// records `Error` (covers both explicit failure paths and panics).
#[derive(Debug)]
pub struct StateGate {
    state: AtomicU8,
}

impl Default for StateGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGate {
    /// A gate starting in `Idle`.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_IDLE),
        }
    }

    /// Current state.
    pub fn state(&self) -> AgentState {
        match self.state.load(Ordering::Acquire) {
            STATE_WORKING => AgentState::Working,
            STATE_ERROR => AgentState::Error,
            _ => AgentState::Idle,
        }
    }

    /// Enter `Working`, rejecting re-entrant calls.
    ///
    /// Succeeds from `Idle` or `Error` (an errored agent may retry);
    /// fails while another analysis is in flight.
    pub fn begin(&self) -> anyhow::Result<WorkGuard<'_>> {
        let previous = self.state.swap(STATE_WORKING, Ordering::AcqRel);
        if previous == STATE_WORKING {
            anyhow::bail!("agent is already working; re-entrant analyze rejected");
        }
        Ok(WorkGuard { gate: self, done: false })
    }

    /// Reset to `Idle` regardless of current state.
    pub fn reset(&self) {
        self.state.store(STATE_IDLE, Ordering::Release);
    }
}

/// RAII guard for one analysis pass through a [`StateGate`].
#[derive(Debug)]
pub struct WorkGuard<'a> {
    gate: &'a StateGate,
    done: bool,
}

impl WorkGuard<'_> {
    /// Mark the analysis successful and return the gate to `Idle`.
    pub fn complete(mut self) {
        self.done = true;
        self.gate.state.store(STATE_IDLE, Ordering::Release);
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.gate.state.store(STATE_ERROR, Ordering::Release);
        }
    }
}

// ── Committee roles ──────────────────────────────────────────────

/// The eight fixed committee seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Defines structure before anything is coded (phase 1).
    Architect,
    /// Implements against the architecture (phase 2).
    Coder,
    /// General code review (phase 3).
    Reviewer,
    /// Security audit; rejection is a hard veto (phase 3).
    Security,
    /// Performance review (phase 3).
    Performance,
    /// Usability review (phase 3).
    Ux,
    /// Dynamic test execution (phase 4).
    Tester,
    /// Adversarial probing (phase 4).
    Adversary,
}

impl AgentRole {
    /// Stable name used to register and key agents.
    pub fn name(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Ux => "ux",
            Self::Tester => "tester",
            Self::Adversary => "adversary",
        }
    }

    /// Default consensus weight. Safety-critical seats dominate the
    /// weighted mean.
    pub fn default_weight(self) -> f64 {
        match self {
            Self::Security => 2.0,
            Self::Tester | Self::Architect => 1.5,
            Self::Adversary => 1.2,
            Self::Coder | Self::Reviewer | Self::Performance | Self::Ux => 1.0,
        }
    }

    /// Whether a rejection from this seat blocks approval outright.
    pub fn has_veto_power(self) -> bool {
        matches!(self, Self::Security | Self::Tester)
    }

    /// Passive reviewers, run in parallel during phase 3.
    pub const PASSIVE_REVIEWERS: [AgentRole; 4] =
        [Self::Reviewer, Self::Security, Self::Performance, Self::Ux];

    /// Active reviewers, run in parallel during phase 4.
    pub const ACTIVE_REVIEWERS: [AgentRole; 2] = [Self::Tester, Self::Adversary];

    /// All seats in phase order.
    pub const ALL: [AgentRole; 8] = [
        Self::Architect,
        Self::Coder,
        Self::Reviewer,
        Self::Security,
        Self::Performance,
        Self::Ux,
        Self::Tester,
        Self::Adversary,
    ];
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Tests ────────────────────────────────────────────────────────
