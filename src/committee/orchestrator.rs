//! The committee orchestrator.
//!
//! Drives one committee run through five ordered phases:
//!
//! 1. **Architecture** — the architect defines structure (sequential,
//!    rejection terminates the run).
//! 2. **Implementation** — the coder implements against the
//!    architecture (sequential, same short-circuit rule).
//! 3. **Passive review** — reviewer, security, performance, and ux
//!    analyze the generated code in parallel. A security rejection is
//!    a hard veto: the run terminates, skipping phase 4 and consensus.
//! 4. **Active review** — tester and adversary run in parallel
//!    (heavier, dynamic checks).
//! 5. **Consensus** — every result feeds the weighted vote.
//!
//! Agent failures are data, not faults: every `analyze` call races a
//! per-run timeout, and a timeout or error becomes a synthetic failing
//! result instead of aborting the run. In-flight work is genuinely
//! cancelled on timeout because the agent's future is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::agent::{Agent, AgentResult, AgentRole, CommitteeContext};
use super::consensus::{ConsensusSystem, Verdict};
use crate::config::CommitteeConfig;

// ── Committee outcome ────────────────────────────────────────────

/// Everything a caller learns from one committee run.
#[derive(Debug, Clone)]
pub struct CommitteeOutcome {
    /// Whether the artifact was approved.
    pub success: bool,
    /// The consensus score (0.0 on short-circuit rejection).
    pub score: f64,
    /// The final verdict, from short-circuit or consensus.
    pub verdict: Verdict,
    /// Every agent result gathered before termination, keyed by name.
    pub agent_results: BTreeMap<String, AgentResult>,
    /// The generated code, when the implementation phase produced any.
    pub final_code: Option<String>,
    /// The architecture plan, when the architecture phase produced one.
    pub architecture: Option<Value>,
}

impl CommitteeOutcome {
    fn failed(verdict: Verdict, agent_results: BTreeMap<String, AgentResult>) -> Self {
        Self {
            success: false,
            score: verdict.score,
            verdict,
            agent_results,
            final_code: None,
            architecture: None,
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

/// Coordinates the fixed committee of specialized agents.
pub struct CommitteeOrchestrator {
    agents: HashMap<String, Arc<dyn Agent>>,
    consensus: ConsensusSystem,
    timeout: Duration,
    /// Bounds in-flight agent calls during the parallel phases.
    permits: Arc<Semaphore>,
}

impl CommitteeOrchestrator {
    /// Build an orchestrator from configuration.
    pub fn new(config: &CommitteeConfig) -> Self {
        Self {
            agents: HashMap::new(),
            consensus: ConsensusSystem::new(&config.consensus),
            timeout: Duration::from_millis(config.timeout_ms),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Register an agent under a committee seat name.
    ///
    /// Registering over an existing name replaces the previous agent.
    pub fn register_agent(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        let name = name.into();
        if self.agents.contains_key(&name) {
            tracing::warn!(agent = %name, "agent already registered; replacing");
        }
        self.agents.insert(name, agent);
    }

    /// Convenience: register an agent under its role's name.
    pub fn register_role(&mut self, role: AgentRole, agent: Arc<dyn Agent>) {
        self.register_agent(role.name(), agent);
    }

    /// Number of registered agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Initialize every registered agent. Idempotent per the contract.
    pub async fn initialize_all(&self) -> anyhow::Result<()> {
        for (name, agent) in &self.agents {
            agent
                .initialize()
                .await
                .map_err(|e| anyhow::anyhow!("agent '{name}' failed to initialize: {e}"))?;
        }
        Ok(())
    }

    /// Shut down every registered agent, continuing past failures.
    pub async fn shutdown_all(&self) {
        for (name, agent) in &self.agents {
            if let Err(e) = agent.shutdown().await {
                tracing::warn!(agent = %name, error = %e, "agent shutdown failed");
            }
        }
    }

    /// Run the full five-phase committee workflow.
    ///
    /// Never fails: every exit path — including both short-circuits —
    /// returns a structured [`CommitteeOutcome`].
    pub async fn run_committee(&self, context: &CommitteeContext) -> CommitteeOutcome {
        tracing::info!(request_id = %context.request_id, "committee run started");
        let mut results = BTreeMap::new();

        // Phase 1: architecture (sequential).
        let architect_result = self.run_agent(AgentRole::Architect.name(), context).await;
        let architecture = architect_result.data.clone();
        let architect_approved = architect_result.approved;
        let architect_reason = architect_result.reason.clone();
        results.insert(AgentRole::Architect.name().to_string(), architect_result);

        if !architect_approved {
            tracing::info!(request_id = %context.request_id, "rejected by architect");
            return CommitteeOutcome::failed(
                Verdict::rejected(format!("rejected by architect: {architect_reason}")),
                results,
            );
        }
        let context = context.with_architecture(architecture.clone());

        // Phase 2: implementation (sequential, sees the architecture).
        let coder_result = self.run_agent(AgentRole::Coder.name(), &context).await;
        let coder_approved = coder_result.approved;
        let coder_reason = coder_result.reason.clone();
        let code = coder_result.data.get("code").and_then(Value::as_str).map(str::to_string);
        let code_language = coder_result
            .data
            .get("language")
            .and_then(Value::as_str)
            .map(str::to_string);
        results.insert(AgentRole::Coder.name().to_string(), coder_result);

        if !coder_approved {
            tracing::info!(request_id = %context.request_id, "rejected by coder");
            return CommitteeOutcome::failed(
                Verdict::rejected(format!("implementation failed: {coder_reason}")),
                results,
            );
        }
        if code.is_none() {
            tracing::warn!(request_id = %context.request_id, "coder approved but attached no code");
        }
        let context = context.with_code(
            code.clone().unwrap_or_default(),
            code_language.unwrap_or_else(|| context.language.clone()),
        );

        // Phase 3: passive review (parallel). Security can veto.
        let passive: Vec<&str> = AgentRole::PASSIVE_REVIEWERS.iter().map(|r| r.name()).collect();
        results.extend(self.run_parallel(&passive, &context).await);

        if let Some(security) = results.get(AgentRole::Security.name()) {
            if !security.approved {
                tracing::warn!(request_id = %context.request_id, "security veto; skipping active review and consensus");
                return CommitteeOutcome::failed(
                    Verdict::vetoed(AgentRole::Security.name(), security.reason.clone()),
                    results,
                );
            }
        }

        // Phase 4: active review (parallel) — only without a veto.
        let active: Vec<&str> = AgentRole::ACTIVE_REVIEWERS.iter().map(|r| r.name()).collect();
        results.extend(self.run_parallel(&active, &context).await);

        // Phase 5: consensus over every result.
        let verdict = self.consensus.evaluate(&results);
        tracing::info!(
            request_id = %context.request_id,
            approved = verdict.approved,
            score = verdict.score,
            "committee run finished"
        );

        CommitteeOutcome {
            success: verdict.approved,
            score: verdict.score,
            verdict,
            agent_results: results,
            final_code: code,
            architecture: Some(architecture),
        }
    }

    /// Run one agent with the per-run timeout, absorbing failure.
    ///
    /// A missing agent yields a neutral pass-through rather than
    /// failing the run; a timeout or error yields a failing result.
    pub async fn run_agent(&self, name: &str, context: &CommitteeContext) -> AgentResult {
        let agent = self.agents.get(name).cloned();
        Self::run_agent_inner(agent, name.to_string(), context.clone(), self.timeout).await
    }

    async fn run_agent_inner(
        agent: Option<Arc<dyn Agent>>,
        name: String,
        context: CommitteeContext,
        timeout: Duration,
    ) -> AgentResult {
        let Some(agent) = agent else {
            tracing::warn!(agent = %name, "agent not registered; skipping");
            return AgentResult::approved(0.5, "agent not registered (skipped)");
        };

        // Dropping the analyze future on timeout cancels the work; no
        // detached continuation keeps running behind the committee.
        match tokio::time::timeout(timeout, agent.analyze(&context)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(agent = %name, error = %e, "agent failed; recording failing result");
                AgentResult::rejected(0.0, format!("agent error: {e}"))
            }
            Err(_) => {
                tracing::error!(agent = %name, timeout_ms = timeout.as_millis() as u64, "agent timed out");
                AgentResult::rejected(0.0, format!("timeout after {}ms", timeout.as_millis()))
            }
        }
    }

    /// Run a set of agents concurrently, bounded by the configured
    /// concurrency cap, and wait for every one to settle.
    ///
    /// Each call self-isolates failure, so no additional short-circuit
    /// logic is needed here; results merge on the awaiting side.
    pub async fn run_parallel(
        &self,
        names: &[&str],
        context: &CommitteeContext,
    ) -> BTreeMap<String, AgentResult> {
        let mut tasks = JoinSet::new();
        for name in names {
            let agent = self.agents.get(*name).cloned();
            let name = (*name).to_string();
            let context = context.clone();
            let timeout = self.timeout;
            let permits = Arc::clone(&self.permits);

            tasks.spawn(async move {
                // A closed semaphore is unreachable: the orchestrator
                // owns it and never closes it.
                let _permit = permits.acquire_owned().await;
                let result = Self::run_agent_inner(agent, name.clone(), context, timeout).await;
                (name, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result)) => {
                    results.insert(name, result);
                }
                Err(e) => {
                    // A panicked agent task is absorbed like any other
                    // agent failure; the phase still settles.
                    tracing::error!(error = %e, "agent task panicked");
                }
            }
        }
        results
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::agent::StateGate;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted agent returning a fixed result, tracking invocation.
    struct Scripted {
        name: String,
        result: AgentResult,
        invoked: Arc<AtomicBool>,
        gate: StateGate,
    }

    impl Scripted {
        fn new(name: &str, result: AgentResult) -> (Arc<Self>, Arc<AtomicBool>) {
            let invoked = Arc::new(AtomicBool::new(false));
            let agent = Arc::new(Self {
                name: name.to_string(),
                result,
                invoked: Arc::clone(&invoked),
                gate: StateGate::new(),
            });
            (agent, invoked)
        }
    }

    #[async_trait]
    impl Agent for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn analyze(&self, _context: &CommitteeContext) -> anyhow::Result<AgentResult> {
            let guard = self.gate.begin()?;
            self.invoked.store(true, Ordering::SeqCst);
            let result = self.result.clone();
            guard.complete();
            Ok(result)
        }
    }

    /// Agent that never settles.
    struct Hanging {
        name: String,
    }

    #[async_trait]
    impl Agent for Hanging {
        fn name(&self) -> &str {
            &self.name
        }

        async fn analyze(&self, _context: &CommitteeContext) -> anyhow::Result<AgentResult> {
            std::future::pending::<()>().await;
            unreachable!("pending future settled")
        }
    }

    fn config_with_timeout_ms(timeout_ms: u64) -> CommitteeConfig {
        CommitteeConfig {
            timeout_ms,
            ..CommitteeConfig::default()
        }
    }

    fn context() -> CommitteeContext {
        CommitteeContext::new("build a csv parser", "rust", "req-42")
    }

    fn approving(name: &str, score: f64) -> Arc<Scripted> {
        Scripted::new(name, AgentResult::approved(score, "looks good")).0
    }

    fn full_committee(orchestrator: &mut CommitteeOrchestrator) {
        orchestrator.register_role(
            AgentRole::Architect,
            Scripted::new(
                "architect",
                AgentResult::approved(0.95, "solid structure")
                    .with_data(json!({ "pattern": "pipeline" })),
            )
            .0,
        );
        orchestrator.register_role(
            AgentRole::Coder,
            Scripted::new(
                "coder",
                AgentResult::approved(0.9, "implemented")
                    .with_data(json!({ "code": "fn main() {}", "language": "rust" })),
            )
            .0,
        );
        for role in AgentRole::PASSIVE_REVIEWERS {
            orchestrator.register_role(role, approving(role.name(), 0.9));
        }
        for role in AgentRole::ACTIVE_REVIEWERS {
            orchestrator.register_role(role, approving(role.name(), 0.9));
        }
    }

    #[tokio::test]
    async fn happy_path_approves_with_consensus() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        full_committee(&mut orchestrator);

        let outcome = orchestrator.run_committee(&context()).await;
        assert!(outcome.success);
        assert!(outcome.verdict.approved);
        assert!(!outcome.verdict.vetoed);
        assert_eq!(outcome.final_code.as_deref(), Some("fn main() {}"));
        assert_eq!(outcome.architecture, Some(json!({ "pattern": "pipeline" })));
        assert_eq!(outcome.agent_results.len(), 8);
    }

    #[tokio::test]
    async fn architect_rejection_short_circuits() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        orchestrator.register_role(
            AgentRole::Architect,
            Scripted::new("architect", AgentResult::rejected(0.2, "requirements unclear")).0,
        );
        let (coder, coder_invoked) = Scripted::new(
            "coder",
            AgentResult::approved(0.9, "implemented"),
        );
        orchestrator.register_role(AgentRole::Coder, coder);

        let outcome = orchestrator.run_committee(&context()).await;
        assert!(!outcome.success);
        assert!(!outcome.verdict.vetoed);
        assert!(outcome.verdict.reasons[0].contains("architect"));
        // The coder is never invoked after an architect rejection.
        assert!(!coder_invoked.load(Ordering::SeqCst));
        assert_eq!(outcome.agent_results.len(), 1);
    }

    #[tokio::test]
    async fn coder_rejection_short_circuits() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        orchestrator.register_role(
            AgentRole::Architect,
            Scripted::new("architect", AgentResult::approved(0.9, "fine")).0,
        );
        orchestrator.register_role(
            AgentRole::Coder,
            Scripted::new("coder", AgentResult::rejected(0.1, "could not implement")).0,
        );
        let (reviewer, reviewer_invoked) =
            Scripted::new("reviewer", AgentResult::approved(0.9, "fine"));
        orchestrator.register_role(AgentRole::Reviewer, reviewer);

        let outcome = orchestrator.run_committee(&context()).await;
        assert!(!outcome.success);
        assert!(outcome.verdict.reasons[0].contains("implementation failed"));
        assert!(!reviewer_invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn security_rejection_vetoes_and_skips_active_review() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        full_committee(&mut orchestrator);
        orchestrator.register_role(
            AgentRole::Security,
            Scripted::new("security", AgentResult::rejected(0.0, "hardcoded credentials")).0,
        );
        let (tester, tester_invoked) =
            Scripted::new("tester", AgentResult::approved(0.9, "all green"));
        orchestrator.register_role(AgentRole::Tester, tester);

        let outcome = orchestrator.run_committee(&context()).await;
        assert!(!outcome.success);
        assert!(outcome.verdict.vetoed);
        assert_eq!(outcome.verdict.veto_source.as_deref(), Some("security"));
        assert!(outcome.verdict.reasons[0].starts_with("VETO by security"));
        // Phase 4 (and with it consensus over active results) never ran.
        assert!(!tester_invoked.load(Ordering::SeqCst));
        assert!(!outcome.agent_results.contains_key("tester"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_agent_becomes_failing_result() {
        let mut orchestrator = CommitteeOrchestrator::new(&config_with_timeout_ms(200));
        full_committee(&mut orchestrator);
        orchestrator.register_role(
            AgentRole::Performance,
            Arc::new(Hanging { name: "performance".into() }),
        );

        // The run still settles (paused time auto-advances past the
        // timeout) with the hung agent recorded as failing.
        let outcome = orchestrator.run_committee(&context()).await;
        let perf = &outcome.agent_results["performance"];
        assert!(!perf.approved);
        assert_eq!(perf.score, 0.0);
        assert!(perf.reason.contains("timeout"));
        // The rest of the committee was unaffected.
        assert!(outcome.agent_results["reviewer"].approved);
    }

    #[tokio::test]
    async fn erroring_agent_becomes_failing_result() {
        struct Exploding;

        #[async_trait]
        impl Agent for Exploding {
            fn name(&self) -> &str {
                "ux"
            }
            async fn analyze(&self, _: &CommitteeContext) -> anyhow::Result<AgentResult> {
                anyhow::bail!("model backend unavailable")
            }
        }

        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        full_committee(&mut orchestrator);
        orchestrator.register_role(AgentRole::Ux, Arc::new(Exploding));

        let outcome = orchestrator.run_committee(&context()).await;
        let ux = &outcome.agent_results["ux"];
        assert!(!ux.approved);
        assert!(ux.reason.contains("model backend unavailable"));
    }

    #[tokio::test]
    async fn unregistered_agent_yields_neutral_pass() {
        let orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        let result = orchestrator.run_agent("architect", &context()).await;
        assert!(result.approved);
        assert_eq!(result.score, 0.5);
        assert!(result.reason.contains("not registered"));
    }

    #[tokio::test]
    async fn run_parallel_settles_every_sibling() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        for name in ["reviewer", "security", "performance", "ux"] {
            orchestrator.register_agent(name, approving(name, 0.8));
        }

        let results = orchestrator
            .run_parallel(&["reviewer", "security", "performance", "ux"], &context())
            .await;
        assert_eq!(results.len(), 4);
        assert!(results.values().all(|r| r.approved));
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_in_flight_calls() {
        struct Counting {
            name: String,
            in_flight: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Agent for Counting {
            fn name(&self) -> &str {
                &self.name
            }

            async fn analyze(&self, _: &CommitteeContext) -> anyhow::Result<AgentResult> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(AgentResult::approved(0.9, "ok"))
            }
        }

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let config = CommitteeConfig {
            max_concurrent: 2,
            ..CommitteeConfig::default()
        };
        let mut orchestrator = CommitteeOrchestrator::new(&config);
        let names = ["reviewer", "security", "performance", "ux"];
        for name in names {
            orchestrator.register_agent(
                name,
                Arc::new(Counting {
                    name: name.to_string(),
                    in_flight: Arc::clone(&in_flight),
                    peak: Arc::clone(&peak),
                }),
            );
        }

        let results = orchestrator.run_parallel(&names, &context()).await;
        assert_eq!(results.len(), 4);
        assert!(peak.load(Ordering::SeqCst) <= 2, "cap exceeded");
    }

    #[tokio::test]
    async fn replacing_registration_warns_and_replaces() {
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        orchestrator.register_agent("reviewer", approving("reviewer", 0.3));
        orchestrator.register_agent("reviewer", approving("reviewer", 0.9));
        assert_eq!(orchestrator.agent_count(), 1);

        let result = orchestrator.run_agent("reviewer", &context()).await;
        assert_eq!(result.score, 0.9);
    }

    #[tokio::test]
    async fn context_accumulates_across_phases() {
        struct ContextProbe {
            name: String,
            saw_architecture: Arc<AtomicBool>,
            saw_code: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Agent for ContextProbe {
            fn name(&self) -> &str {
                &self.name
            }

            async fn analyze(&self, ctx: &CommitteeContext) -> anyhow::Result<AgentResult> {
                self.saw_architecture
                    .store(ctx.architecture.is_some(), Ordering::SeqCst);
                self.saw_code.store(ctx.code.is_some(), Ordering::SeqCst);
                Ok(AgentResult::approved(0.9, "ok"))
            }
        }

        let saw_architecture = Arc::new(AtomicBool::new(false));
        let saw_code = Arc::new(AtomicBool::new(false));
        let mut orchestrator = CommitteeOrchestrator::new(&CommitteeConfig::default());
        full_committee(&mut orchestrator);
        orchestrator.register_role(
            AgentRole::Reviewer,
            Arc::new(ContextProbe {
                name: "reviewer".into(),
                saw_architecture: Arc::clone(&saw_architecture),
                saw_code: Arc::clone(&saw_code),
            }),
        );

        orchestrator.run_committee(&context()).await;
        assert!(saw_architecture.load(Ordering::SeqCst));
        assert!(saw_code.load(Ordering::SeqCst));
    }
}
