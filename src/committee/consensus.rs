//! Weighted consensus over per-agent results.
//!
//! Aggregates every committee result into a single [`Verdict`]: a
//! weighted mean of agent scores checked against an approval
//! threshold, with veto-capable seats able to block approval outright.
//!
//! Consensus never *sets* `vetoed` — that flag belongs exclusively to
//! the orchestrator's phase-3 security short-circuit. A veto-capable
//! agent rejecting here still forces `approved = false`, but as an
//! ordinary blocked approval with the reason listed first.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::agent::{AgentResult, AgentRole};
use crate::config::ConsensusConfig;

// ── Verdict ──────────────────────────────────────────────────────

/// Terminal output of a committee run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the committee approves the artifact.
    pub approved: bool,
    /// Weighted mean score across all participating agents.
    pub score: f64,
    /// Rejection reasons; empty on approval.
    pub reasons: Vec<String>,
    /// Set only by the orchestrator's security short-circuit.
    pub vetoed: bool,
    /// The agent whose rejection blocked approval, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_source: Option<String>,
}

impl Verdict {
    /// A short-circuit rejection (architect or coder said no).
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            score: 0.0,
            reasons: vec![reason.into()],
            vetoed: false,
            veto_source: None,
        }
    }

    /// The orchestrator's security veto.
    pub fn vetoed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            approved: false,
            score: 0.0,
            reasons: vec![format!("VETO by {source}: {}", reason.into())],
            vetoed: true,
            veto_source: Some(source),
        }
    }
}

// ── Consensus system ─────────────────────────────────────────────

/// Weighted voting over agent results.
pub struct ConsensusSystem {
    weights: HashMap<String, f64>,
    veto_power: Vec<String>,
    threshold: f64,
}

impl Default for ConsensusSystem {
    fn default() -> Self {
        Self::new(&ConsensusConfig::default())
    }
}

impl ConsensusSystem {
    /// Build from configuration. Unconfigured agents fall back to
    /// their role's default weight, then to 1.0.
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            veto_power: config.veto_power.clone(),
            threshold: config.threshold,
        }
    }

    /// The approval threshold in effect.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn weight_for(&self, name: &str) -> f64 {
        if let Some(w) = self.weights.get(name) {
            return *w;
        }
        AgentRole::ALL
            .iter()
            .find(|r| r.name() == name)
            .map_or(1.0, |r| r.default_weight())
    }

    fn has_veto_power(&self, name: &str) -> bool {
        if !self.veto_power.is_empty() {
            return self.veto_power.iter().any(|v| v == name);
        }
        AgentRole::ALL
            .iter()
            .find(|r| r.name() == name)
            .is_some_and(|r| r.has_veto_power())
    }

    /// Aggregate all agent results into a final verdict.
    ///
    /// `score` is the weighted mean of every present result's score;
    /// rejected results contribute zero to the numerator but their
    /// weight stays in the denominator. `approved` requires the score
    /// to clear the threshold *and* no veto-capable seat to have
    /// rejected.
    pub fn evaluate(&self, results: &BTreeMap<String, AgentResult>) -> Verdict {
        let mut total_weight = 0.0;
        let mut approval_score = 0.0;
        let mut reasons = Vec::new();
        let mut veto_reason: Option<String> = None;
        let mut veto_source: Option<String> = None;

        for (name, result) in results {
            let weight = self.weight_for(name);
            total_weight += weight;

            if self.has_veto_power(name) && !result.approved {
                tracing::warn!(agent = %name, reason = %result.reason, "veto-capable agent rejected");
                if veto_reason.is_none() {
                    veto_reason = Some(format!("VETO by {name}: {}", result.reason));
                    veto_source = Some(name.clone());
                }
            }

            if result.approved {
                approval_score += result.score * weight;
            } else if !result.reason.is_empty() {
                reasons.push(format!("[{name}] rejected: {}", result.reason));
            }
        }

        let score = if total_weight > 0.0 {
            approval_score / total_weight
        } else {
            0.0
        };

        // A veto condition blocks approval outright but is still an
        // ordinary rejection: `vetoed` is the orchestrator's flag.
        if let Some(veto) = veto_reason {
            let mut all_reasons = vec![veto];
            all_reasons.extend(reasons);
            return Verdict {
                approved: false,
                score,
                reasons: all_reasons,
                vetoed: false,
                veto_source,
            };
        }

        let approved = score >= self.threshold;
        tracing::info!(approved, score, threshold = self.threshold, "consensus computed");
        Verdict {
            approved,
            score,
            reasons: if approved { Vec::new() } else { reasons },
            vetoed: false,
            veto_source: None,
        }
    }

    /// Casting-vote override for verdicts in the uncertainty zone.
    ///
    /// When the score lands within ±0.05 of the threshold, the
    /// orchestrator's own judgment settles the call. Vetoed verdicts
    /// are never overturned.
    pub fn resolve_tie(&self, orchestrator_decision: bool, verdict: Verdict) -> Verdict {
        if verdict.vetoed {
            return verdict;
        }

        const MARGIN: f64 = 0.05;
        if (verdict.score - self.threshold).abs() <= MARGIN {
            tracing::info!(decision = orchestrator_decision, "casting vote applied");
            let mut next = verdict;
            next.approved = orchestrator_decision;
            next.reasons.push(format!(
                "casting vote: {}",
                if orchestrator_decision { "approved" } else { "rejected" }
            ));
            return next;
        }
        verdict
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn results_from(entries: &[(&str, bool, f64)]) -> BTreeMap<String, AgentResult> {
        entries
            .iter()
            .map(|(name, approved, score)| {
                let result = if *approved {
                    AgentResult::approved(*score, "ok")
                } else {
                    AgentResult::rejected(*score, "not ok")
                };
                ((*name).to_string(), result)
            })
            .collect()
    }

    fn equal_weight_system(threshold: f64) -> ConsensusSystem {
        let names = ["reviewer", "security", "performance", "ux"];
        ConsensusSystem::new(&ConsensusConfig {
            threshold,
            weights: names.iter().map(|n| ((*n).to_string(), 1.0)).collect(),
            veto_power: vec!["security".into()],
        })
    }

    #[test]
    fn four_validators_equal_weights() {
        let system = equal_weight_system(0.7);
        let results = results_from(&[
            ("reviewer", true, 0.9),
            ("security", true, 0.9),
            ("performance", true, 0.9),
            ("ux", true, 0.9),
        ]);

        let verdict = system.evaluate(&results);
        assert!((verdict.score - 0.9).abs() < 1e-9);
        assert!(verdict.approved);
        assert!(verdict.reasons.is_empty());
        assert!(!verdict.vetoed);
    }

    #[test]
    fn below_threshold_rejects_with_reasons() {
        let system = equal_weight_system(0.7);
        let results = results_from(&[
            ("reviewer", true, 0.6),
            ("performance", false, 0.2),
        ]);

        let verdict = system.evaluate(&results);
        assert!(!verdict.approved);
        assert!(verdict.score < 0.7);
        assert!(verdict.reasons.iter().any(|r| r.contains("performance")));
        assert!(!verdict.vetoed);
    }

    #[test]
    fn veto_capable_rejection_blocks_despite_high_score() {
        let system = ConsensusSystem::default();
        let mut results = results_from(&[
            ("architect", true, 1.0),
            ("coder", true, 1.0),
            ("reviewer", true, 1.0),
            ("performance", true, 1.0),
            ("ux", true, 1.0),
            ("adversary", true, 1.0),
        ]);
        results.insert(
            "tester".into(),
            AgentResult::rejected(0.0, "three tests failed"),
        );

        let verdict = system.evaluate(&results);
        assert!(!verdict.approved);
        // Consensus never sets the orchestrator's veto flag.
        assert!(!verdict.vetoed);
        assert_eq!(verdict.veto_source.as_deref(), Some("tester"));
        assert!(verdict.reasons[0].starts_with("VETO by tester"));
    }

    #[test]
    fn safety_critical_weight_dominates() {
        // security (weight 2.0) scoring low must drag the mean below
        // what equal weighting would give.
        let system = ConsensusSystem::new(&ConsensusConfig::default());
        let results = results_from(&[
            ("security", true, 0.2),
            ("reviewer", true, 1.0),
        ]);
        let verdict = system.evaluate(&results);
        // (0.2*2.0 + 1.0*1.0) / 3.0 ≈ 0.467 < equal-weight 0.6
        assert!((verdict.score - (0.2 * 2.0 + 1.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_agent_defaults_to_unit_weight() {
        let system = ConsensusSystem::default();
        let results = results_from(&[("custom-linter", true, 0.8)]);
        let verdict = system.evaluate(&results);
        assert!((verdict.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_results_reject() {
        let system = ConsensusSystem::default();
        let verdict = system.evaluate(&BTreeMap::new());
        assert!(!verdict.approved);
        assert_eq!(verdict.score, 0.0);
    }

    #[test]
    fn resolve_tie_flips_inside_margin() {
        let system = equal_weight_system(0.7);
        let verdict = Verdict {
            approved: false,
            score: 0.68,
            reasons: vec!["[ux] rejected: unclear flow".into()],
            vetoed: false,
            veto_source: None,
        };

        let resolved = system.resolve_tie(true, verdict);
        assert!(resolved.approved);
        assert!(resolved.reasons.iter().any(|r| r.contains("casting vote")));
    }

    #[test]
    fn resolve_tie_ignores_outside_margin() {
        let system = equal_weight_system(0.7);
        let verdict = Verdict {
            approved: false,
            score: 0.4,
            reasons: vec![],
            vetoed: false,
            veto_source: None,
        };
        let resolved = system.resolve_tie(true, verdict);
        assert!(!resolved.approved);
    }

    #[test]
    fn resolve_tie_never_overturns_veto() {
        let system = equal_weight_system(0.7);
        let verdict = Verdict::vetoed("security", "hardcoded credentials");
        let resolved = system.resolve_tie(true, verdict);
        assert!(!resolved.approved);
        assert!(resolved.vetoed);
    }

    #[test]
    fn vetoed_constructor_formats_reason() {
        let verdict = Verdict::vetoed("security", "sql injection");
        assert!(verdict.vetoed);
        assert_eq!(verdict.veto_source.as_deref(), Some("security"));
        assert_eq!(verdict.reasons, vec!["VETO by security: sql injection"]);
    }
}
