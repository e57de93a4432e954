//! Committee configuration.
//!
//! Plain serde-deserialized settings with working defaults: a config
//! file is optional, and every field may be omitted. TOML is the only
//! on-disk format.
//!
//! ```toml
//! timeout_ms = 30000
//! max_concurrent = 4
//!
//! [consensus]
//! threshold = 0.7
//! veto_power = ["security", "tester"]
//!
//! [consensus.weights]
//! security = 2.0
//! tester = 1.5
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Default per-agent-call timeout: one minute.
const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default bound on in-flight agent calls in the parallel phases.
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default approval threshold for the weighted consensus score.
const DEFAULT_THRESHOLD: f64 = 0.7;

// ── Committee config ─────────────────────────────────────────────

/// Top-level configuration for the committee orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeConfig {
    /// Per agent call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum in-flight agent calls during parallel phases.
    pub max_concurrent: usize,
    /// Consensus scoring settings.
    pub consensus: ConsensusConfig,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            consensus: ConsensusConfig::default(),
        }
    }
}

/// Consensus scoring settings.
///
/// Empty `weights`/`veto_power` fall back to the per-role defaults
/// (security weight 2.0 with veto, tester 1.5 with veto, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Approval threshold for the weighted mean score, in `[0, 1]`.
    pub threshold: f64,
    /// Per-agent weight overrides keyed by agent name.
    pub weights: HashMap<String, f64>,
    /// Agents whose rejection blocks approval regardless of score.
    pub veto_power: Vec<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            weights: HashMap::new(),
            veto_power: Vec::new(),
        }
    }
}

impl CommitteeConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid committee config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than zero");
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.consensus.threshold) {
            anyhow::bail!(
                "consensus.threshold must be within [0, 1], got {}",
                self.consensus.threshold
            );
        }
        if let Some((name, weight)) = self
            .consensus
            .weights
            .iter()
            .find(|(_, w)| **w < 0.0 || !w.is_finite())
        {
            anyhow::bail!("weight for '{name}' must be a non-negative finite number, got {weight}");
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
