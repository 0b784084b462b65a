//! # Scheduler Configuration
//!
//! TOML is parsed into [`SchedulerConfigInput`], where every field is
//! optional, and [`SchedulerConfigInput::resolve`] validates it into a
//! [`SchedulerConfig`] holding the policy parameters and the engine
//! settings (hierarchy preset, queue limit, pacing).
//!
//! ```toml
//! version = 1
//! policy = "wrr"          # "wrr", "wrr-fixed" or "credit"
//! hierarchy = "single"
//! pacing_us = 10000
//!
//! [wrr]
//! quantums = [20000, 10000, 2000]
//!
//! [queue_limit]
//! max_depth = 1024
//! overflow = "drop-tail"
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::clock::Pacer;
use crate::error::ConfigError;
use crate::flow_table::{OverflowPolicy, QueueLimit};
use crate::packet::FlowId;
use crate::policy::credit::{
    default_buckets, CreditBucket, CreditPolicy, DEFAULT_ACTIVATION_MS, DEFAULT_COST,
    DEFAULT_REFILL_PERIOD_MS,
};
use crate::policy::wrr::WrrPolicy;
use crate::policy::BoxedPolicy;
use crate::router::{HierarchyLayout, HierarchyPreset};

pub const CONFIG_VERSION: u32 = 1;

/// Quantums used when none are configured.
pub const DEFAULT_QUANTUMS: [u32; 3] = [20_000, 10_000, 2_000];

// ─── Input (as parsed) ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// WRR with runtime-adjustable quantums.
    #[default]
    Wrr,
    /// WRR with quantums fixed at construction.
    WrrFixed,
    Credit,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfigInput {
    pub version: u32,
    pub policy: PolicyKind,
    pub hierarchy: HierarchyPreset,
    pub pacing_us: Option<u64>,
    pub wrr: WrrConfigInput,
    pub credit: CreditConfigInput,
    pub queue_limit: QueueLimitInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WrrConfigInput {
    pub quantums: Option<Vec<u32>>,
    pub initial_quotas: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreditConfigInput {
    pub activation_ms: Option<u64>,
    pub refill_period_ms: Option<u64>,
    pub cost: Option<u32>,
    pub buckets: Option<Vec<CreditBucketInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreditBucketInput {
    pub nominal: u32,
    pub flows: Vec<FlowId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueLimitInput {
    pub max_depth: Option<usize>,
    pub overflow: OverflowPolicy,
}

// ─── Resolved ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrrConfig {
    pub quantums: Vec<u32>,
    pub initial_quotas: Vec<u32>,
    pub runtime_quantum: bool,
}

impl Default for WrrConfig {
    fn default() -> Self {
        Self {
            quantums: DEFAULT_QUANTUMS.to_vec(),
            initial_quotas: DEFAULT_QUANTUMS.to_vec(),
            runtime_quantum: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditConfig {
    pub activation_ms: u64,
    pub refill_period_ms: u64,
    pub cost: u32,
    pub buckets: Vec<CreditBucket>,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            activation_ms: DEFAULT_ACTIVATION_MS,
            refill_period_ms: DEFAULT_REFILL_PERIOD_MS,
            cost: DEFAULT_COST,
            buckets: default_buckets(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfig {
    Wrr(WrrConfig),
    Credit(CreditConfig),
}

impl PolicyConfig {
    pub fn build(&self) -> BoxedPolicy {
        match self {
            PolicyConfig::Wrr(wrr) => {
                let policy = if wrr.runtime_quantum {
                    WrrPolicy::new(wrr.quantums.clone())
                } else {
                    WrrPolicy::fixed(wrr.quantums.clone())
                };
                Box::new(policy.with_initial_quotas(&wrr.initial_quotas))
            }
            PolicyConfig::Credit(credit) => Box::new(
                CreditPolicy::new(credit.buckets.clone())
                    .activation_ms(credit.activation_ms)
                    .refill_period_ms(credit.refill_period_ms)
                    .cost(credit.cost),
            ),
        }
    }

    /// Flows `0..n` the built policy will scan.
    pub fn flow_count(&self) -> usize {
        match self {
            PolicyConfig::Wrr(wrr) => wrr.quantums.len(),
            PolicyConfig::Credit(credit) => credit
                .buckets
                .iter()
                .flat_map(|b| b.flows.iter())
                .map(|&flow| flow as usize + 1)
                .max()
                .unwrap_or(0),
        }
    }

    fn default_pacer(&self) -> Pacer {
        match self {
            PolicyConfig::Wrr(_) => Pacer::WRR,
            PolicyConfig::Credit(_) => Pacer::CREDIT,
        }
    }
}

/// Policy-independent engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub hierarchy: HierarchyLayout,
    pub queue_limit: QueueLimit,
    pub pacer: Pacer,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hierarchy: HierarchyLayout::default(),
            queue_limit: QueueLimit::UNBOUNDED,
            pacer: Pacer::WRR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub version: u32,
    pub policy: PolicyConfig,
    pub engine: EngineConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            policy: PolicyConfig::Wrr(WrrConfig::default()),
            engine: EngineConfig::default(),
        }
    }
}

impl SchedulerConfigInput {
    pub fn resolve(self) -> Result<SchedulerConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let policy = match self.policy {
            PolicyKind::Wrr => PolicyConfig::Wrr(self.wrr.resolve(true)?),
            PolicyKind::WrrFixed => PolicyConfig::Wrr(self.wrr.resolve(false)?),
            PolicyKind::Credit => PolicyConfig::Credit(self.credit.resolve()?),
        };

        let hierarchy = HierarchyLayout::preset(self.hierarchy);
        let flows = policy.flow_count();
        if flows > hierarchy.leaf_flows() {
            return Err(ConfigError::Invalid(format!(
                "{} flows exceed the {} leaf slots of the {:?} hierarchy",
                flows,
                hierarchy.leaf_flows(),
                self.hierarchy
            )));
        }

        let queue_limit = match self.queue_limit.max_depth {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "queue_limit.max_depth must be at least 1".into(),
                ))
            }
            Some(depth) => QueueLimit::bounded(depth, self.queue_limit.overflow),
            None => QueueLimit::UNBOUNDED,
        };

        let pacer = self
            .pacing_us
            .map(|us| Pacer::new(Duration::from_micros(us)))
            .unwrap_or_else(|| policy.default_pacer());

        Ok(SchedulerConfig {
            version,
            policy,
            engine: EngineConfig {
                hierarchy,
                queue_limit,
                pacer,
            },
        })
    }
}

impl WrrConfigInput {
    fn resolve(self, runtime_quantum: bool) -> Result<WrrConfig, ConfigError> {
        let quantums = self.quantums.unwrap_or_else(|| DEFAULT_QUANTUMS.to_vec());
        if quantums.is_empty() {
            return Err(ConfigError::Invalid("wrr.quantums must not be empty".into()));
        }
        if let Some(index) = quantums.iter().position(|&q| q == 0) {
            return Err(ConfigError::Invalid(format!(
                "wrr.quantums[{}] must be non-zero",
                index
            )));
        }

        let initial_quotas = self.initial_quotas.unwrap_or_else(|| quantums.clone());
        if initial_quotas.len() != quantums.len() {
            return Err(ConfigError::Invalid(format!(
                "wrr.initial_quotas has {} entries, expected {}",
                initial_quotas.len(),
                quantums.len()
            )));
        }

        Ok(WrrConfig {
            quantums,
            initial_quotas,
            runtime_quantum,
        })
    }
}

impl CreditConfigInput {
    fn resolve(self) -> Result<CreditConfig, ConfigError> {
        let refill_period_ms = self.refill_period_ms.unwrap_or(DEFAULT_REFILL_PERIOD_MS);
        if refill_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "credit.refill_period_ms must be non-zero".into(),
            ));
        }

        let buckets = match self.buckets {
            None => default_buckets(),
            Some(inputs) => {
                if inputs.is_empty() {
                    return Err(ConfigError::Invalid(
                        "credit.buckets must not be empty".into(),
                    ));
                }
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(inputs.len());
                for (idx, bucket) in inputs.into_iter().enumerate() {
                    if bucket.flows.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "credit.buckets[{}] owns no flows",
                            idx
                        )));
                    }
                    if let Some(flow) = bucket.flows.iter().find(|&&f| !seen.insert(f)) {
                        return Err(ConfigError::Invalid(format!(
                            "flow {} belongs to more than one credit bucket",
                            flow
                        )));
                    }
                    out.push(CreditBucket::new(bucket.nominal, bucket.flows));
                }
                out
            }
        };

        Ok(CreditConfig {
            activation_ms: self.activation_ms.unwrap_or(DEFAULT_ACTIVATION_MS),
            refill_period_ms,
            cost: self.cost.unwrap_or(DEFAULT_COST),
            buckets,
        })
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(SchedulerConfig::default());
        }
        let parsed: SchedulerConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn build_policy(&self) -> BoxedPolicy {
        self.policy.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let cfg = SchedulerConfig::from_toml_str("  ").unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
        let policy = cfg.build_policy();
        assert_eq!(policy.name(), "wrr");
        assert_eq!(policy.quantums(), Some(&DEFAULT_QUANTUMS[..]));
        assert_eq!(cfg.engine.pacer, Pacer::WRR);
    }

    #[test]
    fn parse_wrr_config() {
        let toml = r#"
            version = 1
            policy = "wrr-fixed"
            hierarchy = "three-level"
            pacing_us = 0

            [wrr]
            quantums = [10, 20]
            initial_quotas = [0, 20]

            [queue_limit]
            max_depth = 64
            overflow = "drop-oldest"
        "#;
        let cfg = SchedulerConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            cfg.policy,
            PolicyConfig::Wrr(WrrConfig {
                quantums: vec![10, 20],
                initial_quotas: vec![0, 20],
                runtime_quantum: false,
            })
        );
        assert_eq!(cfg.engine.hierarchy.levels(), 3);
        assert_eq!(
            cfg.engine.queue_limit,
            QueueLimit::bounded(64, OverflowPolicy::DropOldest)
        );
        assert_eq!(cfg.engine.pacer, Pacer::disabled());
        assert_eq!(cfg.build_policy().name(), "wrr-fixed");
    }

    #[test]
    fn parse_credit_config() {
        let toml = r#"
            policy = "credit"

            [credit]
            activation_ms = 0
            cost = 100

            [[credit.buckets]]
            nominal = 1000
            flows = [0, 1]

            [[credit.buckets]]
            nominal = 500
            flows = [2]
        "#;
        let cfg = SchedulerConfig::from_toml_str(toml).unwrap();
        let PolicyConfig::Credit(credit) = &cfg.policy else {
            panic!("expected credit policy");
        };
        assert_eq!(credit.activation_ms, 0);
        assert_eq!(credit.refill_period_ms, DEFAULT_REFILL_PERIOD_MS);
        assert_eq!(credit.cost, 100);
        assert_eq!(credit.buckets.len(), 2);
        assert_eq!(cfg.policy.flow_count(), 3);
        assert_eq!(cfg.engine.pacer, Pacer::CREDIT);
    }

    #[test]
    fn default_credit_buckets() {
        let cfg = SchedulerConfig::from_toml_str("policy = \"credit\"").unwrap();
        let PolicyConfig::Credit(credit) = cfg.policy else {
            panic!("expected credit policy");
        };
        assert_eq!(credit, CreditConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            "version = 2",
            "[wrr]\nquantums = []",
            "[wrr]\nquantums = [5, 0]",
            "[wrr]\nquantums = [5, 5]\ninitial_quotas = [5]",
            "policy = \"credit\"\n[credit]\nrefill_period_ms = 0",
            "policy = \"credit\"\n[credit]\nbuckets = []",
            "policy = \"credit\"\n[[credit.buckets]]\nnominal = 5\nflows = []",
            "policy = \"credit\"\n[[credit.buckets]]\nnominal = 5\nflows = [0]\n[[credit.buckets]]\nnominal = 5\nflows = [0]",
            "[queue_limit]\nmax_depth = 0",
            "hierarchy = \"two-level\"\n[wrr]\nquantums = [1, 1, 1, 1, 1, 1, 1, 1, 1]",
            "policy = \"round-robin\"",
        ];
        for case in cases {
            assert!(
                SchedulerConfig::from_toml_str(case).is_err(),
                "accepted invalid config: {case}"
            );
        }
    }

    #[test]
    fn unsupported_version_is_reported() {
        let err = SchedulerConfig::from_toml_str("version = 7").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion(7)));
    }
}
