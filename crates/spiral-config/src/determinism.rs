use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

const ENV_ENABLED: &str = "SPIRAL_DETERMINISTIC";
const ENV_SEED: &str = "SPIRAL_DETERMINISTIC_SEED";
const ENV_REDUCTION: &str = "SPIRAL_DETERMINISTIC_REDUCTION";

/// Deterministic runtime configuration read once per process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    /// Whether labelled random streams derive their seed from `base_seed`.
    pub enabled: bool,
    /// Root seed mixed with every stream label.
    pub base_seed: u64,
    /// Forces sequential reductions so float sums keep a stable order.
    pub fix_reduction: bool,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: 42,
            fix_reduction: false,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "True" | "TRUE" | "on" | "ON" | "yes" => Some(true),
        "0" | "false" | "False" | "FALSE" | "off" | "OFF" | "no" => Some(false),
        _ => None,
    }
}

impl DeterminismConfig {
    /// Snapshot of the `SPIRAL_DETERMINISTIC*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let enabled = lookup(ENV_ENABLED)
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(defaults.enabled);
        let base_seed = lookup(ENV_SEED)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(defaults.base_seed);
        // Unset reduction flag follows the global switch.
        let fix_reduction = lookup(ENV_REDUCTION)
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(enabled);
        Self {
            enabled,
            base_seed,
            fix_reduction,
        }
    }

    /// Derives a stable seed for the given stream label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns whether reductions must run sequentially.
    pub fn locks_reduction_order(&self) -> bool {
        self.enabled && self.fix_reduction
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Returns the process configuration, reading the environment on first use.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(DeterminismConfig::from_env)
}

/// Installs an explicit configuration. Returns the configuration that ends up
/// active, which is the earlier one when the environment was already read.
pub fn configure(cfg: DeterminismConfig) -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| cfg)
}

/// Returns an RNG for `label`. An explicit seed always wins; otherwise the
/// stream is derived from the deterministic base seed when enabled and from
/// OS entropy when not.
pub fn rng_for(seed: Option<u64>, label: &str) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => {
            let cfg = config();
            if cfg.enabled {
                StdRng::seed_from_u64(cfg.seed_for(label))
            } else {
                StdRng::from_entropy()
            }
        }
    }
}

/// Returns whether reductions should be forced to run sequentially.
pub fn lock_reduction_order() -> bool {
    config().locks_reduction_order()
}
