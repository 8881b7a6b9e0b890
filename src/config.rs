//! Layered configuration: built-in defaults, an optional named preset,
//! environment overrides, and — last — a learned-weights overlay written by
//! the learning loop. Each layer only ever narrows or overrides the one
//! before it; nothing upstream is ever mutated in place.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("domain weights must sum to 1.0 +/- 0.001, got {0}")]
    DomainWeightsDontSumToOne(f64),
    #[error("execution.paper_min_days must be >= 1, got {0}")]
    PaperMinDaysTooSmall(u32),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainWeights {
    pub curator: f64,
    pub onchain: f64,
    pub tradfi: f64,
    pub social: f64,
    pub technical: f64,
    pub events: f64,
}

impl Default for DomainWeights {
    fn default() -> Self {
        // Equal-weight prior across the six domains.
        DomainWeights {
            curator: 1.0 / 6.0,
            onchain: 1.0 / 6.0,
            tradfi: 1.0 / 6.0,
            social: 1.0 / 6.0,
            technical: 1.0 / 6.0,
            events: 1.0 / 6.0,
        }
    }
}

impl DomainWeights {
    pub fn as_map(&self) -> HashMap<&'static str, f64> {
        HashMap::from([
            ("curator", self.curator),
            ("onchain", self.onchain),
            ("tradfi", self.tradfi),
            ("social", self.social),
            ("technical", self.technical),
            ("events", self.events),
        ])
    }

    pub fn sum(&self) -> f64 {
        self.curator + self.onchain + self.tradfi + self.social + self.technical + self.events
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(ConfigError::DomainWeightsDontSumToOne(sum));
        }
        Ok(())
    }

    pub fn apply_deltas(&mut self, deltas: &HashMap<String, f64>, min: f64, max: f64) {
        let mut fields: HashMap<&'static str, &mut f64> = HashMap::from([
            ("curator", &mut self.curator),
            ("onchain", &mut self.onchain),
            ("tradfi", &mut self.tradfi),
            ("social", &mut self.social),
            ("technical", &mut self.technical),
            ("events", &mut self.events),
        ]);
        for (domain, delta) in deltas {
            if let Some(w) = fields.get_mut(domain.as_str()) {
                **w = (**w + delta).clamp(min, max);
            }
        }
        let total: f64 = fields.values().map(|w| **w).sum();
        if total > 0.0 {
            for w in fields.values_mut() {
                **w /= total;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    pub cycle_interval_seconds: u64,
    pub regime_lookback_cycles: u32,
    pub pcs_tier_small: f64,
    pub pcs_tier_medium: f64,
    pub pcs_tier_large: f64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        // PCS lives on a 0-100 scale.
        BrainConfig {
            cycle_interval_seconds: 300,
            regime_lookback_cycles: 12,
            pcs_tier_small: 60.0,
            pcs_tier_medium: 75.0,
            pcs_tier_large: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_position_pct_of_equity: f64,
    pub max_daily_loss_pct: f64,
    pub max_open_positions: u32,
    pub half_kelly_fraction: f64,
    pub max_leverage: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_position_pct_of_equity: 0.10,
            max_daily_loss_pct: 0.05,
            max_open_positions: 5,
            half_kelly_fraction: 0.5,
            max_leverage: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// "paper" or "live". No dry-run mode: a trade either simulates a
    /// fill against paper books or it doesn't run at all.
    pub mode: String,
    pub paper_min_days: u32,
    pub idempotency_ttl_seconds: u64,
    pub slippage_bps: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            mode: "paper".to_string(),
            paper_min_days: 30,
            idempotency_ttl_seconds: 86_400,
            slippage_bps: 15,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paper_min_days < 1 {
            return Err(ConfigError::PaperMinDaysTooSmall(self.paper_min_days));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchConfig {
    pub l1_daily_loss_pct: f64,
    pub l2_portfolio_heat_pct: f64,
    pub l3_crisis_threshold: u32,
    pub l4_max_drawdown_pct: f64,
    pub producer_quarantine_after_failures: u32,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        KillSwitchConfig {
            l1_daily_loss_pct: 0.03,
            l2_portfolio_heat_pct: 0.60,
            l3_crisis_threshold: 2,
            l4_max_drawdown_pct: 0.15,
            producer_quarantine_after_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KarmaSettlementMode {
    Manual,
    Daily,
    Weekly,
    Threshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KarmaConfig {
    pub enabled: bool,
    pub treasury_address: Option<String>,
    pub percentage: f64,
    pub settlement_mode: KarmaSettlementMode,
    pub threshold_usd: f64,
}

impl Default for KarmaConfig {
    fn default() -> Self {
        KarmaConfig {
            enabled: false,
            treasury_address: None,
            percentage: 0.10,
            settlement_mode: KarmaSettlementMode::Manual,
            threshold_usd: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    pub assets: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        UniverseConfig {
            assets: vec!["BTC".into(), "ETH".into(), "SOL".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub domain_weights: DomainWeights,
    pub brain: BrainConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub kill_switch: KillSwitchConfig,
    pub karma: KarmaConfig,
    pub universe: UniverseConfig,
    pub logging: LoggingConfig,
    pub journal_path: String,
    pub identity_key_path: String,
}

impl Config {
    pub fn execution_mode(&self) -> String {
        self.execution.mode.clone()
    }

    pub fn from_repo_defaults() -> Self {
        Config {
            domain_weights: DomainWeights::default(),
            brain: BrainConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            kill_switch: KillSwitchConfig::default(),
            karma: KarmaConfig::default(),
            universe: UniverseConfig::default(),
            logging: LoggingConfig::default(),
            journal_path: "./data/journal.sqlite3".to_string(),
            identity_key_path: "./data/identity.key".to_string(),
        }
    }

    pub fn from_yaml(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let cfg: Config = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deep-merges a named preset file (`presets/<name>.yaml`, relative to
    /// `presets_dir`) over the repo defaults. Unset fields in the preset
    /// keep the default; present fields override wholesale per-section
    /// (sections are not field-merged, matching the reference's behavior).
    pub fn from_preset(presets_dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = presets_dir.join(format!("{name}.yaml"));
        if !path.exists() {
            return Err(ConfigError::UnknownPreset(name.to_string()));
        }
        Self::from_yaml(&path)
    }

    /// Applies environment-variable overrides. Uses a generic `ENGINE_`
    /// prefix, e.g. `ENGINE_EXECUTION__PAPER_MIN_DAYS=45`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ENGINE_EXECUTION__PAPER_MIN_DAYS") {
            if let Ok(n) = v.parse() {
                self.execution.paper_min_days = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_KARMA__TREASURY_ADDRESS") {
            self.karma.treasury_address = Some(v);
        }
        if let Ok(v) = std::env::var("ENGINE_KARMA__ENABLED") {
            self.karma.enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("ENGINE_LOGGING__LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("ENGINE_JOURNAL_PATH") {
            self.journal_path = v;
        }
        if let Ok(v) = std::env::var("ENGINE_IDENTITY_KEY_PATH") {
            self.identity_key_path = v;
        }
    }

    /// Overlays weights learned by the compound learning loop, written as a
    /// small standalone YAML file rather than merged into the main config.
    pub fn apply_learned_weights_overlay(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let weights: DomainWeights = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        weights.validate()?;
        self.domain_weights = weights;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.domain_weights.validate()?;
        self.execution.validate()?;
        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        let mut cfg = Self::from_repo_defaults();
        if let Ok(preset) = std::env::var("ENGINE_PRESET") {
            let presets_dir = std::env::var("ENGINE_PRESETS_DIR").unwrap_or_else(|_| "./presets".to_string());
            cfg = Self::from_preset(Path::new(&presets_dir), &preset)?;
        }
        cfg.apply_env_overrides();
        if let Ok(overlay) = std::env::var("ENGINE_LEARNED_WEIGHTS_PATH") {
            cfg.apply_learned_weights_overlay(Path::new(&overlay))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
