use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_PAYMENT_EXPIRY_SECS: i64 = 900; // 15 minutes
const DEFAULT_AUTO_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_AUTO_POLL_DELAY_SECS: u64 = 10;
const DEFAULT_COUNTDOWN_TICK_SECS: u64 = 1;
const DEFAULT_GENERATION_POLL_INTERVAL_SECS: u64 = 10;
const CONFIG_FILE: &str = "config/lifecycle";
const ENV_PREFIX: &str = "PLANFORGE";

/// Cadences and windows for the payment and generation lifecycle.
///
/// The defaults match the gateway's settlement latency (fixed 15 s poll, no
/// backoff escalation) and the 15-minute session window it issues.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Seconds until a freshly created payment session expires.
    #[serde(default = "default_payment_expiry_secs")]
    #[validate(range(min = 60, max = 86400))]
    pub payment_expiry_secs: i64,

    /// Interval between automatic payment status checks.
    #[serde(default = "default_auto_poll_interval_secs")]
    #[validate(range(min = 1, max = 600))]
    pub auto_poll_interval_secs: u64,

    /// Grace delay before the first automatic check.
    #[serde(default = "default_auto_poll_delay_secs")]
    #[validate(range(max = 600))]
    pub auto_poll_delay_secs: u64,

    /// Cadence of the countdown display refresh.
    #[serde(default = "default_countdown_tick_secs")]
    #[validate(range(min = 1, max = 60))]
    pub countdown_tick_secs: u64,

    /// Interval between generation status polls.
    #[serde(default = "default_generation_poll_interval_secs")]
    #[validate(range(min = 1, max = 600))]
    pub generation_poll_interval_secs: u64,
}

fn default_payment_expiry_secs() -> i64 {
    DEFAULT_PAYMENT_EXPIRY_SECS
}

fn default_auto_poll_interval_secs() -> u64 {
    DEFAULT_AUTO_POLL_INTERVAL_SECS
}

fn default_auto_poll_delay_secs() -> u64 {
    DEFAULT_AUTO_POLL_DELAY_SECS
}

fn default_countdown_tick_secs() -> u64 {
    DEFAULT_COUNTDOWN_TICK_SECS
}

fn default_generation_poll_interval_secs() -> u64 {
    DEFAULT_GENERATION_POLL_INTERVAL_SECS
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            payment_expiry_secs: default_payment_expiry_secs(),
            auto_poll_interval_secs: default_auto_poll_interval_secs(),
            auto_poll_delay_secs: default_auto_poll_delay_secs(),
            countdown_tick_secs: default_countdown_tick_secs(),
            generation_poll_interval_secs: default_generation_poll_interval_secs(),
        }
    }
}

impl LifecycleConfig {
    /// Loads configuration from the optional `config/lifecycle` file and
    /// `PLANFORGE_`-prefixed environment variables, then validates bounds.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let cfg: LifecycleConfig = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid lifecycle config: {e}")))?;
        info!(
            auto_poll_interval_secs = cfg.auto_poll_interval_secs,
            generation_poll_interval_secs = cfg.generation_poll_interval_secs,
            "lifecycle configuration loaded"
        );
        Ok(cfg)
    }

    pub fn payment_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payment_expiry_secs)
    }

    pub fn auto_poll_interval(&self) -> Duration {
        Duration::from_secs(self.auto_poll_interval_secs)
    }

    pub fn auto_poll_delay(&self) -> Duration {
        Duration::from_secs(self.auto_poll_delay_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_secs(self.countdown_tick_secs)
    }

    pub fn generation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.generation_poll_interval_secs)
    }
}
