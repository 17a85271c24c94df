use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use bridge_runtime::IntelMask;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

pub const BUILTIN_BRIDGE_CONFIG: &str = include_str!("data/bridge_config.json");
pub const BRIDGE_CONFIG_ENV: &str = "BRIDGE_CONFIG_PATH";

/// What to do with a driver reply that arrives while no step is waiting for one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyReplyPolicy {
    #[default]
    Drop,
    Buffer,
}

/// Process the bridge starts and hands its endpoint address to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverLaunch {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl DriverLaunch {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    bind_host: String,
    accept_timeout_ms: u64,
    step_timeout_ms: u64,
    raw_reply_timeout_ms: u64,
    early_reply_policy: EarlyReplyPolicy,
    /// Category names enabled before the driver sends its own mask. Absent means all.
    initial_intel: Option<Vec<String>>,
    driver: Option<DriverLaunch>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            accept_timeout_ms: 30_000,
            step_timeout_ms: 30_000,
            raw_reply_timeout_ms: 5_000,
            early_reply_policy: EarlyReplyPolicy::Drop,
            initial_intel: None,
            driver: None,
        }
    }
}

impl BridgeConfig {
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_BRIDGE_CONFIG) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    target: "bridge::config",
                    error = %err,
                    "config.builtin_invalid"
                );
                Self::default()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.initial_mask()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn raw_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.raw_reply_timeout_ms)
    }

    pub fn early_reply_policy(&self) -> EarlyReplyPolicy {
        self.early_reply_policy
    }

    pub fn driver(&self) -> Option<&DriverLaunch> {
        self.driver.as_ref()
    }

    pub fn initial_mask(&self) -> Result<IntelMask, ConfigError> {
        let Some(names) = &self.initial_intel else {
            return Ok(IntelMask::all());
        };
        names.iter().try_fold(IntelMask::empty(), |mask, name| {
            IntelMask::category(name)
                .map(|flag| mask | flag)
                .ok_or_else(|| ConfigError::UnknownCategory(name.clone()))
        })
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_raw_reply_timeout(mut self, timeout: Duration) -> Self {
        self.raw_reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_early_reply_policy(mut self, policy: EarlyReplyPolicy) -> Self {
        self.early_reply_policy = policy;
        self
    }

    pub fn with_initial_intel<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_intel = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_driver(mut self, driver: DriverLaunch) -> Self {
        self.driver = Some(driver);
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse bridge config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read bridge config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unknown intel category `{0}`")]
    UnknownCategory(String),
    #[error("no driver launch configured")]
    MissingDriver,
}

/// Load the bridge config from `BRIDGE_CONFIG_PATH`, falling back to the builtin document.
pub fn load_bridge_config_from_env() -> BridgeConfig {
    if let Ok(path) = env::var(BRIDGE_CONFIG_ENV) {
        let path = PathBuf::from(path);
        match BridgeConfig::from_file(&path) {
            Ok(config) => {
                info!(
                    target: "bridge::config",
                    path = %path.display(),
                    "config.loaded=env"
                );
                return config;
            }
            Err(err) => {
                warn!(
                    target: "bridge::config",
                    path = %path.display(),
                    error = %err,
                    "config.load_failed; falling back to builtin"
                );
            }
        }
    }
    info!(target: "bridge::config", "config.loaded=builtin");
    BridgeConfig::builtin()
}
