use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StepwiseError};
use crate::message::Role;
use crate::retry::RetryPolicy;
use crate::tools::ShellConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            organization: None,
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}

/// What the loop does when the model names a tool that is not registered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// End the run with `ToolNotFound`.
    #[default]
    Fail,
    /// Tell the model through an observe step and keep going.
    Observe,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Role used when replaying the model's own responses.
    #[serde(default = "default_response_role")]
    pub response_role: Role,
    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_secs: None,
            response_role: default_response_role(),
            unknown_tool: UnknownToolPolicy::default(),
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_max_steps() -> usize {
    16
}

fn default_response_role() -> Role {
    Role::Assistant
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellSettings {
    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout(),
            working_dir: None,
        }
    }
}

impl ShellSettings {
    pub fn to_shell_config(&self) -> ShellConfig {
        ShellConfig {
            working_dir: self.working_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_shell_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

fn default_backoff_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "stepwise=info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| StepwiseError::Config(format!("Failed to parse configuration: {err}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides, for running without a config file.
    /// A `.env` file in the working directory (or a parent) is loaded first.
    pub fn from_env() -> Result<Self> {
        load_dotenv(None);
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Like [`AppConfig::from_env`], but starts from `path` when it exists.
    /// A `.env` next to the config file is loaded as well as the usual one.
    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        load_dotenv(path.parent());
        let mut cfg = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(key) = ["STEPWISE_API_KEY", "OPENAI_API_KEY", "OPEN_API_KEY"]
            .iter()
            .find_map(|name| env::var(name).ok().filter(|value| !value.is_empty()))
        {
            self.model.api_key = Some(key);
        }
        if let Ok(model) = env::var("STEPWISE_MODEL") {
            self.model.model = model;
        }
        if let Ok(provider) = env::var("STEPWISE_PROVIDER") {
            self.model.provider = provider;
        }
        if let Ok(base_url) = env::var("STEPWISE_BASE_URL") {
            self.model.base_url = Some(base_url);
        }
        if let Some(steps) = parse_env::<usize>("STEPWISE_MAX_STEPS")? {
            self.agent.max_steps = steps;
        }
        if let Some(timeout) = parse_env::<u64>("STEPWISE_TIMEOUT_SECS")? {
            self.agent.timeout_secs = Some(timeout);
        }
        if let Ok(role) = env::var("STEPWISE_RESPONSE_ROLE") {
            self.agent.response_role = role.parse().map_err(StepwiseError::Config)?;
        }
        if let Ok(filter) = env::var("STEPWISE_LOG") {
            self.logging.filter = filter;
        }
        if let Some(json) = parse_env::<bool>("STEPWISE_LOG_JSON")? {
            self.logging.json = json;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(StepwiseError::Config("agent.max_steps must be at least 1".into()));
        }
        if self.agent.response_role == Role::System {
            return Err(StepwiseError::Config(
                "agent.response_role must be `assistant` or `user`".into(),
            ));
        }
        Ok(())
    }
}

/// Variables already present in the process environment win over `.env`.
fn load_dotenv(config_dir: Option<&Path>) {
    if let Some(dir) = config_dir {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            if let Err(err) = dotenv::from_path(&candidate) {
                tracing::warn!(path = %candidate.display(), error = %err, "ignoring unreadable .env");
            }
        }
    }
    if let Ok(path) = dotenv::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| StepwiseError::Config(format!("invalid {name} `{raw}`: {err}"))),
        Err(_) => Ok(None),
    }
}
