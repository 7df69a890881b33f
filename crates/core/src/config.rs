use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::PricingSchedule;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub llm: LlmConfig,
    pub pricing: PricingSchedule,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    /// Upper bound on candidates evaluated per orchestration pass.
    pub candidate_limit: usize,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Local,
    Llm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub runtime_mode: Option<RuntimeMode>,
    pub candidate_limit: Option<usize>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig { mode: RuntimeMode::Local, candidate_limit: 5 },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-2.5-flash".to_string(),
                timeout_secs: 30,
            },
            pricing: PricingSchedule::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported runtime mode `{other}` (expected local|llm)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("stemline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(runtime) = patch.runtime {
            if let Some(mode) = runtime.mode {
                self.runtime.mode = mode;
            }
            if let Some(candidate_limit) = runtime.candidate_limit {
                self.runtime.candidate_limit = candidate_limit;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(base_play_price_usd) = pricing.base_play_price_usd {
                self.pricing.base_play_price_usd = base_play_price_usd;
            }
            if let Some(remix_multiplier) = pricing.remix_multiplier {
                self.pricing.remix_multiplier = remix_multiplier;
            }
            if let Some(commercial_multiplier) = pricing.commercial_multiplier {
                self.pricing.commercial_multiplier = commercial_multiplier;
            }
            if let Some(volume_discount_percent) = pricing.volume_discount_percent {
                self.pricing.volume_discount_percent = volume_discount_percent;
            }
            if let Some(floor_usd) = pricing.floor_usd {
                self.pricing.floor_usd = floor_usd;
            }
            if let Some(ceiling_usd) = pricing.ceiling_usd {
                self.pricing.ceiling_usd = ceiling_usd;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STEMLINE_RUNTIME_MODE") {
            self.runtime.mode = value.parse()?;
        }
        if let Some(value) = read_env("STEMLINE_RUNTIME_CANDIDATE_LIMIT") {
            self.runtime.candidate_limit =
                parse_usize("STEMLINE_RUNTIME_CANDIDATE_LIMIT", &value)?;
        }

        if let Some(value) = read_env("STEMLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STEMLINE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("STEMLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STEMLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("STEMLINE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STEMLINE_PRICING_BASE_PLAY_PRICE_USD") {
            self.pricing.base_play_price_usd =
                parse_decimal("STEMLINE_PRICING_BASE_PLAY_PRICE_USD", &value)?;
        }
        if let Some(value) = read_env("STEMLINE_PRICING_FLOOR_USD") {
            self.pricing.floor_usd = parse_decimal("STEMLINE_PRICING_FLOOR_USD", &value)?;
        }
        if let Some(value) = read_env("STEMLINE_PRICING_CEILING_USD") {
            self.pricing.ceiling_usd = parse_decimal("STEMLINE_PRICING_CEILING_USD", &value)?;
        }

        let log_level =
            read_env("STEMLINE_LOGGING_LEVEL").or_else(|| read_env("STEMLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STEMLINE_LOGGING_FORMAT").or_else(|| read_env("STEMLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(runtime_mode) = overrides.runtime_mode {
            self.runtime.mode = runtime_mode;
        }
        if let Some(candidate_limit) = overrides.candidate_limit {
            self.runtime.candidate_limit = candidate_limit;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_runtime(&self.runtime)?;
        validate_llm(&self.llm)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stemline.toml"), PathBuf::from("config/stemline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    if runtime.candidate_limit == 0 || runtime.candidate_limit > 25 {
        return Err(ConfigError::Validation(
            "runtime.candidate_limit must be in range 1..=25".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key is set but empty; omit it or provide a value".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingSchedule) -> Result<(), ConfigError> {
    if pricing.base_play_price_usd <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pricing.base_play_price_usd must be greater than zero".to_string(),
        ));
    }
    if pricing.floor_usd > pricing.ceiling_usd {
        return Err(ConfigError::Validation(
            "pricing.floor_usd must not exceed pricing.ceiling_usd".to_string(),
        ));
    }
    if pricing.volume_discount_percent < Decimal::ZERO
        || pricing.volume_discount_percent >= Decimal::ONE_HUNDRED
    {
        return Err(ConfigError::Validation(
            "pricing.volume_discount_percent must be in range 0..100".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    runtime: Option<RuntimePatch>,
    llm: Option<LlmPatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    mode: Option<RuntimeMode>,
    candidate_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    base_play_price_usd: Option<Decimal>,
    remix_multiplier: Option<Decimal>,
    commercial_multiplier: Option<Decimal>,
    volume_discount_percent: Option<Decimal>,
    floor_usd: Option<Decimal>,
    ceiling_usd: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
