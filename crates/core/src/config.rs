use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderKind;
use crate::rate_limit::RateLimitConfig;
use crate::request::{MAX_CACHE_DURATION_MINUTES, MAX_TIMEOUT_SECS};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub providers: ProvidersConfig,
    pub rate_limit: RateLimitSettings,
    pub cache: CacheConfig,
    pub usage: UsageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub trust_forwarded_for: bool,
}

/// Server-wide defaults that a request's `settings` may override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    pub timeout_secs: u64,
    pub cache_duration_minutes: u64,
    pub fallback_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ProviderEndpoint {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub claude: ProviderEndpoint,
    pub openai: ProviderEndpoint,
    pub gemini: ProviderEndpoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    pub max_tracked_clients: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageConfig {
    pub queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub rate_limit_max_requests: Option<u32>,
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
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8787,
                graceful_shutdown_secs: 15,
                trust_forwarded_for: true,
            },
            chain: ChainConfig {
                timeout_secs: 30,
                cache_duration_minutes: 60,
                fallback_enabled: true,
            },
            providers: ProvidersConfig {
                claude: ProviderEndpoint::vendor_default(ProviderKind::Claude),
                openai: ProviderEndpoint::vendor_default(ProviderKind::OpenAi),
                gemini: ProviderEndpoint::vendor_default(ProviderKind::Gemini),
            },
            rate_limit: RateLimitSettings {
                max_requests: 100,
                window_secs: 60 * 60,
                max_tracked_clients: 10_000,
            },
            cache: CacheConfig { max_entries: 1_000 },
            usage: UsageConfig { queue_capacity: 1_024 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ProviderEndpoint {
    pub fn vendor_default(kind: ProviderKind) -> Self {
        let (base_url, model) = match kind {
            ProviderKind::Claude => ("https://api.anthropic.com", "claude-3-sonnet-20240229"),
            ProviderKind::OpenAi => ("https://api.openai.com", "gpt-4"),
            ProviderKind::Gemini => ("https://generativelanguage.googleapis.com", "gemini-pro"),
        };
        Self { api_key: None, base_url: base_url.to_string(), model: model.to_string() }
    }

    /// Configured key, with blank values treated as absent.
    pub fn configured_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret().trim())
            .filter(|key| !key.is_empty())
    }
}

impl ProvidersConfig {
    pub fn endpoint(&self, kind: ProviderKind) -> &ProviderEndpoint {
        match kind {
            ProviderKind::Claude => &self.claude,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn endpoint_mut(&mut self, kind: ProviderKind) -> &mut ProviderEndpoint {
        match kind {
            ProviderKind::Claude => &mut self.claude,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }

    /// Providers with a server-side key, in canonical order.
    pub fn configured(&self) -> Vec<ProviderKind> {
        crate::provider::CANONICAL_ORDER
            .into_iter()
            .filter(|kind| self.endpoint(*kind).configured_key().is_some())
            .collect()
    }
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl ChainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_secs),
            max_tracked_clients: NonZeroUsize::new(self.max_tracked_clients)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl CacheConfig {
    pub fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("chatgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(trust_forwarded_for) = server.trust_forwarded_for {
                self.server.trust_forwarded_for = trust_forwarded_for;
            }
        }

        if let Some(chain) = patch.chain {
            if let Some(timeout_secs) = chain.timeout_secs {
                self.chain.timeout_secs = timeout_secs;
            }
            if let Some(cache_duration_minutes) = chain.cache_duration_minutes {
                self.chain.cache_duration_minutes = cache_duration_minutes;
            }
            if let Some(fallback_enabled) = chain.fallback_enabled {
                self.chain.fallback_enabled = fallback_enabled;
            }
        }

        if let Some(providers) = patch.providers {
            let sections = [
                (ProviderKind::Claude, providers.claude),
                (ProviderKind::OpenAi, providers.openai),
                (ProviderKind::Gemini, providers.gemini),
            ];
            for (kind, section) in sections {
                let Some(section) = section else { continue };
                let endpoint = self.providers.endpoint_mut(kind);
                if let Some(api_key_value) = section.api_key {
                    endpoint.api_key = Some(secret_value(api_key_value));
                }
                if let Some(base_url) = section.base_url {
                    endpoint.base_url = base_url;
                }
                if let Some(model) = section.model {
                    endpoint.model = model;
                }
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(max_requests) = rate_limit.max_requests {
                self.rate_limit.max_requests = max_requests;
            }
            if let Some(window_secs) = rate_limit.window_secs {
                self.rate_limit.window_secs = window_secs;
            }
            if let Some(max_tracked_clients) = rate_limit.max_tracked_clients {
                self.rate_limit.max_tracked_clients = max_tracked_clients;
            }
        }

        if let Some(max_entries) = patch.cache.and_then(|cache| cache.max_entries) {
            self.cache.max_entries = max_entries;
        }

        if let Some(queue_capacity) = patch.usage.and_then(|usage| usage.queue_capacity) {
            self.usage.queue_capacity = queue_capacity;
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
        if let Some(value) = read_env("CHATGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CHATGATE_SERVER_PORT") {
            self.server.port = parse_u16("CHATGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CHATGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_SERVER_TRUST_FORWARDED_FOR") {
            self.server.trust_forwarded_for =
                parse_bool("CHATGATE_SERVER_TRUST_FORWARDED_FOR", &value)?;
        }

        if let Some(value) = read_env("CHATGATE_CHAIN_TIMEOUT_SECS") {
            self.chain.timeout_secs = parse_u64("CHATGATE_CHAIN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_CHAIN_CACHE_DURATION_MINUTES") {
            self.chain.cache_duration_minutes =
                parse_u64("CHATGATE_CHAIN_CACHE_DURATION_MINUTES", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_CHAIN_FALLBACK_ENABLED") {
            self.chain.fallback_enabled = parse_bool("CHATGATE_CHAIN_FALLBACK_ENABLED", &value)?;
        }

        for kind in crate::provider::CANONICAL_ORDER {
            let prefix = format!("CHATGATE_{}", kind.as_str().to_ascii_uppercase());
            let vendor_key = format!("{}_API_KEY", kind.as_str().to_ascii_uppercase());
            let endpoint = self.providers.endpoint_mut(kind);

            let api_key = read_env(&format!("{prefix}_API_KEY")).or_else(|| read_env(&vendor_key));
            if let Some(value) = api_key {
                endpoint.api_key = Some(secret_value(value));
            }
            if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
                endpoint.base_url = value;
            }
            if let Some(value) = read_env(&format!("{prefix}_MODEL")) {
                endpoint.model = value;
            }
        }

        let max_requests = read_env("CHATGATE_RATE_LIMIT_MAX_REQUESTS")
            .map(|value| ("CHATGATE_RATE_LIMIT_MAX_REQUESTS", value))
            .or_else(|| read_env("AI_RATE_LIMIT_REQUESTS").map(|v| ("AI_RATE_LIMIT_REQUESTS", v)));
        if let Some((key, value)) = max_requests {
            self.rate_limit.max_requests = parse_u32(key, &value)?;
        }
        if let Some(value) = read_env("CHATGATE_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_u64("CHATGATE_RATE_LIMIT_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_RATE_LIMIT_MAX_TRACKED_CLIENTS") {
            self.rate_limit.max_tracked_clients =
                parse_usize("CHATGATE_RATE_LIMIT_MAX_TRACKED_CLIENTS", &value)?;
        }

        if let Some(value) = read_env("CHATGATE_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_usize("CHATGATE_CACHE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = read_env("CHATGATE_USAGE_QUEUE_CAPACITY") {
            self.usage.queue_capacity = parse_usize("CHATGATE_USAGE_QUEUE_CAPACITY", &value)?;
        }

        let log_level =
            read_env("CHATGATE_LOGGING_LEVEL").or_else(|| read_env("CHATGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CHATGATE_LOGGING_FORMAT").or_else(|| read_env("CHATGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(max_requests) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = max_requests;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_chain(&self.chain)?;
        validate_providers(&self.providers)?;
        validate_limits(&self.rate_limit, &self.cache, &self.usage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("chatgate.toml"), PathBuf::from("config/chatgate.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_chain(chain: &ChainConfig) -> Result<(), ConfigError> {
    if chain.timeout_secs == 0 || chain.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "chain.timeout_secs must be in range 1..={MAX_TIMEOUT_SECS}"
        )));
    }

    if chain.cache_duration_minutes == 0 || chain.cache_duration_minutes > MAX_CACHE_DURATION_MINUTES
    {
        return Err(ConfigError::Validation(format!(
            "chain.cache_duration_minutes must be in range 1..={MAX_CACHE_DURATION_MINUTES}"
        )));
    }

    Ok(())
}

// Keys are optional: a gateway without any answers with fallback text.
fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    for kind in crate::provider::CANONICAL_ORDER {
        let endpoint = providers.endpoint(kind);
        let base_url = endpoint.base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "providers.{kind}.base_url must start with http:// or https://"
            )));
        }
        if endpoint.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "providers.{kind}.model must not be empty"
            )));
        }
    }

    Ok(())
}

fn validate_limits(
    rate_limit: &RateLimitSettings,
    cache: &CacheConfig,
    usage: &UsageConfig,
) -> Result<(), ConfigError> {
    if rate_limit.max_requests == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_requests must be greater than zero".to_string(),
        ));
    }
    if rate_limit.window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be greater than zero".to_string(),
        ));
    }
    if rate_limit.max_tracked_clients == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.max_tracked_clients must be greater than zero".to_string(),
        ));
    }
    if cache.max_entries == 0 {
        return Err(ConfigError::Validation(
            "cache.max_entries must be greater than zero".to_string(),
        ));
    }
    if usage.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "usage.queue_capacity must be greater than zero".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    chain: Option<ChainPatch>,
    providers: Option<ProvidersPatch>,
    rate_limit: Option<RateLimitPatch>,
    cache: Option<CachePatch>,
    usage: Option<UsagePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    trust_forwarded_for: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainPatch {
    timeout_secs: Option<u64>,
    cache_duration_minutes: Option<u64>,
    fallback_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersPatch {
    claude: Option<ProviderPatch>,
    openai: Option<ProviderPatch>,
    gemini: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    max_requests: Option<u32>,
    window_secs: Option<u64>,
    max_tracked_clients: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct UsagePatch {
    queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::provider::ProviderKind;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const KEY_VARS: &[&str] = &[
        "CLAUDE_API_KEY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "CHATGATE_CLAUDE_API_KEY",
        "CHATGATE_OPENAI_API_KEY",
        "CHATGATE_GEMINI_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_the_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(KEY_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.server.listen_address() == "127.0.0.1:8787", "default listen address")?;
        ensure(config.chain.timeout_secs == 30, "default timeout is 30s")?;
        ensure(config.chain.cache_duration_minutes == 60, "default cache ttl is 60 minutes")?;
        ensure(config.chain.fallback_enabled, "fallback is enabled by default")?;
        ensure(config.rate_limit.max_requests == 100, "default limit is 100 per window")?;
        ensure(config.rate_limit.window_secs == 3600, "default window is one hour")?;
        ensure(config.providers.configured().is_empty(), "no keys means no configured providers")?;
        ensure(config.providers.gemini.model == "gemini-pro", "gemini default model")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(KEY_VARS);

        env::set_var("TEST_CHATGATE_CLAUDE_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("chatgate.toml");
            fs::write(
                &path,
                r#"
[providers.claude]
api_key = "${TEST_CHATGATE_CLAUDE_KEY}"
model = "claude-3-haiku-20240307"

[chain]
fallback_enabled = false
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.providers.claude.configured_key() == Some("sk-ant-from-env"),
                "claude key should be interpolated from the environment",
            )?;
            ensure(
                config.providers.claude.model == "claude-3-haiku-20240307",
                "model should come from the file",
            )?;
            ensure(!config.chain.fallback_enabled, "fallback flag should come from the file")?;
            ensure(
                config.providers.configured() == vec![ProviderKind::Claude],
                "only claude should report a configured key",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CHATGATE_CLAUDE_KEY"]);
        result
    }

    #[test]
    fn vendor_key_variables_are_honored_below_prefixed_ones() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(KEY_VARS);

        env::set_var("OPENAI_API_KEY", "sk-vendor");
        env::set_var("GEMINI_API_KEY", "g-vendor");
        env::set_var("CHATGATE_GEMINI_API_KEY", "g-prefixed");
        env::set_var("AI_RATE_LIMIT_REQUESTS", "25");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.providers.openai.configured_key() == Some("sk-vendor"),
                "vendor variable should populate the openai key",
            )?;
            ensure(
                config.providers.gemini.configured_key() == Some("g-prefixed"),
                "prefixed variable should win over the vendor variable",
            )?;
            ensure(config.rate_limit.max_requests == 25, "legacy rate limit variable applies")?;
            Ok(())
        })();

        clear_vars(KEY_VARS);
        clear_vars(&["AI_RATE_LIMIT_REQUESTS"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHATGATE_SERVER_PORT", "9100");
        env::set_var("CHATGATE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("chatgate.toml");
            fs::write(
                &path,
                r#"
[server]
port = 9000
bind_address = "0.0.0.0"

[logging]
level = "warn"
format = "pretty"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.bind_address == "0.0.0.0", "file bind address should apply")?;
            ensure(config.server.port == 9100, "env port should win over the file")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "env log format should win over the file",
            )?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            Ok(())
        })();

        clear_vars(&["CHATGATE_SERVER_PORT", "CHATGATE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHATGATE_CHAIN_TIMEOUT_SECS", "301");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("chain.timeout_secs")
            );
            ensure(has_message, "validation failure should mention chain.timeout_secs")
        })();

        clear_vars(&["CHATGATE_CHAIN_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn malformed_env_override_is_reported_with_its_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CHATGATE_RATE_LIMIT_WINDOW_SECS", "an hour");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "CHATGATE_RATE_LIMIT_WINDOW_SECS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CHATGATE_RATE_LIMIT_WINDOW_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(KEY_VARS);

        env::set_var("CHATGATE_CLAUDE_API_KEY", "sk-ant-secret-value");
        env::set_var("OPENAI_API_KEY", "sk-openai-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-ant-secret-value"), "debug output leaked the claude key")?;
            ensure(
                !debug.contains("sk-openai-secret-value"),
                "debug output leaked the openai key",
            )?;
            Ok(())
        })();

        clear_vars(KEY_VARS);
        result
    }
}
