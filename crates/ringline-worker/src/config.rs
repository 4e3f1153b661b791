//! Worker configuration loading from file and environment variables.

use ringline_tools::{LogNotifier, NotificationSink, RecordCallerTool, ToolRegistry, WebhookNotifier};
use ringline_types::{AgentId, AvatarOptions, ModelOptions, PipelineOptions, TurnDetectionOptions};
use ringline_voice::{Agent, PipelineConfig, DEFAULT_FAREWELL, DEFAULT_GREETING, DEFAULT_INSTRUCTIONS};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Agent identity, capacity and announcements.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP intake settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Real-time speech model.
    #[serde(default)]
    pub model: ModelOptions,

    #[serde(default)]
    pub avatar: AvatarConfig,

    #[serde(default)]
    pub turn_detection: TurnDetectionOptions,

    /// Call-routing registry.
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Provider credentials. Only ever read from the environment.
    #[serde(skip)]
    pub credentials: Credentials,
}

/// Agent settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name the agent is registered under for routing.
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Whether to register with the routing system at startup.
    #[serde(default = "default_register")]
    pub register: bool,

    /// Upper bound on concurrently served calls.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Spoken when the agent joins a call. Empty disables the greeting.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Spoken when the session closes. Empty disables the farewell.
    #[serde(default = "default_farewell")]
    pub farewell: String,
}

/// Network configuration for the HTTP intake.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host name or address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvatarConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Provider face identifier. Required when `enabled` is set.
    #[serde(default)]
    pub face_id: String,
}

/// Routing registry endpoint.
#[derive(Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the routing system, e.g. `https://router.example.com`.
    #[serde(default)]
    pub url: String,

    /// Bearer token sent with the registration request.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    /// Where caller notifications are POSTed. Unset means log only.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "ringline_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight sessions get to finish after a shutdown signal.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// API keys for the external speech and avatar providers.
#[derive(Clone, Default)]
pub struct Credentials {
    pub model_api_key: String,
    pub avatar_api_key: Option<String>,
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "[EMPTY]"
    } else {
        "[REDACTED]"
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("model_api_key", &redact(&self.model_api_key))
            .field("avatar_api_key", &self.avatar_api_key.as_deref().map(redact))
            .finish()
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_deref().map(redact))
            .finish()
    }
}

fn default_agent_id() -> String {
    "MyTelephonyAgent".to_string()
}

fn default_register() -> bool {
    true
}

fn default_max_sessions() -> usize {
    10
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_farewell() -> String {
    DEFAULT_FAREWELL.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            register: default_register(),
            max_sessions: default_max_sessions(),
            instructions: default_instructions(),
            greeting: default_greeting(),
            farewell: default_farewell(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    /// The merged configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks the merged configuration before anything is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent_id()?;
        if self.agent.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_sessions must be at least 1".into(),
            ));
        }
        let threshold = self.turn_detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "turn_detection.threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
        if self.avatar.enabled && self.avatar.face_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "avatar.face_id is required when the avatar is enabled".into(),
            ));
        }
        if self.agent.register && self.registry.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "registry.url is required when agent.register is true \
                 (set RINGLINE_REGISTRY_URL, or RINGLINE_REGISTER=false to run unregistered)"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn agent_id(&self) -> Result<AgentId, ConfigError> {
        AgentId::new(self.agent.id.clone())
            .map_err(|e| ConfigError::Invalid(format!("agent.id: {}", e)))
    }

    /// Options plus credentials for the per-call pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let avatar = self.avatar.enabled.then(|| AvatarOptions {
            face_id: self.avatar.face_id.clone(),
        });
        PipelineConfig {
            options: PipelineOptions {
                model: self.model.clone(),
                avatar,
                turn_detection: self.turn_detection,
            },
            model_api_key: self.credentials.model_api_key.clone(),
            avatar_api_key: self.credentials.avatar_api_key.clone(),
        }
    }

    /// Where tool side effects are delivered: the webhook if one is
    /// configured, otherwise the log.
    pub fn notification_sink(&self) -> Result<Arc<dyn NotificationSink>, ConfigError> {
        match self.notifications.webhook_url.as_deref() {
            Some(url) => {
                let webhook = WebhookNotifier::new(url)
                    .map_err(|e| ConfigError::Invalid(format!("notifications.webhook_url: {}", e)))?;
                Ok(Arc::new(webhook))
            }
            None => Ok(Arc::new(LogNotifier)),
        }
    }

    /// Builds the agent shared by every session.
    pub fn build_agent(&self, sink: Arc<dyn NotificationSink>) -> Result<Agent, ConfigError> {
        let tools = ToolRegistry::new()
            .with(Arc::new(RecordCallerTool::new(sink)))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Agent::builder(self.agent_id()?)
            .instructions(self.agent.instructions.clone())
            .tools(tools)
            .greeting(Some(self.agent.greeting.clone()))
            .farewell(Some(self.agent.farewell.clone()))
            .build())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown.drain_timeout_secs)
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `RINGLINE_AGENT_ID` overrides `agent.id`
/// - `RINGLINE_REGISTER` overrides `agent.register` ("true" or "1" to enable)
/// - `RINGLINE_MAX_SESSIONS` overrides `agent.max_sessions`
/// - `RINGLINE_HOST` / `RINGLINE_PORT` override `server.host` / `server.port`
/// - `RINGLINE_REGISTRY_URL` / `RINGLINE_REGISTRY_TOKEN` override `registry`
/// - `RINGLINE_NOTIFY_WEBHOOK` overrides `notifications.webhook_url`
/// - `RINGLINE_LOG_LEVEL` / `RINGLINE_LOG_JSON` override `logging`
///
/// `GOOGLE_API_KEY` and `AVATAR_API_KEY` supply the provider credentials.
///
/// `agent.register` defaults to true, so a bare run with no file needs either
/// a registry URL or `RINGLINE_REGISTER=false`. `config.example.toml` at the
/// repository root is a local, unregistered starting point.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, an
/// override is malformed, or the merged result fails validation.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&str>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

fn parse_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides<F>(config: &mut Config, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(id) = non_empty(env("RINGLINE_AGENT_ID")) {
        config.agent.id = id;
    }
    if let Some(register) = env("RINGLINE_REGISTER") {
        config.agent.register = parse_flag(&register);
    }
    if let Some(max) = env("RINGLINE_MAX_SESSIONS") {
        config.agent.max_sessions = parse_env("RINGLINE_MAX_SESSIONS", max)?;
    }
    if let Some(host) = non_empty(env("RINGLINE_HOST")) {
        config.server.host = host;
    }
    if let Some(port) = env("RINGLINE_PORT") {
        config.server.port = parse_env("RINGLINE_PORT", port)?;
    }
    if let Some(url) = non_empty(env("RINGLINE_REGISTRY_URL")) {
        config.registry.url = url;
    }
    if let Some(token) = non_empty(env("RINGLINE_REGISTRY_TOKEN")) {
        config.registry.token = Some(token);
    }
    if let Some(url) = non_empty(env("RINGLINE_NOTIFY_WEBHOOK")) {
        config.notifications.webhook_url = Some(url);
    }
    if let Some(level) = non_empty(env("RINGLINE_LOG_LEVEL")) {
        config.logging.level = level;
    }
    if let Some(json) = env("RINGLINE_LOG_JSON") {
        config.logging.json = parse_flag(&json);
    }

    if let Some(key) = env("GOOGLE_API_KEY") {
        config.credentials.model_api_key = key;
    }
    config.credentials.avatar_api_key = non_empty(env("AVATAR_API_KEY"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    fn no_register() -> impl Fn(&str) -> Option<String> {
        env_from(&[("RINGLINE_REGISTER", "false")])
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config_with(Some("/nonexistent/ringline.toml"), no_register()).unwrap();
        assert_eq!(config.agent.id, "MyTelephonyAgent");
        assert_eq!(config.agent.max_sessions, 10);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.model.voice, "Leda");
        assert_eq!(config.turn_detection.threshold, 0.8);
        assert_eq!(config.drain_timeout(), Duration::from_secs(10));
        assert!(!config.avatar.enabled);
    }

    #[test]
    fn file_values_and_env_overrides_merge() {
        let file = write_config(
            r#"
            [agent]
            id = "FrontDesk"
            register = true
            max_sessions = 3
            greeting = ""

            [server]
            port = 9000

            [model]
            voice = "Puck"

            [registry]
            url = "http://router.local"

            [turn_detection]
            threshold = 0.5
            "#,
        );
        let env = env_from(&[
            ("RINGLINE_PORT", "9100"),
            ("RINGLINE_MAX_SESSIONS", "5"),
            ("RINGLINE_REGISTRY_TOKEN", "secret-token"),
            ("GOOGLE_API_KEY", "g-key"),
        ]);

        let config = load_config_with(file.path().to_str(), env).unwrap();
        assert_eq!(config.agent.id, "FrontDesk");
        assert_eq!(config.agent.max_sessions, 5);
        assert!(config.agent.greeting.is_empty());
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.model.voice, "Puck");
        assert_eq!(
            config.model.name,
            "gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(config.turn_detection.threshold, 0.5);
        assert_eq!(config.turn_detection.min_silence_ms, 500);
        assert_eq!(config.registry.token.as_deref(), Some("secret-token"));
        assert_eq!(config.credentials.model_api_key, "g-key");

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.options.model.voice, "Puck");
        assert!(pipeline.options.avatar.is_none());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let env = env_from(&[
            ("RINGLINE_REGISTER", "false"),
            ("RINGLINE_REGISTRY_TOKEN", "registry-secret"),
            ("GOOGLE_API_KEY", "model-secret"),
            ("AVATAR_API_KEY", "avatar-secret"),
        ]);
        let config = load_config_with(None, env).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("registry-secret"));
        assert!(!debug.contains("model-secret"));
        assert!(!debug.contains("avatar-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            "[agent]\nid = \"has space\"\nregister = false",
            "[agent]\nmax_sessions = 0\nregister = false",
            "[agent]\nregister = false\n[turn_detection]\nthreshold = 1.5",
            "[agent]\nregister = false\n[avatar]\nenabled = true",
            "[agent]\nregister = true\n[registry]\nurl = \"\"",
        ];
        for contents in cases {
            let file = write_config(contents);
            let err = load_config_with(file.path().to_str(), env_from(&[])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{}: {}", contents, err);
        }
    }

    #[test]
    fn defaults_alone_ask_for_a_registry_or_opt_out() {
        let err = load_config_with(None, env_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let message = err.to_string();
        assert!(message.contains("RINGLINE_REGISTRY_URL"), "{}", message);
        assert!(message.contains("RINGLINE_REGISTER=false"), "{}", message);

        let env = env_from(&[("RINGLINE_REGISTRY_URL", "http://router.internal")]);
        assert!(load_config_with(None, env).unwrap().agent.register);
    }

    #[test]
    fn example_config_loads_unregistered() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config.example.toml");
        let config = load_config_with(Some(path), env_from(&[])).unwrap();
        assert!(!config.agent.register);
        assert_eq!(config.agent.id, "MyTelephonyAgent");
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn malformed_env_override_is_an_error() {
        let env = env_from(&[("RINGLINE_REGISTER", "0"), ("RINGLINE_PORT", "eighty")]);
        let err = load_config_with(None, env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "RINGLINE_PORT",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let file = write_config("[agent\nid = ");
        assert!(matches!(
            load_config_with(file.path().to_str(), no_register()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn built_agent_carries_tools_and_announcements() {
        let file = write_config(
            "[agent]\nid = \"FrontDesk\"\nregister = false\ngreeting = \"\"\nfarewell = \"Bye now.\"",
        );
        let config = load_config_with(file.path().to_str(), env_from(&[])).unwrap();
        let agent = config.build_agent(config.notification_sink().unwrap()).unwrap();

        assert_eq!(agent.id().as_str(), "FrontDesk");
        assert_eq!(agent.instructions(), DEFAULT_INSTRUCTIONS);
        assert_eq!(agent.greeting(), None);
        assert_eq!(agent.farewell(), Some("Bye now."));
        assert_eq!(agent.tools().names(), ["record_caller".to_string()]);
    }

    #[test]
    fn enabled_avatar_flows_into_pipeline_options() {
        let file = write_config(
            "[agent]\nregister = false\n[avatar]\nenabled = true\nface_id = \"face-42\"",
        );
        let env = env_from(&[("AVATAR_API_KEY", "a-key"), ("GOOGLE_API_KEY", "g")]);
        let config = load_config_with(file.path().to_str(), env).unwrap();
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.options.avatar.unwrap().face_id, "face-42");
        assert_eq!(pipeline.avatar_api_key.as_deref(), Some("a-key"));
    }
}
