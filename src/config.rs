use crate::error::{ProxyError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "messages-bridge.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Requested model (exact name, `*` glob, or `"*"` catch-all) to upstream model.
    #[serde(default)]
    pub models: HashMap<String, ModelTarget>,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Stream from upstream even when the client did not ask for it.
    #[serde(default)]
    pub force_stream: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Used when no `[models]` entry matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            force_stream: false,
            timeout_secs: default_timeout_secs(),
            default_model: None,
        }
    }
}

/// A `[models]` value: either a bare model name or a table carrying extra
/// request fields that are merged into the upstream body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelTarget {
    Name(String),
    Detailed {
        model: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl ModelTarget {
    pub fn model(&self) -> &str {
        match self {
            ModelTarget::Name(name) => name,
            ModelTarget::Detailed { model, .. } => model,
        }
    }
}

/// Top-level fields removed from the upstream request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default)]
    pub drop: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// `max_tokens` for Responses requests that omit `max_output_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Record (scrubbed, truncated) payloads in the translation journal.
    #[serde(default)]
    pub payloads: bool,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            payloads: false,
            max_chars: default_max_chars(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: UpstreamConfig::default(),
            models: HashMap::new(),
            params: ParamsConfig::default(),
            conversion: ConversionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_file() -> PathBuf {
    PathBuf::from("messages-bridge.log")
}

fn default_max_chars() -> usize {
    4000
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        // Reject bad model patterns at load time rather than per request.
        ModelMap::from_config(&config)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir. With no file found the
    /// defaults are used.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Full URL of the upstream Responses endpoint.
    pub fn responses_url(&self) -> String {
        responses_url(&self.upstream.base_url)
    }

    /// Resolve the API key from the configured environment variable
    pub fn resolve_api_key(&self) -> Result<String> {
        std::env::var(&self.upstream.api_key_env).map_err(|_| {
            ProxyError::config(format!(
                "Environment variable '{}' not set. Set it with your OpenAI API key.",
                self.upstream.api_key_env
            ))
        })
    }
}

/// `base` unchanged if it already names the endpoint, else `base/responses`.
pub fn responses_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/responses") {
        base.to_string()
    } else {
        format!("{}/responses", base)
    }
}

/// The outcome of mapping a requested model name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub model: String,
    pub extra: Map<String, Value>,
}

/// Compiled `[models]` table.
///
/// Lookup order: exact key, longest matching glob, `"*"`, the configured
/// default model, then the requested name unchanged.
#[derive(Debug, Clone)]
pub struct ModelMap {
    exact: HashMap<String, ModelTarget>,
    globs: Vec<(Regex, usize, ModelTarget)>,
    fallback: Option<ModelTarget>,
    default_model: Option<String>,
}

impl ModelMap {
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        Self::new(&config.models, config.upstream.default_model.clone())
    }

    pub fn new(
        models: &HashMap<String, ModelTarget>,
        default_model: Option<String>,
    ) -> Result<Self> {
        let mut exact = HashMap::new();
        let mut globs = Vec::new();
        let mut fallback = None;

        for (key, target) in models {
            if key == "*" {
                fallback = Some(target.clone());
            } else if key.contains('*') {
                globs.push((glob_to_regex(key)?, key.len(), target.clone()));
            } else {
                exact.insert(key.clone(), target.clone());
            }
        }
        globs.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Self {
            exact,
            globs,
            fallback,
            default_model,
        })
    }

    pub fn resolve(&self, requested: &str) -> ResolvedModel {
        let target = self
            .exact
            .get(requested)
            .or_else(|| {
                self.globs
                    .iter()
                    .find(|(re, _, _)| re.is_match(requested))
                    .map(|(_, _, t)| t)
            })
            .or(self.fallback.as_ref());

        match target {
            Some(ModelTarget::Name(name)) => ResolvedModel {
                model: name.clone(),
                extra: Map::new(),
            },
            Some(ModelTarget::Detailed { model, extra }) => ResolvedModel {
                model: model.clone(),
                extra: extra.clone(),
            },
            None => ResolvedModel {
                model: self
                    .default_model
                    .clone()
                    .unwrap_or_else(|| requested.to_string()),
                extra: Map::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.globs.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Ok(Regex::new(&format!("^{}$", escaped.join(".*")))?)
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from(CONFIG_FILE_NAME));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("messages-bridge")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("messages-bridge").join("config.toml"));
        }
        if let Some(home) = dirs_path() {
            paths.push(home.join(".config").join("messages-bridge").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".messages-bridge.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
