mod model;

pub use model::EmbeddingModel;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::{Host, Url};

pub const ENV_PREFIX: &str = "EMBEDFN";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_HOST: &str = "127.0.0.1";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown embedding model `{model}`, expected one of : {accepted}")]
    UnknownModel { model: String, accepted: String },

    #[error("failed to load configuration : {0}")]
    Load(#[from] config::ConfigError),
}

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: EmbeddingModel,
    pub base_url: String,
    /// How long Ollama keeps the model loaded after a request, e.g. `5m`.
    pub keep_alive: Option<String>,
    /// Whether Ollama truncates inputs longer than the context window.
    pub truncate: Option<bool>,
    /// Output size for models that support shortened embeddings.
    pub dimensions: Option<usize>,
    pub num_ctx: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::default(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            keep_alive: None,
            truncate: None,
            dimensions: None,
            num_ctx: None,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    pub fn for_model(model: EmbeddingModel) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// When set, logs go to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// `~/.config/embedfn/embedfn.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/embedfn/embedfn.toml"))
    }

    /// Reads the user config file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path().as_deref(), utf8_vars(std::env::vars_os()))
    }

    /// Layers, lowest precedence first: defaults, the TOML file at `path`,
    /// `EMBEDFN_*` variables, then `EMBEDDING_MODEL_NAME` / `OLLAMA_HOST`
    /// for keys the prefixed variables left unset.
    pub fn load_from(path: Option<&Path>, vars: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let prefixed = |key: &str| vars.contains_key(&format!("{ENV_PREFIX}_{key}"));
        let model_override = (!prefixed("EMBEDDING__MODEL"))
            .then(|| vars.get("EMBEDDING_MODEL_NAME").cloned())
            .flatten();
        let host_override = (!prefixed("EMBEDDING__BASE_URL"))
            .then(|| vars.get("OLLAMA_HOST").map(|host| normalize_host(host)))
            .flatten();

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(Some(vars.into_iter().collect())),
            )
            .set_override_option("embedding.model", model_override)?
            .set_override_option("embedding.base_url", host_override)?;

        Ok(builder.build()?.try_deserialize::<Self>()?)
    }
}

// Bare `host[:port]` values get `http://`, host `127.0.0.1` and port 11434
// where missing; an unspecified address means the local server. Values with a
// scheme are taken as written.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        return host.to_string();
    }

    let default_url = format!("http://{DEFAULT_OLLAMA_HOST}:{DEFAULT_OLLAMA_PORT}");
    let parsed = Url::parse(&format!("http://{host}"))
        .or_else(|_| Url::parse(&format!("http://{DEFAULT_OLLAMA_HOST}{host}")));
    let Ok(mut url) = parsed else {
        return default_url;
    };

    let unspecified = match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => ip.is_unspecified(),
        _ => false,
    };
    if unspecified && url.set_host(Some(DEFAULT_OLLAMA_HOST)).is_err() {
        return default_url;
    }

    // `Url` drops an explicit `:80`, so look at the raw authority as well
    let missing_port = url.port().is_none() && !has_explicit_port(host);
    if missing_port && url.set_port(Some(DEFAULT_OLLAMA_PORT)).is_err() {
        return default_url;
    }

    url.as_str().trim_end_matches('/').to_string()
}

fn has_explicit_port(host: &str) -> bool {
    let authority = host.split(['/', '?', '#']).next().unwrap_or_default();
    authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

/// Environment as UTF-8 pairs; entries that are not valid UTF-8 are skipped.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}
