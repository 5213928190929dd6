use async_trait::async_trait;
use std::{collections::HashMap, path::Path, sync::Arc};
use thiserror::Error;

mod ollama;

pub use embedfn_config::{AppConfig, ConfigError, EmbeddingConfig, EmbeddingModel};
pub use ollama::OllamaEmbedder;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("reqwest failed : {0}")]
    Http(#[from] reqwest::Error),

    #[error("ollama returned {status} : {message}")]
    Ollama {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("expected {expected} embeddings, ollama returned {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("ollama returned no embedding")]
    EmptyResponse,

    #[error("model `{model}` is not pulled on the ollama server")]
    ModelNotPulled { model: String },

    #[error("configuration failed : {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

#[async_trait]
pub trait EmbedderBase {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
    /// One vector per input, in input order.
    async fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
}

/// Client bound to the default model and server. Builds a new client on
/// every call and never touches the network.
pub fn get_embedding_function() -> OllamaEmbedder {
    get_embedding_function_with(&EmbeddingConfig::default())
}

pub fn get_embedding_function_with(config: &EmbeddingConfig) -> OllamaEmbedder {
    OllamaEmbedder::from_config(config.clone())
}

#[derive(Copy, Clone)]
pub struct Embedder;

impl Embedder {
    pub fn from_config(config: &EmbeddingConfig) -> Arc<dyn EmbedderBase + Send + Sync> {
        Arc::new(get_embedding_function_with(config))
    }

    pub fn from_app_config() -> Result<Arc<dyn EmbedderBase + Send + Sync>> {
        Self::from_loaded(AppConfig::load()?)
    }

    /// Same as `from_app_config` with an explicit file and environment.
    pub fn from_sources(
        path: Option<&Path>,
        vars: HashMap<String, String>,
    ) -> Result<Arc<dyn EmbedderBase + Send + Sync>> {
        Self::from_loaded(AppConfig::load_from(path, vars)?)
    }

    fn from_loaded(config: AppConfig) -> Result<Arc<dyn EmbedderBase + Send + Sync>> {
        tracing::debug!(
            model = %config.embedding.model,
            base_url = %config.embedding.base_url,
            "building embedder"
        );
        Ok(Self::from_config(&config.embedding))
    }
}
