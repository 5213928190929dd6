use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Embedding models known to work with the Ollama backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmbeddingModel {
    #[default]
    MxbaiEmbedLarge,
    EmbeddingGemma,
    NomicEmbedText,
}

impl EmbeddingModel {
    pub const ALL: [EmbeddingModel; 3] = [
        EmbeddingModel::MxbaiEmbedLarge,
        EmbeddingModel::EmbeddingGemma,
        EmbeddingModel::NomicEmbedText,
    ];

    /// Identifier sent to Ollama, tag included.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::MxbaiEmbedLarge => "mxbai-embed-large:335m",
            EmbeddingModel::EmbeddingGemma => "embeddinggemma:300m",
            EmbeddingModel::NomicEmbedText => "nomic-embed-text:latest",
        }
    }

    /// Identifier without its `:tag` suffix.
    pub fn family(&self) -> &'static str {
        let id = self.as_str();
        id.split_once(':').map_or(id, |(family, _)| family)
    }

    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingModel::MxbaiEmbedLarge => 1024,
            EmbeddingModel::EmbeddingGemma => 768,
            EmbeddingModel::NomicEmbedText => 768,
        }
    }

    fn accepted() -> String {
        Self::ALL
            .iter()
            .map(EmbeddingModel::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == wanted || model.family() == wanted)
            .ok_or_else(|| ConfigError::UnknownModel {
                model: s.trim().to_string(),
                accepted: Self::accepted(),
            })
    }
}

impl TryFrom<String> for EmbeddingModel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EmbeddingModel> for String {
    fn from(model: EmbeddingModel) -> Self {
        model.as_str().to_string()
    }
}
