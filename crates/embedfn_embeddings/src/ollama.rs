use crate::{EmbedderBase, EmbedderError, Result};
use async_trait::async_trait;
use embedfn_config::EmbeddingConfig;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use typed_builder::TypedBuilder;

const UNREADABLE_BODY: &str = "<unreadable body>";

#[derive(Serialize)]
struct EmbedRequest<'em> {
    model: &'em str,
    input: &'em [&'em str],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'em str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<EmbedOptions>,
}

#[derive(Serialize)]
struct EmbedOptions {
    num_ctx: u32,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    total_duration: Option<u64>,
    load_duration: Option<u64>,
    prompt_eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Embedding client for an Ollama server. Construction is free of I/O; the
/// model is only resolved by the server when embeddings are requested.
#[derive(Debug, Clone, TypedBuilder)]
pub struct OllamaEmbedder {
    #[builder(default)]
    config: EmbeddingConfig,
    #[builder(default = Client::new())]
    client: Client,
}

impl OllamaEmbedder {
    pub fn from_config(config: EmbeddingConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Vector length the server is expected to return.
    pub fn dimensions(&self) -> usize {
        self.config
            .dimensions
            .unwrap_or_else(|| self.config.model.dimensions())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbedRequest {
            model: self.config.model.as_str(),
            input: texts,
            truncate: self.config.truncate,
            keep_alive: self.config.keep_alive.as_deref(),
            dimensions: self.config.dimensions,
            options: self.config.num_ctx.map(|num_ctx| EmbedOptions { num_ctx }),
        };

        tracing::debug!(model = %self.config.model, inputs = texts.len(), "requesting embeddings");

        let response = self
            .client
            .post(self.endpoint("embed"))
            .timeout(self.config.timeout())
            .json(&request_body)
            .send()
            .await?;
        let embed_response: EmbedResponse = check_status(response).await?.json().await?;

        tracing::trace!(
            total_duration_ns = embed_response.total_duration,
            load_duration_ns = embed_response.load_duration,
            prompt_eval_count = embed_response.prompt_eval_count,
            "ollama embed finished"
        );

        Ok(embed_response.embeddings)
    }

    /// Names of the models pulled on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("tags"))
            .timeout(self.config.timeout())
            .send()
            .await?;
        let tags: TagsResponse = check_status(response).await?.json().await?;
        Ok(tags.models.into_iter().map(|entry| entry.name).collect())
    }

    /// Fails with `ModelNotPulled` unless the server already has the model.
    pub async fn check_model(&self) -> Result<()> {
        let wanted = with_tag(self.config.model.as_str());
        let pulled = self
            .list_models()
            .await?
            .iter()
            .any(|name| with_tag(name) == wanted);

        if !pulled {
            return Err(EmbedderError::ModelNotPulled {
                model: self.config.model.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbedderBase for OllamaEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed(&[text]).await?;
        match embeddings.len() {
            0 => Err(EmbedderError::EmptyResponse),
            1 => Ok(embeddings.swap_remove(0)),
            got => Err(EmbedderError::CountMismatch { expected: 1, got }),
        }
    }

    async fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embed(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(EmbedderError::CountMismatch {
                expected: texts.len(),
                got: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        self.config.model.as_str()
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = error_message(response.text().await);
    Err(EmbedderError::Ollama { status, message })
}

fn error_message(body: std::result::Result<String, reqwest::Error>) -> String {
    match body {
        Ok(text) => serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read ollama error body");
            UNREADABLE_BODY.to_string()
        }
    }
}

// ollama treats an untagged name as `:latest`
fn with_tag(name: &str) -> Cow<'_, str> {
    if name.contains(':') {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}:latest"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedfn_config::EmbeddingModel;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn embedder_for(server: &MockServer, config: EmbeddingConfig) -> OllamaEmbedder {
        OllamaEmbedder::from_config(EmbeddingConfig {
            base_url: server.uri(),
            ..config
        })
    }

    #[tokio::test]
    async fn embeds_documents_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_json(json!({
                "model": "mxbai-embed-large:335m",
                "input": ["first", "second"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mxbai-embed-large:335m",
                "embeddings": [[0.5, 0.25], [-1.0, 2.0]],
                "total_duration": 1200,
                "load_duration": 300,
                "prompt_eval_count": 4,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        let embeddings = embedder
            .generate_embeddings(&["first", "second"])
            .await
            .unwrap();
        assert_eq!(embeddings, vec![vec![0.5, 0.25], vec![-1.0, 2.0]]);
    }

    #[tokio::test]
    async fn forwards_optional_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_json(json!({
                "model": "nomic-embed-text:latest",
                "input": ["query"],
                "truncate": false,
                "keep_alive": "5m",
                "dimensions": 2,
                "options": { "num_ctx": 4096 },
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0]] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder = embedder_for(
            &server,
            EmbeddingConfig {
                truncate: Some(false),
                keep_alive: Some("5m".to_string()),
                dimensions: Some(2),
                num_ctx: Some(4096),
                ..EmbeddingConfig::for_model(EmbeddingModel::NomicEmbedText)
            },
        );
        let embedding = embedder.generate_embedding("query").await.unwrap();
        assert_eq!(embedding, vec![1.0, 0.0]);
        assert_eq!(embedder.dimensions(), 2);
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.125]] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::from_config(EmbeddingConfig {
            base_url: format!("{}/", server.uri()),
            ..Default::default()
        });
        assert_eq!(embedder.generate_embedding("x").await.unwrap(), vec![0.125]);
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        assert!(embedder.generate_embeddings(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ollama_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "model \"embeddinggemma:300m\" not found, try pulling it first",
            })))
            .mount(&server)
            .await;

        let embedder = embedder_for(
            &server,
            EmbeddingConfig::for_model(EmbeddingModel::EmbeddingGemma),
        );
        match embedder.generate_embedding("hello").await.unwrap_err() {
            EmbedderError::Ollama { status, message } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(message.contains("try pulling it first"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_error_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        match embedder.generate_embeddings(&["a"]).await.unwrap_err() {
            EmbedderError::Ollama { status, message } => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "backend exploded");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.5]] })),
            )
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        let err = embedder.generate_embeddings(&["a", "b"]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::CountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[tokio::test]
    async fn no_vector_for_single_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        let err = embedder.generate_embedding("a").await.unwrap_err();
        assert!(matches!(err, EmbedderError::EmptyResponse));
    }

    #[tokio::test]
    async fn extra_vectors_for_single_text_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "embeddings": [[0.5], [0.25]] })),
            )
            .mount(&server)
            .await;

        let embedder = embedder_for(&server, EmbeddingConfig::default());
        let err = embedder.generate_embedding("a").await.unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::CountMismatch {
                expected: 1,
                got: 2
            }
        ));
    }

    #[tokio::test]
    async fn unreadable_error_body_gets_placeholder() {
        let read_failure = reqwest::get("http://127.0.0.1:1").await.unwrap_err();
        assert_eq!(error_message(Err(read_failure)), UNREADABLE_BODY);
        assert_eq!(error_message(Ok(String::new())), "");
        assert_eq!(
            error_message(Ok(r#"{"error":"out of memory"}"#.to_string())),
            "out of memory"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let embedder = OllamaEmbedder::from_config(EmbeddingConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        });
        let err = embedder.generate_embedding("a").await.unwrap_err();
        assert!(matches!(err, EmbedderError::Http(_)));
    }

    #[tokio::test]
    async fn check_model_against_pulled_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "name": "mxbai-embed-large:335m", "size": 669615493 },
                    { "name": "nomic-embed-text", "size": 274302450 },
                ],
            })))
            .mount(&server)
            .await;

        let mxbai = embedder_for(&server, EmbeddingConfig::default());
        assert_eq!(
            mxbai.list_models().await.unwrap(),
            vec!["mxbai-embed-large:335m", "nomic-embed-text"]
        );
        mxbai.check_model().await.unwrap();

        let nomic = embedder_for(
            &server,
            EmbeddingConfig::for_model(EmbeddingModel::NomicEmbedText),
        );
        nomic.check_model().await.unwrap();

        let gemma = embedder_for(
            &server,
            EmbeddingConfig::for_model(EmbeddingModel::EmbeddingGemma),
        );
        match gemma.check_model().await.unwrap_err() {
            EmbedderError::ModelNotPulled { model } => assert_eq!(model, "embeddinggemma:300m"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn untagged_names_mean_latest() {
        assert_eq!(with_tag("nomic-embed-text"), "nomic-embed-text:latest");
        assert_eq!(with_tag("embeddinggemma:300m"), "embeddinggemma:300m");
    }
}
