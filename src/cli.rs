use clap::Parser;
use embedfn_config::EmbeddingModel;
use serde_json::{json, Value};
use std::io::{self, BufRead};

/// Embed text with a model served by Ollama.
#[derive(Debug, Parser)]
#[command(name = "embed", version)]
pub struct Cli {
    /// Model identifier, overrides the configured one
    #[arg(short = 'm', long = "model")]
    pub model: Option<EmbeddingModel>,

    /// Only check that the model is pulled on the server
    #[arg(long, conflicts_with = "list_models")]
    pub check: bool,

    /// Print the models pulled on the server
    #[arg(long = "list-models")]
    pub list_models: bool,

    /// Texts to embed; read from stdin, one per line, when empty
    pub texts: Vec<String>,
}

impl Cli {
    pub fn texts_or_lines(&self, reader: impl BufRead) -> io::Result<Vec<String>> {
        if !self.texts.is_empty() {
            return Ok(self.texts.clone());
        }

        let mut texts = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                texts.push(line.to_string());
            }
        }
        Ok(texts)
    }
}

pub fn render_embeddings(
    model: &str,
    expected_dimensions: usize,
    embeddings: &[Vec<f32>],
) -> Value {
    let dimensions = embeddings.first().map_or(expected_dimensions, Vec::len);
    json!({
        "model": model,
        "dimensions": dimensions,
        "embeddings": embeddings,
    })
}
