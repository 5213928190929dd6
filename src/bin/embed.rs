use anyhow::{bail, Result};
use clap::Parser;
use dotenv::dotenv;
use embedfn::{
    cli::{render_embeddings, Cli},
    tracing_conf,
};
use embedfn_embeddings::{get_embedding_function_with, AppConfig, EmbedderBase};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    let _guard = tracing_conf::init_tracing(&config.logging)?;

    if let Some(model) = cli.model {
        config.embedding.model = model;
    }
    let embedder = get_embedding_function_with(&config.embedding);

    if cli.list_models {
        for name in embedder.list_models().await? {
            println!("{name}");
        }
        return Ok(());
    }

    if cli.check {
        embedder.check_model().await?;
        info!(model = embedder.model_name(), "model is pulled");
        println!("{} is available", embedder.model_name());
        return Ok(());
    }

    let texts = cli.texts_or_lines(std::io::stdin().lock())?;
    if texts.is_empty() {
        bail!("nothing to embed, pass texts as arguments or on stdin");
    }

    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    info!(model = embedder.model_name(), inputs = inputs.len(), "embedding");
    let embeddings = embedder.generate_embeddings(&inputs).await?;

    let output = render_embeddings(embedder.model_name(), embedder.dimensions(), &embeddings);
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}
