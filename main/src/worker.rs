use std::sync::Arc;

use clap::{Parser, Subcommand};
use common::{
    storage::{db::SurrealDbClient, types::system_settings::SystemSettings},
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use generation_pipeline::{
    answer_comment, generator::OpenAiReplyGenerator, AnswerOptions, AnswerRequest,
};
use ingestion_pipeline::pipeline::{IngestionPipeline, DEFAULT_REEMBED_BATCH_SIZE};
use retrieval_pipeline::pool::{RelevancePoolBuilder, DEFAULT_REBUILD_BATCH_SIZE};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "worker", about = "Batch jobs and one-shot queries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recompute relevance pools for every video context.
    RebuildPools {
        /// Recompute pools that already exist.
        #[arg(long)]
        overwrite: bool,
        #[arg(long, default_value_t = DEFAULT_REBUILD_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Regenerate embeddings for every stored chunk.
    Reembed {
        #[arg(long, default_value_t = DEFAULT_REEMBED_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Answer a single comment and print the validated reply as JSON.
    Answer {
        #[arg(long)]
        context_id: Option<String>,
        query: String,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    // Settings drive the embedding dimension, which the indexes must match.
    let settings = {
        let seeded = SystemSettings::ensure_initialized(&db).await?;
        db.ensure_initialized(seeded.embedding_dimensions).await?;
        seeded
    };

    let embedding_provider = EmbeddingProvider::from_config(
        &config,
        &settings.embedding_model,
        settings.embedding_dimensions,
        Arc::clone(&openai_client),
    )?;
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    match cli.command {
        Command::RebuildPools {
            overwrite,
            batch_size,
        } => {
            let builder = RelevancePoolBuilder::new(Arc::clone(&db));
            let report = builder.rebuild_all(overwrite, batch_size).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Reembed { batch_size } => {
            let pipeline =
                IngestionPipeline::new(Arc::clone(&db), Arc::new(embedding_provider));
            let report = pipeline.reembed_all_chunks(batch_size).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Answer { context_id, query } => {
            let generator =
                OpenAiReplyGenerator::new(Arc::clone(&openai_client), settings.query_model.clone());
            let reply = answer_comment(
                &db,
                &embedding_provider,
                &generator,
                &AnswerRequest {
                    context_id,
                    comment_text: query,
                },
                &AnswerOptions::default(),
            )
            .await?;

            let products: Vec<serde_json::Value> = reply
                .products
                .iter()
                .map(|product| {
                    serde_json::json!({ "id": product.id, "url": product.url })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "reply_text": reply.reply_text,
                    "products": products,
                }))?
            );
        }
    }

    Ok(())
}
