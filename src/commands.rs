use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::HelperError;
use crate::bot::discord::{RestClient, spawn_gateway};
use crate::bot::{self, BotContext, IndexRetriever, RetrievalChain};
use crate::config::{BotSecrets, Config, IngestSecrets, github_token};
use crate::database::{VectorIndex, index_files_present};
use crate::distributor::{DownloadOutcome, IndexDistributor};
use crate::embeddings::OllamaClient;
use crate::indexer::{ConsistencyValidator, IndexBuilder, collect_chunks};
use crate::llm::GeminiClient;
use crate::sources::{DocumentLoader, IssueClient, SourceCollector, default_repositories};

fn distributor(config: &Config) -> Result<IndexDistributor> {
    IndexDistributor::new(
        config.distributor.clone().with_env_overrides(),
        config.index_path(),
        github_token(),
    )
    .context("Failed to set up index distributor")
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task panicked")?
}

/// Clone the source repositories, embed everything and write a fresh index
#[inline]
pub async fn ingest(config: &Config) -> Result<()> {
    let secrets = IngestSecrets::from_env()?;

    let embedder = OllamaClient::new(&config.ollama)?;
    let health = embedder.clone();
    blocking(move || health.health_check())
        .await
        .context("Ollama is not ready for ingestion")?;

    let clone_root = config.clone_path();
    let chunking = config.chunking.clone();
    let token = secrets.github_access_token;
    let (chunks, stats) = blocking(move || {
        let issues = IssueClient::new(Some(token))?;
        let loader = DocumentLoader::new().with_issue_source(Box::new(issues));
        collect_chunks(
            &default_repositories(),
            &SourceCollector::new(clone_root),
            &loader,
            &chunking,
        )
    })
    .await?;

    println!("Loaded {} repositories:", stats.repositories);
    println!("  File documents: {}", stats.file_documents);
    println!("  Issue documents: {}", stats.issue_documents);
    if stats.skipped_targets > 0 {
        println!("  Skipped missing targets: {}", stats.skipped_targets);
    }
    println!("  Chunks: {}", stats.chunks);

    let index_path = config.index_path();
    let built = IndexBuilder::new(Arc::new(embedder), config.indexing.batch_size)
        .with_model_name(&config.ollama.model)
        .build(&chunks, &index_path)
        .await?;

    println!();
    println!(
        "Index saved to {} ({} chunks, {} batches, {} dimensions)",
        index_path.display(),
        built.chunks,
        built.batches,
        built.dimension
    );
    Ok(())
}

/// Download the latest published index unless the local one is fresh
#[inline]
pub async fn fetch_index(config: &Config, force: bool) -> Result<()> {
    let distributor = distributor(config)?;
    let outcome = blocking(move || {
        distributor
            .download_index(force)
            .map_err(|e| HelperError::Distribution(e).into())
    })
    .await?;

    match outcome {
        DownloadOutcome::AlreadyFresh => println!("Local index is up to date."),
        DownloadOutcome::Downloaded { tag } => println!("Downloaded index {}.", tag),
        DownloadOutcome::KeptLocal => {
            println!("No published index found; keeping the local index.");
        }
    }
    Ok(())
}

#[inline]
pub async fn check_updates(config: &Config) -> Result<()> {
    let distributor = distributor(config)?;
    let (available, local_tag) = blocking(move || {
        Ok((
            distributor.check_for_updates(),
            distributor.local_release_tag(),
        ))
    })
    .await?;

    let local_tag = local_tag.unwrap_or_else(|| "none".to_string());
    if available {
        println!("An index update is available (local: {}).", local_tag);
        println!("Run 'pypsa-helper-bot fetch-index --force' to download it.");
    } else {
        println!("No index update available (local: {}).", local_tag);
    }
    Ok(())
}

/// Show the local index, its consistency and the embedding backend
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let distributor = distributor(config)?;
    let info = distributor.index_info();

    println!("📊 PyPSA Helper Bot Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗂️  Index:");
    println!("   Path: {}", info.path.display());
    if !info.exists {
        println!("   ❌ Not found. Run 'fetch-index' or 'ingest'.");
    } else {
        println!("   ✅ Present");
        println!(
            "   🕒 Last updated: {}",
            info.last_updated.as_deref().unwrap_or("unknown")
        );
        println!(
            "   🏷️  Release tag: {}",
            info.release_tag.as_deref().unwrap_or("local build")
        );
        if let Some(bytes) = info.vectors_size_bytes {
            println!("   💾 Vectors: {:.2} MB", bytes as f64 / 1024.0 / 1024.0);
        }
        if let Some(bytes) = info.docstore_size_bytes {
            println!("   💾 Docstore: {:.2} MB", bytes as f64 / 1024.0 / 1024.0);
        }
    }

    if info.exists && index_files_present(&info.path) {
        match VectorIndex::open(&info.path).await {
            Ok(index) => {
                let chunks = index.docs().count_chunks().await?;
                let build = index.build_info().await?;
                println!("   📄 Chunks: {}", chunks);
                println!("   🔢 Dimensions: {}", index.dimension());
                println!(
                    "   🧠 Embedding model: {}",
                    build.embedding_model.as_deref().unwrap_or("unknown")
                );
                println!(
                    "   🏗️  Built at: {}",
                    build.built_at.as_deref().unwrap_or("unknown")
                );
                for (repository, count) in index.docs().count_by_repository().await? {
                    println!("      {}: {}", repository, count);
                }

                println!();
                println!("🔍 Index Consistency:");
                let report = ConsistencyValidator::new(index.docs(), index.vectors())
                    .validate_consistency()
                    .await?;
                if report.is_consistent {
                    println!("   ✅ Docstore and vectors are aligned");
                } else {
                    println!("   ⚠️  {}", report.summary());
                }
                match index.verify().await {
                    Ok(true) => println!("   ✅ Vector table integrity check passed"),
                    Ok(false) => println!("   ⚠️  Vector table integrity check failed"),
                    Err(e) => println!("   ❌ Integrity check error - {:#}", e),
                }
            }
            Err(e) => println!("   ❌ Failed to open index - {:#}", e),
        }
    }

    println!();
    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match blocking(move || client.health_check()).await {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to configure - {}", e),
    }

    Ok(())
}

/// Make sure an index is present, then answer mentions until the gateway stops
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let secrets = BotSecrets::from_env()?;

    let distributor = distributor(config)?;
    blocking(move || {
        distributor
            .ensure_index_available()
            .map_err(|e| HelperError::Distribution(e).into())
    })
        .await
        .context("No index available to serve")?;

    let index = VectorIndex::open(&config.index_path()).await?;
    let embedder = Arc::new(OllamaClient::new(&config.ollama)?);
    let retriever = IndexRetriever::new(index, embedder)?;
    let llm = GeminiClient::new(&config.llm, secrets.google_api_key.clone())?;
    info!("Answering with {}", llm.model());

    let chain = RetrievalChain::new(
        Arc::new(retriever),
        Arc::new(llm),
        config.bot.retrieval_k,
    );
    let transport = Arc::new(RestClient::new(secrets.discord_token.clone()));
    let ctx = Arc::new(BotContext::new(chain, transport, config.bot.clone()));

    let events = spawn_gateway(secrets.discord_token);
    bot::run(ctx, events).await;
    warn!("Bot stopped");
    Ok(())
}
