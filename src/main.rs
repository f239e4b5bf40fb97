use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use localrag::cache::{FsCacheBackend, ModelCacheManager};
use localrag::config::{AppPaths, RagConfig};
use localrag::embedding::HttpEmbeddingExtractor;
use localrag::engine::{EngineLifecycle, LlamaServerLoader};
use localrag::pipeline::{seed_documents, RagPipeline};
use localrag::retrieval::Retriever;
use localrag::store::SqliteDocumentStore;
use localrag::{logging, RagError};

const SEED_DOCUMENTS: &[&str] = &["Bob likes the color green", "Alice prefers blue"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    let config = RagConfig::load(&paths.config_path).context("Failed to load config")?;

    let store = Arc::new(
        SqliteDocumentStore::new(&paths)
            .await
            .context("Failed to open document store")?,
    );
    let extractor = Arc::new(HttpEmbeddingExtractor::new(
        config.embedding.url.clone(),
        config.embedding.model.clone(),
    ));

    let seeded = seed_documents(store.as_ref(), extractor.as_ref(), SEED_DOCUMENTS).await?;
    if seeded > 0 {
        tracing::info!("Seeded {} demo document(s)", seeded);
    }

    let cache = ModelCacheManager::new(Arc::new(FsCacheBackend::new(paths.cache_dir.clone())));
    let loader = Arc::new(LlamaServerLoader::new(&paths, &config));
    let lifecycle = Arc::new(EngineLifecycle::new(
        loader,
        cache,
        config.model_id.clone(),
    ));

    // Mirror init progress to the terminal while the engine comes up.
    let progress = lifecycle.progress().clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let printer = {
        let progress = progress.clone();
        let seen = seen.clone();
        tokio::spawn(async move {
            loop {
                for line in progress.tail_from(seen.load(Ordering::SeqCst)) {
                    println!("{line}");
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        })
    };

    lifecycle.init().await.context("Engine failed to start")?;
    printer.abort();
    for line in progress.tail_from(seen.load(Ordering::SeqCst)) {
        println!("{line}");
    }

    let question = env::args()
        .nth(1)
        .unwrap_or_else(|| "What color does Bob like?".to_string());

    let pipeline = RagPipeline::new(Retriever::new(store, extractor), lifecycle);
    match pipeline.rag_query(&question, config.top_k).await {
        Ok(answer) => println!("{answer}"),
        Err(err @ RagError::Validation(_)) => {
            eprintln!("invalid query: {err}");
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
