use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::QuestionIndex;
use crate::dataset::{CategoryStore, DatasetStore};
use crate::embeddings::ollama::OllamaClient;
use crate::server;
use crate::service::ChatService;

/// Start the HTTP chat server.
#[inline]
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    // Verify Ollama connectivity before accepting traffic.
    match OllamaClient::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                info!(
                    "✅ Ollama connected at {}:{} (embeddings: {}, chat: {})",
                    config.ollama.host,
                    config.ollama.port,
                    config.ollama.embedding_model,
                    config.ollama.chat_model
                );
            }
            Err(e) => {
                warn!("⚠️  Ollama is reachable but unhealthy: {}", e);
                println!("Warning: Ollama may not be ready. Answers will degrade to the fallback.");
            }
        },
        Err(e) => {
            error!("❌ Failed to connect to Ollama: {}", e);
            println!(
                "Error: Cannot connect to Ollama at {}:{}",
                config.ollama.host, config.ollama.port
            );
            println!("Please ensure Ollama is running and accessible.");
            println!("Use 'support-chat config' to update connection settings.");
            return Err(e);
        }
    }

    let service = ChatService::new(config)
        .await
        .context("Failed to initialize chat service")?;
    let service = Arc::new(service);

    println!(
        "🌐 Serving on http://{}:{}",
        service.config().server.host,
        service.config().server.port
    );
    println!("📊 Use 'support-chat status' to check dataset and index health");
    println!("Press Ctrl+C to stop the server");

    let app = server::run(Arc::clone(&service));
    tokio::select! {
        result = app => {
            result.context("Server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    println!("✅ Shutdown complete");
    Ok(())
}

/// Rebuild the question corpus and vector index from the dataset on disk.
#[inline]
pub async fn rebuild() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let dataset = DatasetStore::new(config.dataset_path());
    let entries = dataset.load().context("Failed to load dataset")?;
    println!(
        "📚 Rebuilding from {} dataset entries at {}",
        entries.len(),
        config.dataset_path().display()
    );

    let service = ChatService::new(config)
        .await
        .context("Failed to initialize chat service")?;
    let indexed = service
        .rebuild_index()
        .await
        .context("Failed to rebuild the question index")?;

    println!("✅ Rebuild complete: {} documents indexed", indexed);
    Ok(())
}

/// Show the health of the dataset, index, and Ollama providers.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("📊 Support-Chat Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("📚 Dataset Status:");
    let dataset = DatasetStore::new(config.dataset_path());
    match dataset.load() {
        Ok(entries) => {
            let questions: usize = entries.iter().map(|e| e.questions.len()).sum();
            println!("   ✅ File: {}", config.dataset_path().display());
            println!("   📄 Entries: {}", entries.len());
            println!("   💬 Question paraphrases: {}", questions);
        }
        Err(e) => {
            println!("   ❌ Dataset: Failed to load - {}", e);
        }
    }

    println!("🏷️  Categories:");
    match CategoryStore::new(config.categories_path()).load() {
        Ok(categories) => {
            println!("   ✅ Labels: {}", categories.join(", "));
        }
        Err(e) => {
            println!("   ❌ Categories: Failed to load - {}", e);
        }
    }

    println!("🔍 Vector Index Status:");
    match QuestionIndex::new(config.vector_database_path()).await {
        Ok(index) => match index.exists().await {
            Ok(true) => {
                let count = index.count().await.unwrap_or(0);
                println!("   ✅ LanceDB: Connected ({} documents)", count);
            }
            Ok(false) => {
                println!("   💤 LanceDB: Connected, index not built yet");
                println!("   💡 Run 'support-chat rebuild' to build it");
            }
            Err(e) => {
                println!("   ⚠️  LanceDB: Connected but unreadable - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Chat Model: {}", config.ollama.chat_model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'support-chat config' to adjust connection settings");
    println!("   • Use 'support-chat rebuild' to reindex after editing the dataset");
    println!("   • Use 'support-chat serve' to start the HTTP chat server");

    Ok(())
}
