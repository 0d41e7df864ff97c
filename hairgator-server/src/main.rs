use std::sync::Arc;

use clap::Parser;
use hairgator_core::HairgatorConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use hairgator_server::http::{self, HttpState};
use hairgator_server::subsystems::conversation::ConversationManager;
use hairgator_server::subsystems::styles::StyleTable;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "hairgator.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match HairgatorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.health {
        return run_health_check(&config).await;
    }

    let styles = StyleTable::load_or_default(&config.styles.path);
    let conversations = ConversationManager::from_config(&config.conversation).await;

    let vision = match hairgator_core::create_vision_backend(&config) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Vision backend unavailable: {}", e);
            None
        }
    };
    let completion = match hairgator_core::create_completion_backend(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Completion backend unavailable: {}", e);
            None
        }
    };

    tracing::info!(
        styles = styles.len(),
        conversation_store = conversations.backend_name(),
        vision = vision.as_deref().map(|v| v.name()).unwrap_or("disabled"),
        completion = completion.as_deref().map(|c| c.name()).unwrap_or("fallback"),
        "HairGator starting"
    );

    let state = Arc::new(HttpState {
        config,
        styles,
        conversations,
        vision,
        completion,
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}

async fn run_health_check(config: &HairgatorConfig) -> anyhow::Result<()> {
    match StyleTable::load(&config.styles.path) {
        Ok(table) => println!("✅ Style table: {} rows from {}", table.len(), config.styles.path),
        Err(e) => println!("⚠️  Style table unavailable ({}), built-in records will be used", e),
    }

    match config.conversation.database_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            let pool = match hairgator_core::db::create_pool(&config.conversation, url).await {
                Ok(p) => p,
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            };
            match hairgator_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL query failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => println!("✅ Conversation history: in-memory"),
    }

    if config.openai_api_key().is_empty() {
        println!("⚠️  OPENAI_API_KEY not set, built-in fallback responses only");
    } else {
        println!("✅ Completion API key present");
    }

    if config.vision.backend == "disabled" {
        println!("✅ Vision: disabled");
    } else if config.vision_api_key().is_empty() {
        println!("⚠️  No API key for vision backend {}", config.vision.backend);
    } else {
        println!("✅ Vision backend: {}", config.vision.backend);
    }

    println!("✅ HairGator health check passed");
    Ok(())
}
