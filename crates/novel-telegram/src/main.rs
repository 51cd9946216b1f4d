//! Novel Telegram bot binary.
//!
//! Start the bot with:
//! ```bash
//! BOT_TOKEN=xxx BOT_OPENAI_API_KEY=sk-xxx cargo run -p novel-telegram
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use novel_assistant::{AssistantGateway, GatewayConfig, OpenAiGateway};
use novel_core::config::{self, BotConfig, STATE_DIR_ENV};
use novel_engine::{EngineConfig, NovelEngine, PaymentService};
use novel_persistence::{JsonSessionStore, SessionStore};
use novel_telegram::{resolve_assistant_id, AssistantSource, BotState, ImageCache, NovelBot};
use tracing_subscriber::EnvFilter;

/// Interactive novel bot for Telegram
#[derive(Parser, Debug)]
#[command(name = "novel-telegram")]
#[command(about = "Telegram bot that tells an interactive story driven by an OpenAI assistant")]
struct Args {
    /// State directory (default: ~/.novel-bot)
    #[arg(long, env = STATE_DIR_ENV)]
    state_dir: Option<PathBuf>,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Must happen before the first state path lookup
    if let Some(dir) = &args.state_dir {
        std::env::set_var(STATE_DIR_ENV, dir);
    }

    // Load environment variables from config directory first
    let env_path = config::env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());

    let filter = match args.verbose {
        0 => "novel_telegram=info,novel_engine=info,novel_assistant=warn,teloxide=warn",
        1 => "novel_telegram=debug,novel_engine=debug,novel_assistant=info,teloxide=info",
        2 => "novel_telegram=trace,novel_engine=trace,novel_assistant=debug,teloxide=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bot_config = BotConfig::from_env()?;
    tracing::debug!(config = ?bot_config, "Configuration loaded");

    if let Err(e) = config::ensure_all_dirs() {
        tracing::warn!(error = %e, "Failed to create all directories");
    }

    let store: Arc<dyn SessionStore> =
        Arc::new(JsonSessionStore::open(config::sessions_dir()).await?);

    let gateway_config = GatewayConfig::new(bot_config.openai_api_key.clone())
        .with_base_url(bot_config.openai_base_url.clone())
        .with_poll_interval(bot_config.poll_interval)
        .with_run_timeout(bot_config.run_timeout);
    let gateway: Arc<dyn AssistantGateway> = Arc::new(OpenAiGateway::new(gateway_config));

    let id_file = config::assistant_id_file();
    let source = AssistantSource {
        configured: bot_config.assistant_id.as_deref(),
        id_file: &id_file,
        scenario_path: &bot_config.scenario_path,
        model: &bot_config.assistant_model,
    };
    let assistant_id = resolve_assistant_id(&source, gateway.as_ref()).await?;
    tracing::info!(assistant_id = %assistant_id, "Assistant ready");

    let engine = NovelEngine::new(gateway, Arc::clone(&store), EngineConfig::new(assistant_id));
    let payments = PaymentService::new(store, bot_config.restart_cost);
    let images = ImageCache::new(config::image_cache_dir())?;

    let bot = NovelBot::new(BotState::new(engine, payments, images, bot_config));

    match bot.get_me().await {
        Ok(username) => {
            tracing::info!(username = %username, "Bot initialized successfully");
            println!("\n[book] Novel Telegram Bot");
            println!("   Bot: @{}", username);
            println!("   State: {}", config::state_dir().display());
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get bot info");
            return Err(e.into());
        }
    }

    println!("\n[phone] Open Telegram and send /start to begin");
    println!("   Press Ctrl+C to stop\n");

    bot.start_polling().await?;

    Ok(())
}
