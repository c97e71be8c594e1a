use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lgtm_core::{Bot, BotTier, Ids, Options, ProviderBot, create_bot};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[command(name = "lgtm")]
#[command(version)]
#[command(about = "lgtm: LLM bots for pull request review")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show the validated configuration
    Config,

    /// Show token limits of the light and heavy models
    Limits,

    /// Check paths against the configured path filters
    CheckPath {
        /// Paths to check
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Send messages to a bot and print the responses
    Ask {
        /// Use the heavy model instead of the light one
        #[arg(long)]
        heavy: bool,

        /// Messages to send, one request each
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging, RUST_LOG takes precedence over --debug
    let filter = if cli.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        error!("panic: {}", panic_info);
    }));

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Limits => cmd_limits(&cli.config).await,
        Commands::CheckPath { paths } => cmd_check_path(&cli.config, &paths).await,
        Commands::Ask { heavy, messages } => {
            let tier = if heavy { BotTier::Heavy } else { BotTier::Light };
            cmd_ask(&cli.config, tier, messages).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("lgtm initialized at {}", config_dir.display());
    println!("Edit {} to choose a provider and models.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let options = config::load_options(config_path)?;
    options.log_summary();

    let kind = options.provider();
    println!(
        "{} ({}): {}",
        kind.display_name(),
        kind.credential_var(),
        config::credential_status(kind)
    );
    Ok(())
}

async fn cmd_limits(config_path: &Option<PathBuf>) -> Result<()> {
    let options = config::load_options(config_path)?;
    for tier in [BotTier::Light, BotTier::Heavy] {
        let model = options.model_options(tier);
        println!(
            "{:<5} {} ({}): {}, knowledge_cut_off={}",
            tier,
            model.model,
            options.provider(),
            model.token_limits,
            model.token_limits.knowledge_cut_off()
        );
    }
    Ok(())
}

async fn cmd_check_path(config_path: &Option<PathBuf>, paths: &[String]) -> Result<()> {
    let options = config::load_options(config_path)?;
    println!("filters: {}", options.path_filters());
    for path in paths {
        let verdict = if options.check_path(path) { "review" } else { "skip" };
        println!("{:<6} {}", verdict, path);
    }
    Ok(())
}

fn build_bot(options: &Arc<Options>, tier: BotTier) -> Result<ProviderBot> {
    create_bot(options.clone(), options.model_options(tier))
        .with_context(|| format!("Failed to create the {} bot", tier))
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    tier: BotTier,
    messages: Vec<String>,
) -> Result<()> {
    let options = Arc::new(config::load_options(config_path)?);

    let light = Arc::new(build_bot(&options, BotTier::Light)?);
    let heavy = Arc::new(build_bot(&options, BotTier::Heavy)?);
    let bot = match tier {
        BotTier::Light => light,
        BotTier::Heavy => heavy,
    };
    info!("Asking the {} bot ({} message(s))", tier, messages.len());

    let semaphore = Arc::new(Semaphore::new(options.concurrency_limit()));
    let mut join_set = JoinSet::new();

    for (index, message) in messages.into_iter().enumerate() {
        let bot = bot.clone();
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Concurrency semaphore closed")?;
        join_set.spawn(async move {
            let _permit = permit;
            let (text, ids) = bot.chat(&message).await;
            (index, text, ids)
        });
    }

    let mut results: Vec<(usize, String, Ids)> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => error!("Chat task failed: {}", e),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);

    for (index, text, ids) in results {
        println!("── [{}] {}", index + 1, serde_json::to_string(&ids)?);
        if text.is_empty() {
            println!("(no response)");
        } else {
            println!("{}", text);
        }
    }
    Ok(())
}
