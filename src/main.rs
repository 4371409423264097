mod cli;
mod pipeline;

use clap::Parser;
use cli::{Cli, Command, Mode, PostSource, RunOptions};
use crossposter_core::{ConfigError, CoreError, ErrorExt, ErrorReporter, ReelConfig};
use database::Database;
use instagram_uploader::{refresh_long_lived_token, ReqwestTransport};
use pipeline::Pipeline;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Every workspace crate logs at info; everything else only warns.
const DEFAULT_LOG_FILTER: &str = "warn,crossposter=info,crossposter_core=info,reddit_client=info,\
reel_creator=info,instagram_uploader=info,database=info,background_service=info";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Could not initialise logging: {e:#}");
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            eprintln!("Error [{}]: {}", e.error_code(), e.user_friendly_message());
            ExitCode::from(1)
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let config = ReelConfig::load(cli.config.as_deref())?;
    tracing::info!("Starting crossposter");

    match &cli.command {
        Some(Command::InitDb) => {
            open_store(&config).await?;
            println!("Database ready at {}", config.database_url);
            Ok(())
        }
        Some(Command::ClearPosts) => {
            let removed = open_store(&config).await?.clear_posts().await?;
            println!("Removed {} recorded posts", removed);
            Ok(())
        }
        Some(Command::History { limit }) => {
            let records = open_store(&config).await?.recent_posts(*limit).await?;
            if records.is_empty() {
                println!("Nothing published yet");
            }
            for record in records {
                println!(
                    "{}  {:<5}  r/{:<20} {:<10} {}",
                    record.posted_at.format("%Y-%m-%d %H:%M"),
                    record.media_kind.as_str(),
                    record.subreddit,
                    record.reddit_post_id,
                    record.title
                );
            }
            Ok(())
        }
        Some(Command::CleanTemp) => {
            let removed = reel_creator::cleanup_all(&config.temp_dir).await?;
            println!("Removed {} entries from {}", removed, config.temp_dir.display());
            Ok(())
        }
        Some(Command::RefreshToken) => refresh_token(&config).await,
        Some(Command::Schedule {
            subreddit,
            slot_hours,
        }) => {
            let subreddit = subreddit
                .clone()
                .unwrap_or_else(|| config.reddit.image_subreddit.clone());
            schedule(config, subreddit, *slot_hours).await
        }
        None => {
            let options = cli.run_options()?;
            let store = open_store(&config).await?;
            let mut pipeline = Pipeline::from_config(config, store, options.mode, !options.no_upload)?;
            let outcome = pipeline.run(&options).await?;
            match outcome.media_id {
                Some(media_id) => println!(
                    "Published {} as Instagram media {} ({})",
                    outcome.post_id,
                    media_id,
                    outcome.output.display()
                ),
                None => println!("Saved {} to {}", outcome.post_id, outcome.output.display()),
            }
            Ok(())
        }
    }
}

async fn open_store(config: &ReelConfig) -> Result<Database, CoreError> {
    let mut store = Database::new(config.database_url.clone());
    store.connect().await?;
    store.run_migrations().await?;
    Ok(store)
}

async fn refresh_token(config: &ReelConfig) -> Result<(), CoreError> {
    let (app_id, app_secret) =
        config
            .credentials
            .facebook_app()
            .ok_or_else(|| ConfigError::MissingField {
                field: "fb_app_id/fb_app_secret".to_string(),
            })?;
    let token = config
        .credentials
        .instagram_access_token()
        .ok_or_else(|| ConfigError::MissingField {
            field: "instagram_access_token".to_string(),
        })?;

    let transport = ReqwestTransport::new()?;
    let refreshed =
        refresh_long_lived_token(&transport, &config.instagram, app_id, app_secret, token).await?;
    match refreshed.expires_in {
        Some(secs) => println!(
            "New access token (expires in {} days):\n{}",
            secs / 86_400,
            refreshed.access_token
        ),
        None => println!("New access token:\n{}", refreshed.access_token),
    }
    Ok(())
}

async fn schedule(config: ReelConfig, subreddit: String, slot_hours: u32) -> Result<(), CoreError> {
    let service = background_service::BackgroundService::new(slot_hours)?;
    let store = open_store(&config).await?;
    let pipeline = Arc::new(Mutex::new(Pipeline::from_config(
        config, store, Mode::Image, true,
    )?));
    let options = RunOptions {
        source: PostSource::Subreddit(subreddit),
        mode: Mode::Image,
        output_path: None,
        caption: None,
        no_upload: false,
        share_to_feed: true,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    service
        .run(
            || {
                let pipeline = pipeline.clone();
                let options = options.clone();
                async move {
                    let outcome = pipeline.lock().await.run(&options).await?;
                    tracing::info!("Scheduled post {} published", outcome.post_id);
                    Ok::<(), CoreError>(())
                }
            },
            shutdown,
        )
        .await
}
