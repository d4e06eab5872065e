use background_service::{build_notifier, BackgroundService, DispatchConfig, DispatchLoop};
use database::Database;
use listener_core::{
    AppConfig, CoreError, ErrorRecovery, ErrorReporter, RecoveryStrategy, SeenStore,
};
use reddit_client::{RedditFeed, RedditFeedConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reddit_listener=info,background_service=info,reddit_client=info,database=info,listener_core=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    dotenvy::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Reddit Listener");

    if let Err(e) = run().await {
        ErrorReporter::new().report_error(&e);
        return Err(e);
    }

    Ok(())
}

async fn run() -> Result<(), CoreError> {
    let config = AppConfig::load()?;
    let credentials = config.reddit.credentials()?;
    let matcher = config.matching.matcher();
    info!(
        subreddits = ?config.reddit.channels(),
        keywords = matcher.keywords().len(),
        mode = ?matcher.mode(),
        notifier = ?config.notifier.kind,
        "Configuration loaded"
    );

    let mut database = Database::new(config.storage.database_url.clone());
    database.connect().await?;
    database.run_migrations().await?;
    let database = Arc::new(database);
    info!("{} items already recorded", database.count().await?);

    let mut feed = RedditFeed::new(&credentials, RedditFeedConfig::from_config(&config.reddit))?;
    let login = RecoveryStrategy::RetryWithBackoff {
        max_attempts: 3,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(120),
    };
    let (token, user) = ErrorRecovery::apply_strategy(login, || feed.login())
        .await
        .into_result()?;
    feed.set_token(token);
    info!("Listening as u/{}", user.name);

    let notifier = build_notifier(&config.notifier)?;
    let dispatch = DispatchLoop::new(
        Box::new(feed),
        database.clone(),
        matcher,
        notifier,
        DispatchConfig::from_config(&config),
    );

    let mut service = BackgroundService::new(dispatch);
    service.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, finishing current item");

    let stats = service.stop().await?;
    info!(
        received = stats.items_received,
        notified = stats.notified,
        "Reddit Listener stopped"
    );

    database.close().await;
    Ok(())
}
