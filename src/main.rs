use chrono::Utc;
use github_alert_hooks::api::build_router;
use github_alert_hooks::error::AlertError;
use github_alert_hooks::github::{GitHubClient, GitHubService};
use github_alert_hooks::logging::{FileLogger, setup_logging};
use github_alert_hooks::notify::{LogNotifier, Notifier, TeamsNotifier};
use github_alert_hooks::pipeline::Pipeline;
use github_alert_hooks::registry::Registry;
use github_alert_hooks::utils::AllowList;
use github_alert_hooks::{AppConfig, AppState, load_config};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{self, error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "alert_hooks.toml";

/// Startup GitHub checks: credentials, and optionally the live hook ranges.
async fn prepare_github(
    config: &AppConfig,
    client: &GitHubClient,
) -> Result<AllowList, AlertError> {
    match client.authenticated_login().await {
        Ok(login) => info!("Authenticated against GitHub as '{}'", login),
        Err(e) => warn!("Could not verify GitHub credentials: {}", e),
    }

    if config.server.refresh_allowed_cidrs {
        match client.hook_ranges().await {
            Ok(ranges) if !ranges.is_empty() => {
                info!("Loaded {} webhook source ranges from GitHub", ranges.len());
                return AllowList::parse(&ranges, config.server.allow_localhost);
            }
            Ok(_) => warn!("GitHub returned no webhook ranges; keeping configured list"),
            Err(e) => warn!("Could not refresh webhook ranges: {}", e),
        }
    }

    AllowList::parse(&config.server.allowed_cidrs, config.server.allow_localhost)
}

async fn run(config: AppConfig, config_path: &str) -> Result<(), AlertError> {
    let webhook_secret = config
        .webhook_secret()
        .ok_or_else(|| AlertError::Config("webhook secret is not configured".into()))?
        .to_string();

    let client = GitHubClient::new(
        config.github.api_url.clone(),
        config.github.token.clone(),
        config.github.owner.clone(),
    );
    info!("Watching organization '{}'", client.owner());
    let allow_list = prepare_github(&config, &client).await?;
    if allow_list.is_empty() {
        warn!("No webhook source ranges configured; only localhost can deliver");
    } else {
        info!("Accepting deliveries from {} source ranges", allow_list.len());
    }
    let github: Arc<dyn GitHubService> = Arc::new(client);

    let notifier: Arc<dyn Notifier> = match config.teams_webhook_url() {
        Some(url) => Arc::new(TeamsNotifier::new(url)),
        None => {
            warn!("No Teams webhook configured; alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };
    info!("Delivering alerts through '{}'", notifier.name());

    let registry = Registry::new(Arc::clone(&github), config.github.owner.clone());
    let pipeline = Arc::new(Pipeline::new(
        registry,
        notifier,
        config.rules.generate_pull_requests,
    ));

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState {
        config,
        webhook_secret,
        allow_list,
        pipeline,
        github,
        start_time: Instant::now(),
        started_at: Utc::now(),
    });

    let app = build_router(state);

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("ALERT_HOOKS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let file_logger = config.server.log_dir.clone().map(FileLogger::new);
    // Dropping the guard flushes and stops the file writer
    let _guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, &config_path).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
