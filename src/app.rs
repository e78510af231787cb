//! Application setup and wiring

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use rocketship_core::Config;
use rocketship_core::domain::discovery::IReconciliationStore;
use rocketship_core::infrastructure::{
    GitHubAppClient, RepositoryContentClient, SqlxReconciliationStore, SuiteYamlParser,
};
use rocketship_scanner::application::{
    BootstrapRepositoryUseCase, GetInstallationStatusUseCase,
    ListInstallationRepositoriesUseCase, ListScanAttemptsUseCase, ProcessWebhookUseCase,
    RegisterInstallationUseCase, Scanner,
};
use rocketship_scanner::presentation::{AppState, GitHubAppUseCases, create_router};

pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
}

/// Wire use cases and HTTP state on top of a store.
///
/// GitHub App routes and webhook scanning are only enabled when App credentials are
/// configured; webhooks are still verified and audited without them.
pub fn build_state(
    config: &Config,
    store: Arc<dyn IReconciliationStore>,
) -> Result<AppState, AppError> {
    let github = &config.github_app;

    let github_app = if github.is_configured() {
        let client: Arc<dyn RepositoryContentClient> =
            Arc::new(GitHubAppClient::from_config(github)?);
        let scanner = Arc::new(Scanner::new(
            store.clone(),
            client.clone(),
            SuiteYamlParser::new(config.scanner.max_suite_file_bytes),
        ));
        tracing::info!(app_id = %github.app_id, "GitHub App configured");
        Some((client, scanner))
    } else {
        tracing::warn!(
            "GitHub App credentials not configured; webhooks will be audited but not scanned"
        );
        None
    };

    if github.webhook_secret().is_none() {
        tracing::warn!("GitHub webhook secret not configured; webhook deliveries will be rejected");
    }

    let process_webhook = Arc::new(ProcessWebhookUseCase::new(
        store.clone(),
        github_app.as_ref().map(|(_, scanner)| scanner.clone()),
    ));

    let github_app = github_app.map(|(client, scanner)| GitHubAppUseCases {
        status: Arc::new(GetInstallationStatusUseCase::new(
            store.clone(),
            github.install_url(),
        )),
        register: Arc::new(RegisterInstallationUseCase::new(
            store.clone(),
            client.clone(),
            github.install_url(),
        )),
        list_repositories: Arc::new(ListInstallationRepositoriesUseCase::new(
            store.clone(),
            client.clone(),
        )),
        bootstrap: Arc::new(BootstrapRepositoryUseCase::new(
            store.clone(),
            client,
            scanner,
        )),
    });

    Ok(AppState {
        webhook_secret: github.webhook_secret().map(Arc::from),
        process_webhook,
        github_app,
        list_scan_attempts: Arc::new(ListScanAttemptsUseCase::new(store)),
    })
}

/// Create the application router and return an AppHandle for shutdown coordination
pub async fn create_app(config: Config) -> Result<AppHandle, AppError> {
    let startup_time = Instant::now();

    let db_pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_idle.unwrap_or(0))
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
            .max_lifetime(config.database.max_lifetime_seconds.map(Duration::from_secs))
            .idle_timeout(config.database.idle_timeout_seconds.map(Duration::from_secs))
            .test_before_acquire(config.database.enable_health_checks)
            .connect(&config.database.url)
            .await?,
    );
    tracing::info!(
        max_connections = config.database.max_connections,
        "Database pool initialized"
    );

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(db_pool.as_ref()).await?;
        tracing::info!("Database migrations applied");
    }

    let store: Arc<dyn IReconciliationStore> = Arc::new(SqlxReconciliationStore::new(db_pool));
    let state = build_state(&config, store)?;
    let router = create_router(state, &config.server);

    tracing::info!(
        elapsed_ms = startup_time.elapsed().as_millis() as u64,
        "Application initialized"
    );

    Ok(AppHandle {
        router,
        shutdown_token: CancellationToken::new(),
    })
}
