use clap::Parser;
use tracing_subscriber::EnvFilter;

use microblog::auth::oauth::GithubOAuthClient;
use microblog::config::{Cli, Config};
use microblog::state::AppState;
use microblog::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // GitHub OAuth is optional; without a [github] config section the
    // /auth/github routes just bounce back to /login.
    let github = config.github.clone().map(GithubOAuthClient::new);
    if github.is_none() {
        tracing::info!("GitHub OAuth not configured, external login disabled");
    }

    let state = AppState {
        db: pool,
        config: config.clone(),
        github,
    };

    let app = routes::router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
