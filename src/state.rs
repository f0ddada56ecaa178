use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::oauth::GithubOAuthClient;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    /// None when no [github] config section is present.
    pub github: Option<GithubOAuthClient>,
}
