pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder().max_size(8).build(manager)?;

    // Configure SQLite for performance
    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .unwrap();
        pool
    }

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        // Verify we can get a connection
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_run_successfully() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();

        // Verify key tables exist
        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"posts".to_string()));
        assert!(tables.contains(&"comments".to_string()));
        assert!(tables.contains(&"post_comments".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        run_migrations(&pool).unwrap(); // Should not error on second run

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn usernames_are_unique() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username) VALUES ('u1', 'alice')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, username) VALUES ('u2', 'alice')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn oauth_ids_are_unique_when_present() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, oauth_id) VALUES ('u1', 'alice', '42')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, username, oauth_id) VALUES ('u2', 'bob', '42')",
            [],
        );
        assert!(result.is_err());

        // NULL oauth_ids don't collide with each other
        conn.execute(
            "INSERT INTO users (id, username) VALUES ('u3', 'carol')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO users (id, username) VALUES ('u4', 'dave')", [])
            .unwrap();
    }

    #[test]
    fn attach_is_set_semantics() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO posts (id, title, description) VALUES ('p1', 't', 'd')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO comments (id, body) VALUES ('c1', 'hi')", [])
            .unwrap();

        // Attaching the same comment twice leaves a single row
        for _ in 0..2 {
            conn.execute(
                "INSERT OR IGNORE INTO post_comments (post_id, comment_id) VALUES ('p1', 'c1')",
                [],
            )
            .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM post_comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn attach_allows_same_comment_on_two_posts() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO posts (id, title, description) VALUES ('p1', 't', 'd')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (id, title, description) VALUES ('p2', 't', 'd')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO comments (id, body) VALUES ('c1', 'hi')", [])
            .unwrap();

        conn.execute(
            "INSERT OR IGNORE INTO post_comments (post_id, comment_id) VALUES ('p1', 'c1')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO post_comments (post_id, comment_id) VALUES ('p2', 'c1')",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM post_comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn deleting_post_keeps_comment_rows() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO posts (id, title, description) VALUES ('p1', 't', 'd')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO comments (id, body) VALUES ('c1', 'hi')", [])
            .unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO post_comments (post_id, comment_id) VALUES ('p1', 'c1')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM posts WHERE id = 'p1'", []).unwrap();

        // Attachment cascades away, the comment row is orphaned but kept
        let attachments: i64 = conn
            .query_row("SELECT COUNT(*) FROM post_comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(attachments, 0);
        let comments: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(comments, 1);
    }
}
