use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Comment, Post};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/{post_id}/comments", post(create_comment))
}

// -- Request/response types --

#[derive(Deserialize)]
pub struct PostInput {
    pub title: String,
    pub description: String,
}

#[derive(Deserialize)]
pub struct CommentInput {
    pub body: String,
}

#[derive(Serialize)]
pub struct PostList {
    pub posts: Vec<Post>,
}

// -- Query helpers --

/// A path id that doesn't parse as a UUID can't match anything, so it maps
/// straight to the not-found response instead of a store error.
fn parse_id(id: &str) -> AppResult<String> {
    Uuid::parse_str(id)
        .map(|u| u.to_string())
        .map_err(|_| AppError::NotFound)
}

fn comments_for_post(conn: &Connection, post_id: &str) -> Result<Vec<Comment>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.body, c.created_at FROM comments c \
         JOIN post_comments pc ON pc.comment_id = c.id \
         WHERE pc.post_id = ?1",
    )?;
    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                body: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

/// Load a post with its comments expanded (the read-time join).
fn load_post(conn: &Connection, post_id: &str) -> Result<Option<Post>, rusqlite::Error> {
    let row = conn
        .query_row(
            "SELECT id, title, description, created_at FROM posts WHERE id = ?1",
            params![post_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, title, description, created_at)) = row else {
        return Ok(None);
    };
    let comments = comments_for_post(conn, &id)?;
    Ok(Some(Post {
        id,
        title,
        description,
        comments,
        created_at,
    }))
}

// -- Post handlers --

/// GET /api/posts - every post, comments expanded to full bodies.
pub async fn list_posts(State(state): State<AppState>) -> AppResult<Json<PostList>> {
    let conn = state.db.get()?;
    let ids: Vec<String> = {
        let mut stmt = conn.prepare("SELECT id FROM posts ORDER BY created_at, id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(post) = load_post(&conn, &id)? {
            posts.push(post);
        }
    }

    Ok(Json(PostList { posts }))
}

/// POST /api/posts - persist a new post with an empty comment collection.
pub async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<PostInput>,
) -> AppResult<Json<Post>> {
    let id = Uuid::now_v7().to_string();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (id, title, description) VALUES (?1, ?2, ?3)",
        params![id, input.title, input.description],
    )?;

    let post = load_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// GET /api/posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let id = parse_id(&id)?;
    let conn = state.db.get()?;
    let post = load_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// PUT /api/posts/:id - overwrite title and description, nothing else.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<PostInput>,
) -> AppResult<Json<Post>> {
    let id = parse_id(&id)?;
    let conn = state.db.get()?;
    let updated = conn.execute(
        "UPDATE posts SET title = ?1, description = ?2 WHERE id = ?3",
        params![input.title, input.description, id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    let post = load_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

/// DELETE /api/posts/:id - remove the post and return it. Attachment rows
/// cascade away; the comment rows themselves are left behind.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let id = parse_id(&id)?;
    let conn = state.db.get()?;
    let post = load_post(&conn, &id)?.ok_or(AppError::NotFound)?;

    conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(Json(post))
}

// -- Comment handler --

/// POST /api/posts/:post_id/comments - persist the comment, then attach it
/// to the post with set semantics. The two writes are not transactional: a
/// missing post yields 404 with the comment row already persisted.
pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<CommentInput>,
) -> AppResult<Response> {
    let post_id = parse_id(&post_id)?;
    let id = Uuid::now_v7().to_string();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO comments (id, body) VALUES (?1, ?2)",
        params![id, input.body],
    )?;

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    conn.execute(
        "INSERT OR IGNORE INTO post_comments (post_id, comment_id) VALUES (?1, ?2)",
        params![post_id, id],
    )?;

    let comment = conn.query_row(
        "SELECT id, body, created_at FROM comments WHERE id = ?1",
        params![id],
        |row| {
            Ok(Comment {
                id: row.get(0)?,
                body: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )?;

    Ok((StatusCode::CREATED, Json(comment)).into_response())
}
