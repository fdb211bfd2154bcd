use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{database::Database, middleware::get_current_user};

const SEARCH_LIMIT: i64 = 10;

#[derive(Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
    pub query: Option<String>,
}

async fn search_by_name(db: &Database, term: &str) -> Result<Vec<Value>, sqlx::Error> {
    let pattern = format!("%{}%", term.trim());
    let rows = sqlx::query_as::<_, (Uuid, String, String)>(
        "SELECT id, name, email FROM users WHERE enabled = true AND name ILIKE $1 ORDER BY name LIMIT $2",
    )
    .bind(pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, email)| json!({ "id": id, "name": name, "email": email }))
        .collect())
}

/// GET /api/users?search= - name lookup for assignment pickers.
pub async fn list(
    State(db): State<Database>,
    cookies: Cookies,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, StatusCode> {
    get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let term = params.search.unwrap_or_default();
    let users = search_by_name(&db, &term).await.map_err(|e| {
        log::error!("Failed to search users: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "users": users })))
}

/// GET /api/users/search?query= - same lookup under the older route shape.
pub async fn search(
    State(db): State<Database>,
    cookies: Cookies,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, StatusCode> {
    get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let term = params.query.unwrap_or_default();
    let users = search_by_name(&db, &term).await.map_err(|e| {
        log::error!("Failed to search users: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "users": users })))
}
