use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{database::Database, middleware::get_current_user, models::Todo};

/// GET /api/todos - the caller's items, newest first.
pub async fn list(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let todos = sqlx::query_as::<_, Todo>(
        "SELECT * FROM todos WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch todos: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "todos": todos })))
}

#[derive(Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    pub description: Option<String>,
}

/// POST /api/todos
pub async fn create(
    State(db): State<Database>,
    cookies: Cookies,
    Json(body): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<Todo>), StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if body.title.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let todo = sqlx::query_as::<_, Todo>(
        "INSERT INTO todos (title, description, completed, user_id) VALUES ($1, $2, false, $3) RETURNING *",
    )
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(user.id)
    .fetch_one(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to create todo: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::CREATED, Json(todo)))
}

#[derive(Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// PUT /api/todos/:id - owner-scoped partial update.
pub async fn update(
    State(db): State<Database>,
    cookies: Cookies,
    Path(todo_id): Path<Uuid>,
    Json(body): Json<UpdateTodoRequest>,
) -> Result<Json<Todo>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let todo = sqlx::query_as::<_, Todo>(
        r#"
        UPDATE todos
        SET title = COALESCE($1, title),
            description = COALESCE($2, description),
            completed = COALESCE($3, completed)
        WHERE id = $4 AND user_id = $5
        RETURNING *
        "#,
    )
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.completed)
    .bind(todo_id)
    .bind(user.id)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to update todo: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(todo))
}

/// DELETE /api/todos/:id
pub async fn delete(
    State(db): State<Database>,
    cookies: Cookies,
    Path(todo_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let deleted = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
        .bind(todo_id)
        .bind(user.id)
        .execute(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to delete todo: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if deleted.rows_affected() == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(json!({ "message": "Todo deleted" })))
}
