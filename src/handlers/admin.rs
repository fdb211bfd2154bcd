use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::require_admin,
    models::{Category, RoleRecord, RoleSummary, User, UserResponse},
    utils::hash_password,
};

async fn roles_for_user(db: &Database, user_id: Uuid) -> Result<Vec<RoleSummary>, sqlx::Error> {
    sqlx::query_as::<_, RoleSummary>(
        r#"
        SELECT r.name, r.description
        FROM roles r
        JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = $1
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

/// GET /api/admin/users - every account with its role set.
pub async fn list_users(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
        .fetch_all(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to list users: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let mut body = Vec::with_capacity(users.len());
    for user in users {
        let roles = roles_for_user(&db, user.id).await.map_err(|e| {
            log::error!("Failed to load roles for user: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        body.push(json!({
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "enabled": user.enabled,
            "managerId": user.manager_id,
            "roles": roles,
            "createdAt": user.created_at,
        }));
    }

    Ok(Json(json!({ "users": body })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Uuid,
}

/// POST /api/admin/users
pub async fn create_user(
    State(db): State<Database>,
    cookies: Cookies,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), StatusCode> {
    require_admin(&cookies, &db).await?;

    if body.name.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&body.email)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to check for existing user: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if existing.is_some() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let password_hash = hash_password(&body.password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, password_hash, enabled) VALUES ($1, $2, $3, true) RETURNING *",
    )
    .bind(body.name.trim())
    .bind(body.email.trim())
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to create user: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user.id)
        .bind(body.role_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to assign role: {e}");
            StatusCode::BAD_REQUEST
        })?;

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit user creation: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/admin/users/:id - one account with roles and direct reports.
pub async fn get_user(
    State(db): State<Database>,
    cookies: Cookies,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to fetch user: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let roles = roles_for_user(&db, user.id).await.map_err(|e| {
        log::error!("Failed to load roles: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let managed = sqlx::query_as::<_, User>("SELECT * FROM users WHERE manager_id = $1 ORDER BY name")
        .bind(user.id)
        .fetch_all(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to load managed users: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let managed: Vec<UserResponse> = managed.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "enabled": user.enabled,
        "managerId": user.manager_id,
        "roles": roles,
        "managedUsers": managed,
        "createdAt": user.created_at,
    })))
}

/// Distinguishes an absent field from an explicit `null`: absent keeps
/// the current value, `null` clears it.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,
    pub managed_user_ids: Option<Vec<Uuid>>,
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(db): State<Database>,
    cookies: Cookies,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let current = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to fetch user: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let password_hash = match &body.password {
        Some(p) if !p.is_empty() => Some(hash_password(p).map_err(|e| {
            log::error!("Failed to hash password: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?),
        _ => None,
    };

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = $1, email = $2,
            password_hash = COALESCE($3, password_hash),
            manager_id = $4,
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(body.name.as_deref().unwrap_or(&current.name))
    .bind(body.email.as_deref().unwrap_or(&current.email))
    .bind(password_hash.as_deref())
    .bind(body.manager_id.unwrap_or(current.manager_id))
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to update user: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if let Some(role_id) = body.role_id {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to clear roles: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to assign role: {e}");
                StatusCode::BAD_REQUEST
            })?;
    }

    if let Some(managed_ids) = &body.managed_user_ids {
        sqlx::query("UPDATE users SET manager_id = NULL WHERE manager_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to clear managed users: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        if !managed_ids.is_empty() {
            sqlx::query("UPDATE users SET manager_id = $1 WHERE id = ANY($2)")
                .bind(user_id)
                .bind(managed_ids)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    log::error!("Failed to assign managed users: {e}");
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;
        }
    }

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit user update: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(user.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRolesRequest {
    pub role_ids: Vec<Uuid>,
}

/// PUT /api/admin/users/:id/roles - replace the whole role set.
pub async fn set_user_roles(
    State(db): State<Database>,
    cookies: Cookies,
    Path(user_id): Path<Uuid>,
    Json(body): Json<SetRolesRequest>,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to fetch user: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if exists.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to clear roles: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    for role_id in &body.role_ids {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to assign role: {e}");
                StatusCode::BAD_REQUEST
            })?;
    }

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit role change: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let roles = roles_for_user(&db, user_id).await.map_err(|e| {
        log::error!("Failed to load roles: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(json!({ "roles": roles })))
}

/// PUT /api/admin/users/:id/toggle-enabled
pub async fn toggle_enabled(
    State(db): State<Database>,
    cookies: Cookies,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET enabled = NOT enabled, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to toggle user: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user.into()))
}

/// GET /api/admin/roles
pub async fn list_roles(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let roles = sqlx::query_as::<_, RoleRecord>(
        "SELECT id, name, description FROM roles ORDER BY name",
    )
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to list roles: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "roles": roles })))
}

async fn category_with_employees(
    db: &Database,
    category: Category,
) -> Result<Value, sqlx::Error> {
    let employees = sqlx::query_as::<_, (Uuid, String, String)>(
        r#"
        SELECT u.id, u.name, u.email
        FROM users u
        JOIN category_employees ce ON ce.user_id = u.id
        WHERE ce.category_id = $1
        ORDER BY u.name
        "#,
    )
    .bind(category.id)
    .fetch_all(db)
    .await?;

    let employees: Vec<Value> = employees
        .into_iter()
        .map(|(id, name, email)| json!({ "id": id, "name": name, "email": email }))
        .collect();

    Ok(json!({
        "id": category.id,
        "name": category.name,
        "description": category.description,
        "employees": employees,
    }))
}

/// GET /api/admin/categories
pub async fn list_categories(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description FROM categories ORDER BY name",
    )
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to list categories: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut body = Vec::with_capacity(categories.len());
    for category in categories {
        body.push(category_with_employees(&db, category).await.map_err(|e| {
            log::error!("Failed to load category employees: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?);
    }

    Ok(Json(json!({ "categories": body })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub employee_ids: Vec<Uuid>,
}

/// POST /api/admin/categories
pub async fn create_category(
    State(db): State<Database>,
    cookies: Cookies,
    Json(body): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    require_admin(&cookies, &db).await?;

    if body.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id, name, description",
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to create category: {e}");
        StatusCode::BAD_REQUEST
    })?;

    for user_id in &body.employee_ids {
        sqlx::query("INSERT INTO category_employees (category_id, user_id) VALUES ($1, $2)")
            .bind(category.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to assign employee to category: {e}");
                StatusCode::BAD_REQUEST
            })?;
    }

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit category creation: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let body = category_with_employees(&db, category).await.map_err(|e| {
        log::error!("Failed to load category employees: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/admin/categories/:id
pub async fn get_category(
    State(db): State<Database>,
    cookies: Cookies,
    Path(category_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let category = sqlx::query_as::<_, Category>(
        "SELECT id, name, description FROM categories WHERE id = $1",
    )
    .bind(category_id)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch category: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    let body = category_with_employees(&db, category).await.map_err(|e| {
        log::error!("Failed to load category employees: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(body))
}

/// PUT /api/admin/categories/:id - fields plus a full replacement of the
/// assigned employee set.
pub async fn update_category(
    State(db): State<Database>,
    cookies: Cookies,
    Path(category_id): Path<Uuid>,
    Json(body): Json<CategoryRequest>,
) -> Result<Json<Value>, StatusCode> {
    require_admin(&cookies, &db).await?;

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let category = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $1, description = $2 WHERE id = $3 RETURNING id, name, description",
    )
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(category_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to update category: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    sqlx::query("DELETE FROM category_employees WHERE category_id = $1")
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to clear category employees: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    for user_id in &body.employee_ids {
        sqlx::query("INSERT INTO category_employees (category_id, user_id) VALUES ($1, $2)")
            .bind(category_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                log::error!("Failed to assign employee to category: {e}");
                StatusCode::BAD_REQUEST
            })?;
    }

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit category update: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let body = category_with_employees(&db, category).await.map_err(|e| {
        log::error!("Failed to load category employees: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(body))
}

/// DELETE /api/admin/categories/:id
pub async fn delete_category(
    State(db): State<Database>,
    cookies: Cookies,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    require_admin(&cookies, &db).await?;

    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE category_id = $1")
        .bind(category_id)
        .fetch_one(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to check category usage: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if in_use > 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("DELETE FROM category_employees WHERE category_id = $1")
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to clear category employees: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let deleted = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to delete category: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if deleted.rows_affected() == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit category deletion: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_manager_id_keeps_current_value() {
        let body: UpdateUserRequest = serde_json::from_str(r#"{ "name": "Jane" }"#).unwrap();
        assert_eq!(body.manager_id, None);

        let current = Some(Uuid::new_v4());
        assert_eq!(body.manager_id.unwrap_or(current), current);
    }

    #[test]
    fn null_manager_id_clears_the_manager() {
        let body: UpdateUserRequest =
            serde_json::from_str(r#"{ "managerId": null }"#).unwrap();
        assert_eq!(body.manager_id, Some(None));

        let current = Some(Uuid::new_v4());
        assert_eq!(body.manager_id.unwrap_or(current), None);
    }

    #[test]
    fn explicit_manager_id_replaces_the_manager() {
        let id = Uuid::new_v4();
        let body: UpdateUserRequest =
            serde_json::from_str(&format!(r#"{{ "managerId": "{id}" }}"#)).unwrap();
        assert_eq!(body.manager_id, Some(Some(id)));
    }
}
