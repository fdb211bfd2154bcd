use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::{RoleSummary, User},
};

/// GET /api/manage/employees - the caller's direct reports with their
/// roles. Users who manage nobody get a 403, matching the page-level
/// gating.
pub async fn employees(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let reports = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE manager_id = $1 ORDER BY name",
    )
    .bind(user.id)
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch direct reports: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if reports.is_empty() {
        return Err(StatusCode::FORBIDDEN);
    }

    let mut employees = Vec::with_capacity(reports.len());
    for report in reports {
        let roles = sqlx::query_as::<_, RoleSummary>(
            r#"
            SELECT r.name, r.description
            FROM roles r
            JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(report.id)
        .fetch_all(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to load roles for report: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        employees.push(json!({
            "id": report.id,
            "name": report.name,
            "email": report.email,
            "enabled": report.enabled,
            "roles": roles,
        }));
    }

    Ok(Json(json!({ "employees": employees })))
}
