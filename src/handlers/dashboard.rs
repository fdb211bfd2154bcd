use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::require_any_role,
    models::REPORTING_ROLES,
    stats::{percentage_of, resolve_period_window, DateWindow},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFilters {
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl PeriodFilters {
    fn window(&self) -> Option<DateWindow> {
        resolve_period_window(
            self.period.as_deref().unwrap_or("monthly"),
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            Utc::now(),
        )
    }
}

fn window_clause(window: Option<DateWindow>) -> String {
    match window {
        Some(_) => "AND e.created_at >= $1 AND e.created_at < $2".to_string(),
        None => String::new(),
    }
}

/// GET /api/dashboard/stats - headline counters for the accounting view.
pub async fn stats(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<PeriodFilters>,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let window = filters.window();
    let sql = format!(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE e.status = 'PENDING'),
               COUNT(*) FILTER (WHERE e.status = 'APPROVED'),
               COUNT(*) FILTER (WHERE e.status = 'REJECTED'),
               COALESCE(SUM(e.amount) FILTER (WHERE e.status = 'APPROVED'), 0)
        FROM expenses e
        WHERE TRUE {}
        "#,
        window_clause(window)
    );

    let mut query = sqlx::query_as::<_, (i64, i64, i64, i64, Decimal)>(&sql);
    if let Some(w) = window {
        query = query.bind(w.start).bind(w.end);
    }
    let (total, pending, approved, rejected, total_amount) =
        query.fetch_one(&db).await.map_err(|e| {
            log::error!("Failed to compute dashboard stats: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({
        "totalExpenses": total,
        "pendingExpenses": pending,
        "approvedExpenses": approved,
        "rejectedExpenses": rejected,
        "totalAmount": total_amount,
    })))
}

/// GET /api/dashboard/category-stats - per-category totals with their share
/// of the overall amount.
pub async fn category_stats(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<PeriodFilters>,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let window = filters.window();
    let sql = format!(
        r#"
        SELECT c.id, c.name, COALESCE(SUM(e.amount), 0), COUNT(e.id)
        FROM categories c
        LEFT JOIN expenses e ON e.category_id = c.id AND e.status = 'APPROVED' {}
        GROUP BY c.id, c.name
        ORDER BY 3 DESC
        "#,
        window_clause(window)
    );

    let mut query = sqlx::query_as::<_, (Uuid, String, Decimal, i64)>(&sql);
    if let Some(w) = window {
        query = query.bind(w.start).bind(w.end);
    }
    let rows = query.fetch_all(&db).await.map_err(|e| {
        log::error!("Failed to compute category stats: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let grand_total: Decimal = rows.iter().map(|(_, _, sum, _)| *sum).sum();
    let categories: Vec<Value> = rows
        .into_iter()
        .map(|(id, name, sum, count)| {
            json!({
                "categoryId": id,
                "categoryName": name,
                "totalAmount": sum,
                "expenseCount": count,
                "percentage": percentage_of(sum, grand_total),
            })
        })
        .collect();

    Ok(Json(json!({
        "categories": categories,
        "totalAmount": grand_total,
    })))
}

async fn per_user_rows(
    db: &Database,
    window: Option<DateWindow>,
    include_zero: bool,
) -> Result<Vec<Value>, sqlx::Error> {
    let join = if include_zero { "LEFT JOIN" } else { "JOIN" };
    let sql = format!(
        r#"
        SELECT u.id, u.name, u.email, COALESCE(SUM(e.amount), 0), COUNT(e.id)
        FROM users u
        {join} expenses e ON e.submitted_by_id = u.id AND e.status = 'APPROVED' {}
        GROUP BY u.id, u.name, u.email
        {}
        ORDER BY 4 DESC
        "#,
        window_clause(window),
        if include_zero { "" } else { "HAVING COUNT(e.id) > 0" },
    );

    let mut query = sqlx::query_as::<_, (Uuid, String, String, Decimal, i64)>(&sql);
    if let Some(w) = window {
        query = query.bind(w.start).bind(w.end);
    }
    let users = query.fetch_all(db).await?;

    let cat_sql = format!(
        r#"
        SELECT e.submitted_by_id, c.name, COALESCE(SUM(e.amount), 0), COUNT(e.id)
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        WHERE e.status = 'APPROVED' {}
        GROUP BY e.submitted_by_id, c.name
        "#,
        window_clause(window)
    );
    let mut cat_query = sqlx::query_as::<_, (Uuid, String, Decimal, i64)>(&cat_sql);
    if let Some(w) = window {
        cat_query = cat_query.bind(w.start).bind(w.end);
    }
    let cat_rows = cat_query.fetch_all(db).await?;

    let mut by_user: std::collections::HashMap<Uuid, Vec<Value>> = std::collections::HashMap::new();
    for (user_id, cat_name, sum, count) in cat_rows {
        by_user.entry(user_id).or_default().push(json!({
            "categoryName": cat_name,
            "totalAmount": sum,
            "expenseCount": count,
        }));
    }

    Ok(users
        .into_iter()
        .map(|(id, name, email, sum, count)| {
            let average = if count > 0 {
                sum / Decimal::from(count)
            } else {
                Decimal::ZERO
            };
            json!({
                "userId": id,
                "userName": name,
                "userEmail": email,
                "totalAmount": sum,
                "expenseCount": count,
                "averageAmount": average,
                "categories": by_user.remove(&id).unwrap_or_default(),
            })
        })
        .collect())
}

/// GET /api/dashboard/user-stats - spend per submitting user, with a
/// category breakdown nested under each.
pub async fn user_stats(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<PeriodFilters>,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let users = per_user_rows(&db, filters.window(), false)
        .await
        .map_err(|e| {
            log::error!("Failed to compute user stats: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({ "users": users })))
}

/// GET /api/dashboard/individual-stats - same shape as user-stats but
/// includes users with no expenses in the window.
pub async fn individual_stats(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<PeriodFilters>,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let users = per_user_rows(&db, filters.window(), true)
        .await
        .map_err(|e| {
            log::error!("Failed to compute individual stats: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({ "users": users })))
}

type ExportRow = (String, String, String, String, Decimal, String);

pub fn render_dashboard_csv(rows: &[ExportRow]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Title", "Category", "User", "Amount", "Currency"])?;

    let mut by_category: std::collections::BTreeMap<String, (Decimal, i64)> =
        std::collections::BTreeMap::new();
    for (date, title, category, user, amount, currency) in rows {
        writer.write_record([
            date.as_str(),
            title.as_str(),
            category.as_str(),
            user.as_str(),
            &format!("{amount:.2}"),
            currency.as_str(),
        ])?;
        let entry = by_category.entry(category.clone()).or_default();
        entry.0 += *amount;
        entry.1 += 1;
    }

    writer.write_record([""; 6])?;
    writer.write_record(["Category", "Total Amount", "Count", "", "", ""])?;
    for (category, (total, count)) in by_category {
        writer.write_record([
            category.as_str(),
            &format!("{total:.2}"),
            &count.to_string(),
            "",
            "",
            "",
        ])?;
    }

    let bytes = writer.into_inner().unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// GET /api/dashboard/export - CSV download of the window's expenses plus a
/// per-category summary.
pub async fn export(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<PeriodFilters>,
) -> Result<Response, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let window = filters.window();
    let sql = format!(
        r#"
        SELECT e.created_at::date::text, e.title, c.name, u.name, e.amount, e.currency
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        JOIN users u ON e.submitted_by_id = u.id
        WHERE e.status = 'APPROVED' {}
        ORDER BY e.created_at DESC
        "#,
        window_clause(window)
    );

    let mut query = sqlx::query_as::<_, ExportRow>(&sql);
    if let Some(w) = window {
        query = query.bind(w.start).bind(w.end);
    }
    let rows = query.fetch_all(&db).await.map_err(|e| {
        log::error!("Failed to fetch export rows: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let csv = render_dashboard_csv(&rows).map_err(|e| {
        log::error!("Failed to render dashboard CSV: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let filename = format!("dashboard-{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &str, amount: &str) -> ExportRow {
        (
            "2025-04-01".to_string(),
            "Invoice X".to_string(),
            category.to_string(),
            "Jane".to_string(),
            amount.parse().unwrap(),
            "EUR".to_string(),
        )
    }

    #[test]
    fn dashboard_csv_appends_category_summary() {
        let rows = vec![row("Travel", "100"), row("Travel", "50"), row("Office", "25")];
        let csv = render_dashboard_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Date,Title,Category,User,Amount,Currency");
        assert_eq!(lines.len(), 1 + 3 + 1 + 1 + 2);
        assert_eq!(lines[5], "Category,Total Amount,Count,,,");
        assert!(lines.contains(&"Travel,150.00,2,,,"));
        assert!(lines.contains(&"Office,25.00,1,,,"));
    }

    #[test]
    fn empty_export_still_has_headers() {
        let csv = render_dashboard_csv(&[]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Title,Category,User,Amount,Currency");
        assert_eq!(lines[2], "Category,Total Amount,Count,,,");
    }
}
