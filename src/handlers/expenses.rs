use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::{get_current_user, require_any_role, CurrentUser},
    models::{
        Attachment, AttachmentSummary, Category, Expense, ExpenseRow, REPORTING_ROLES,
        REVIEWER_ROLES, STATUS_APPROVED, STATUS_PENDING, STATUS_REJECTED,
    },
    stats::{month_window, previous_month, resolve_report_window},
};

pub fn upload_root() -> PathBuf {
    PathBuf::from(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/uploads".to_string()))
}

async fn attachments_for(
    db: &Database,
    expense_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<AttachmentSummary>>, sqlx::Error> {
    if expense_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, AttachmentSummary>(
        "SELECT id, expense_id, filename, url FROM attachments WHERE expense_id = ANY($1)",
    )
    .bind(expense_ids)
    .fetch_all(db)
    .await?;

    let mut map: HashMap<Uuid, Vec<AttachmentSummary>> = HashMap::new();
    for row in rows {
        map.entry(row.expense_id).or_default().push(row);
    }
    Ok(map)
}

fn expense_json(expense: ExpenseRow, attachments: Vec<AttachmentSummary>) -> Value {
    json!({
        "id": expense.id,
        "title": expense.title,
        "description": expense.description,
        "amount": expense.amount,
        "currency": expense.currency,
        "status": expense.status,
        "billingType": expense.billing_type,
        "submittedById": expense.submitted_by_id,
        "categoryId": expense.category_id,
        "category": { "id": expense.category_id, "name": expense.category_name },
        "attachments": attachments,
        "createdAt": expense.created_at,
        "submittedAt": expense.created_at,
    })
}

/// GET /api/expenses - the caller's own expenses, newest first.
pub async fn list_own(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expenses = sqlx::query_as::<_, ExpenseRow>(
        r#"
        SELECT e.id, e.title, e.description, e.amount, e.currency, e.status,
               e.billing_type, e.submitted_by_id, e.category_id,
               c.name AS category_name, e.created_at
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        WHERE e.submitted_by_id = $1
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch expenses: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let ids: Vec<Uuid> = expenses.iter().map(|e| e.id).collect();
    let mut attachments = attachments_for(&db, &ids).await.map_err(|e| {
        log::error!("Failed to fetch attachments: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let expenses: Vec<Value> = expenses
        .into_iter()
        .map(|e| {
            let atts = attachments.remove(&e.id).unwrap_or_default();
            expense_json(e, atts)
        })
        .collect();

    Ok(Json(json!({ "expenses": expenses })))
}

/// GET /api/expenses/pending - every PENDING expense, for reviewers.
pub async fn list_pending(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REVIEWER_ROLES).await?;

    let expenses = sqlx::query_as::<_, ExpenseRow>(
        r#"
        SELECT e.id, e.title, e.description, e.amount, e.currency, e.status,
               e.billing_type, e.submitted_by_id, e.category_id,
               c.name AS category_name, e.created_at
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        WHERE e.status = 'PENDING'
        ORDER BY e.created_at DESC
        "#,
    )
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch pending expenses: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let submitter_ids: Vec<Uuid> = expenses.iter().map(|e| e.submitted_by_id).collect();
    let submitters: HashMap<Uuid, String> = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM users WHERE id = ANY($1)",
    )
    .bind(&submitter_ids)
    .fetch_all(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch submitters: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .into_iter()
    .collect();

    let ids: Vec<Uuid> = expenses.iter().map(|e| e.id).collect();
    let mut attachments = attachments_for(&db, &ids).await.map_err(|e| {
        log::error!("Failed to fetch attachments: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let body: Vec<Value> = expenses
        .into_iter()
        .map(|e| {
            let submitter = submitters.get(&e.submitted_by_id).cloned();
            let submitted_by_id = e.submitted_by_id;
            let atts = attachments.remove(&e.id).unwrap_or_default();
            let mut value = expense_json(e, atts);
            if let Some(obj) = value.as_object_mut() {
                obj.insert(
                    "submittedBy".to_string(),
                    json!({ "id": submitted_by_id, "name": submitter }),
                );
            }
            value
        })
        .collect();

    Ok(Json(json!(body)))
}

// Only a PENDING row moves; APPROVED/REJECTED are terminal. The status
// gate in the WHERE clause makes the transition one-way even under
// concurrent reviewers.
const TRANSITION_SQL: &str =
    "UPDATE expenses SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3 RETURNING *";

async fn transition(
    db: &Database,
    expense_id: Uuid,
    new_status: &str,
) -> Result<Json<Expense>, StatusCode> {
    let updated = sqlx::query_as::<_, Expense>(TRANSITION_SQL)
        .bind(new_status)
        .bind(expense_id)
        .bind(STATUS_PENDING)
        .fetch_optional(db)
        .await
        .map_err(|e| {
            log::error!("Failed to update expense status: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if let Some(expense) = updated {
        return Ok(Json(expense));
    }

    // Already terminal: report the current state unchanged.
    sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1")
        .bind(expense_id)
        .fetch_optional(db)
        .await
        .map_err(|e| {
            log::error!("Failed to fetch expense: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/expenses/:id/approve
pub async fn approve(
    State(db): State<Database>,
    cookies: Cookies,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Expense>, StatusCode> {
    require_any_role(&cookies, &db, &REVIEWER_ROLES).await?;
    transition(&db, expense_id, STATUS_APPROVED).await
}

/// POST /api/expenses/:id/reject
pub async fn reject(
    State(db): State<Database>,
    cookies: Cookies,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Expense>, StatusCode> {
    require_any_role(&cookies, &db, &REVIEWER_ROLES).await?;
    transition(&db, expense_id, STATUS_REJECTED).await
}

/// DELETE /api/expenses/:id - only the submitter's own PENDING expense.
pub async fn delete(
    State(db): State<Database>,
    cookies: Cookies,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expense = sqlx::query_as::<_, Expense>(
        "SELECT * FROM expenses WHERE id = $1 AND submitted_by_id = $2 AND status = 'PENDING'",
    )
    .bind(expense_id)
    .bind(user.id)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch expense for deletion: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    let urls: Vec<String> =
        sqlx::query_scalar("SELECT url FROM attachments WHERE expense_id = $1")
            .bind(expense.id)
            .fetch_all(&db)
            .await
            .map_err(|e| {
                log::error!("Failed to list attachments: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("DELETE FROM attachments WHERE expense_id = $1")
        .bind(expense.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to delete attachments: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(expense.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to delete expense: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit expense deletion: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Backing files go best-effort after the rows are gone.
    let root = upload_root();
    for url in urls {
        let path = root.join(&url);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to delete attachment file {}: {e}", path.display());
        }
    }

    Ok(Json(json!({ "message": "Expense deleted successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitField {
    pub value: String,
    #[allow(dead_code)]
    pub confidentiality: f64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitInvoiceData {
    pub invoice_id: SubmitField,
    pub company_name: SubmitField,
    pub total_amount: SubmitField,
    pub total_amount_curr: SubmitField,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub invoice_data: SubmitInvoiceData,
    pub file_url: String,
}

#[derive(Debug, PartialEq)]
struct ParsedSubmission {
    title: String,
    description: String,
    amount: Decimal,
    currency: String,
    filename: String,
    url: String,
}

fn parse_submission(body: &SubmitRequest) -> Result<ParsedSubmission, String> {
    let url_ok = body.file_url.starts_with('/')
        || body.file_url.starts_with("http://")
        || body.file_url.starts_with("https://");
    if !url_ok {
        return Err("File URL must be a relative path starting with / or an absolute URL".into());
    }

    let amount: Decimal = body
        .invoice_data
        .total_amount
        .value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid total amount: {}", body.invoice_data.total_amount.value))?;

    let url = body
        .file_url
        .strip_prefix('/')
        .unwrap_or(&body.file_url)
        .to_string();
    let filename = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("invoice")
        .to_string();

    Ok(ParsedSubmission {
        title: format!("Invoice {}", body.invoice_data.invoice_id.value),
        description: format!("Invoice from {}", body.invoice_data.company_name.value),
        amount,
        currency: body.invoice_data.total_amount_curr.value.clone(),
        filename,
        url,
    })
}

/// POST /api/expenses/submit - create an expense from extracted invoice
/// fields plus the already-uploaded file.
pub async fn submit(
    State(db): State<Database>,
    cookies: Cookies,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let parsed = parse_submission(&body).map_err(|e| {
        log::warn!("Invalid invoice submission: {e}");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    // Extracted invoices land in the default category.
    let category = sqlx::query_as::<_, Category>(
        "SELECT id, name, description FROM categories WHERE name = 'Other'",
    )
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to fetch default category: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let expense = sqlx::query_as::<_, Expense>(
        r#"
        INSERT INTO expenses (title, description, amount, currency, status, billing_type, submitted_by_id, category_id)
        VALUES ($1, $2, $3, $4, 'PENDING', 'INTERNAL', $5, $6)
        RETURNING *
        "#,
    )
    .bind(&parsed.title)
    .bind(&parsed.description)
    .bind(parsed.amount)
    .bind(&parsed.currency)
    .bind(user.id)
    .bind(category.id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to create expense: {e}");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let attachment = sqlx::query_as::<_, Attachment>(
        "INSERT INTO attachments (filename, url, file_size, file_type, expense_id) VALUES ($1, $2, 0, 'application/pdf', $3) RETURNING *",
    )
    .bind(&parsed.filename)
    .bind(&parsed.url)
    .bind(expense.id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        log::error!("Failed to create attachment: {e}");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit invoice submission: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({
        "message": "Invoice submitted successfully",
        "expense": expense,
        "attachment": attachment,
    })))
}

/// GET /api/expenses/stats/monthly - approved totals for the current and
/// previous calendar month.
pub async fn monthly_stats(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let now = Utc::now();
    let current = month_window(now.year(), now.month()).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let (prev_year, prev_month) = previous_month(now.year(), now.month());
    let previous = month_window(prev_year, prev_month).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let sum_for = |start, end| {
        sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT SUM(amount) FROM expenses WHERE status = 'APPROVED' AND created_at >= $1 AND created_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&db)
    };

    let current_total = sum_for(current.start, current.end)
        .await
        .map_err(|e| {
            log::error!("Failed to sum current month: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .unwrap_or(Decimal::ZERO);
    let last_total = sum_for(previous.start, previous.end)
        .await
        .map_err(|e| {
            log::error!("Failed to sum previous month: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .unwrap_or(Decimal::ZERO);

    Ok(Json(json!({
        "currentMonth": current_total,
        "lastMonth": last_total,
        "difference": current_total - last_total,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub user_id: Option<Uuid>,
    pub period: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub category_id: Option<Uuid>,
    pub status: Option<String>,
}

struct ReportQuery {
    sql_where: String,
    user_id: Option<Uuid>,
    category_id: Option<Uuid>,
    status: Option<String>,
}

fn build_report_filter(filters: &ReportFilters) -> ReportQuery {
    let mut conditions = vec![
        "e.created_at >= $1".to_string(),
        "e.created_at < $2".to_string(),
    ];
    let mut bind_count = 2;

    if filters.user_id.is_some() {
        bind_count += 1;
        conditions.push(format!("e.submitted_by_id = ${bind_count}"));
    }
    if filters.category_id.is_some() {
        bind_count += 1;
        conditions.push(format!("e.category_id = ${bind_count}"));
    }
    if filters.status.is_some() {
        bind_count += 1;
        conditions.push(format!("e.status = ${bind_count}"));
    }

    ReportQuery {
        sql_where: format!("WHERE {}", conditions.join(" AND ")),
        user_id: filters.user_id,
        category_id: filters.category_id,
        status: filters.status.clone(),
    }
}

/// GET /api/expenses/reports - paginated review listing for accounting.
pub async fn reports(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<ReportFilters>,
) -> Result<Json<Value>, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let now = Utc::now();
    let window = resolve_report_window(
        filters.period.as_deref().unwrap_or("month"),
        filters.month.unwrap_or(now.month()),
        filters.year.unwrap_or(now.year()),
        now,
    );

    let page = filters.page.unwrap_or(1).max(1);
    let per_page = filters.per_page.unwrap_or(10).clamp(1, 100);
    let query = build_report_filter(&filters);

    let count_sql = format!("SELECT COUNT(*) FROM expenses e {}", query.sql_where);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind(window.start)
        .bind(window.end);
    if let Some(id) = query.user_id {
        count_query = count_query.bind(id);
    }
    if let Some(id) = query.category_id {
        count_query = count_query.bind(id);
    }
    if let Some(status) = &query.status {
        count_query = count_query.bind(status);
    }
    let total = count_query.fetch_one(&db).await.map_err(|e| {
        log::error!("Failed to count report rows: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let rows_sql = format!(
        r#"
        SELECT e.id, e.title, e.description, e.amount, e.currency, e.status,
               e.billing_type, e.submitted_by_id, e.category_id,
               c.name AS category_name, e.created_at
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        {}
        ORDER BY e.created_at DESC
        LIMIT {} OFFSET {}
        "#,
        query.sql_where,
        per_page,
        (page - 1) * per_page
    );
    let mut rows_query = sqlx::query_as::<_, ExpenseRow>(&rows_sql)
        .bind(window.start)
        .bind(window.end);
    if let Some(id) = query.user_id {
        rows_query = rows_query.bind(id);
    }
    if let Some(id) = query.category_id {
        rows_query = rows_query.bind(id);
    }
    if let Some(status) = &query.status {
        rows_query = rows_query.bind(status);
    }
    let expenses = rows_query.fetch_all(&db).await.map_err(|e| {
        log::error!("Failed to fetch report rows: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(Json(json!({
        "expenses": expenses,
        "total": total,
        "page": page,
        "perPage": per_page,
        "totalPages": total_pages,
    })))
}

pub fn render_expense_csv(rows: &[(String, String, String, String, Decimal, String)]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "User", "Title", "Category", "Amount", "Status"])?;
    for (date, user, title, category, amount, status) in rows {
        writer.write_record([
            date.as_str(),
            user.as_str(),
            title.as_str(),
            category.as_str(),
            &format!("{amount:.2}"),
            status.as_str(),
        ])?;
    }
    let bytes = writer.into_inner().unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// GET /api/expenses/export - the report rows as a CSV download.
pub async fn export(
    State(db): State<Database>,
    cookies: Cookies,
    Query(filters): Query<ReportFilters>,
) -> Result<Response, StatusCode> {
    require_any_role(&cookies, &db, &REPORTING_ROLES).await?;

    let now = Utc::now();
    let window = resolve_report_window(
        filters.period.as_deref().unwrap_or("month"),
        filters.month.unwrap_or(now.month()),
        filters.year.unwrap_or(now.year()),
        now,
    );
    let query = build_report_filter(&filters);

    let rows_sql = format!(
        r#"
        SELECT e.created_at::date::text, u.name, e.title, c.name, e.amount, e.status
        FROM expenses e
        JOIN categories c ON e.category_id = c.id
        JOIN users u ON e.submitted_by_id = u.id
        {}
        ORDER BY e.created_at DESC
        "#,
        query.sql_where
    );
    let mut rows_query =
        sqlx::query_as::<_, (String, String, String, String, Decimal, String)>(&rows_sql)
            .bind(window.start)
            .bind(window.end);
    if let Some(id) = query.user_id {
        rows_query = rows_query.bind(id);
    }
    if let Some(id) = query.category_id {
        rows_query = rows_query.bind(id);
    }
    if let Some(status) = &query.status {
        rows_query = rows_query.bind(status);
    }
    let rows = rows_query.fetch_all(&db).await.map_err(|e| {
        log::error!("Failed to fetch export rows: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let csv = render_expense_csv(&rows).map_err(|e| {
        log::error!("Failed to render CSV: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let filename = format!("expenses-{}.csv", now.to_rfc3339());
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

fn current_user_json(user: &CurrentUser) -> Value {
    json!({ "id": user.id, "name": user.name, "email": user.email })
}

/// GET /api/me - identity echo used by the navbar.
pub async fn me(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(current_user_json(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: &str) -> SubmitField {
        SubmitField {
            value: value.to_string(),
            confidentiality: 0.2,
        }
    }

    fn request(amount: &str, currency: &str, file_url: &str) -> SubmitRequest {
        SubmitRequest {
            invoice_data: SubmitInvoiceData {
                invoice_id: field("INV-42"),
                company_name: field("Acme GmbH"),
                total_amount: field(amount),
                total_amount_curr: field(currency),
            },
            file_url: file_url.to_string(),
        }
    }

    #[test]
    fn submission_maps_invoice_fields_onto_expense() {
        let parsed =
            parse_submission(&request("850.00", "EUR", "/user@example.com/invoice.pdf")).unwrap();
        assert_eq!(parsed.amount, "850.00".parse::<Decimal>().unwrap());
        assert_eq!(parsed.currency, "EUR");
        assert_eq!(parsed.title, "Invoice INV-42");
        assert_eq!(parsed.description, "Invoice from Acme GmbH");
        assert_eq!(parsed.url, "user@example.com/invoice.pdf");
        assert_eq!(parsed.filename, "invoice.pdf");
    }

    #[test]
    fn submission_accepts_absolute_urls() {
        let parsed = parse_submission(&request("10", "USD", "https://cdn.example.com/x.pdf")).unwrap();
        assert_eq!(parsed.url, "https://cdn.example.com/x.pdf");
        assert_eq!(parsed.filename, "x.pdf");
    }

    #[test]
    fn submission_rejects_bad_url_and_amount() {
        assert!(parse_submission(&request("850.00", "EUR", "not-a-url")).is_err());
        assert!(parse_submission(&request("eight fifty", "EUR", "/a/b.pdf")).is_err());
    }

    #[test]
    fn report_filter_binds_in_declaration_order() {
        let filters = ReportFilters {
            page: None,
            per_page: None,
            user_id: Some(Uuid::new_v4()),
            period: None,
            month: None,
            year: None,
            category_id: None,
            status: Some("APPROVED".to_string()),
        };
        let q = build_report_filter(&filters);
        assert_eq!(
            q.sql_where,
            "WHERE e.created_at >= $1 AND e.created_at < $2 AND e.submitted_by_id = $3 AND e.status = $4"
        );
    }

    #[test]
    fn status_transition_only_moves_pending_rows() {
        // The WHERE clause must gate on the current status so a row that
        // is already APPROVED or REJECTED never transitions again.
        assert!(TRANSITION_SQL.contains("WHERE id = $2 AND status = $3"));
        assert!(TRANSITION_SQL.starts_with("UPDATE expenses SET status = $1"));
        assert!(TRANSITION_SQL.ends_with("RETURNING *"));
    }

    #[test]
    fn csv_has_header_and_formatted_amounts() {
        let rows = vec![(
            "2025-03-02".to_string(),
            "Jane Doe".to_string(),
            "Invoice INV-42".to_string(),
            "Travel".to_string(),
            "850".parse::<Decimal>().unwrap(),
            "APPROVED".to_string(),
        )];
        let csv = render_expense_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "Date,User,Title,Category,Amount,Status");
        assert_eq!(
            lines.next().unwrap(),
            "2025-03-02,Jane Doe,Invoice INV-42,Travel,850.00,APPROVED"
        );
    }
}
