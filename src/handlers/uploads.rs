use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Component, Path as FsPath, PathBuf};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    handlers::expenses::upload_root,
    middleware::get_current_user,
    models::{is_expired, UploadToken},
    services::extract_invoice_from_image,
    utils::generate_token,
};

const UPLOAD_TOKEN_TTL_MINUTES: i64 = 15;

/// Strip anything that could escape the caller's upload directory.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// A served path must stay inside the upload root and start with the
/// caller's own directory.
pub fn resolve_served_path(root: &FsPath, owner_email: &str, requested: &str) -> Option<PathBuf> {
    let rel = FsPath::new(requested);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let first = rel.components().next()?;
    let Component::Normal(first) = first else {
        return None;
    };
    if !first.to_str()?.starts_with(owner_email) {
        return None;
    }

    Some(root.join(rel))
}

pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// POST /api/expenses/upload - store receipt files under the caller's
/// directory and run invoice extraction on each.
pub async fn upload(
    State(db): State<Database>,
    cookies: Cookies,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_dir = upload_root().join(&user.email);
    tokio::fs::create_dir_all(&user_dir).await.map_err(|e| {
        log::error!("Failed to create upload directory: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        log::warn!("Malformed multipart body: {e}");
        StatusCode::BAD_REQUEST
    })? {
        if field.name() != Some("files") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(ToString::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let content_type = field
            .content_type()
            .map(ToString::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field.bytes().await.map_err(|e| {
            log::warn!("Failed to read upload body: {e}");
            StatusCode::BAD_REQUEST
        })?;

        let filename = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_filename(&original_name)
        );
        let path = user_dir.join(&filename);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            log::error!("Failed to write upload {}: {e}", path.display());
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        // Extraction failures must not fail the upload.
        let extracted = match extract_invoice_from_image(&path).await {
            Ok(invoice) => serde_json::to_value(invoice).ok(),
            Err(e) => {
                log::warn!("Invoice extraction failed for {filename}: {e}");
                None
            }
        };

        files.push(json!({
            "filename": filename,
            "originalName": original_name,
            "size": data.len(),
            "type": content_type,
            "uploadedAt": Utc::now(),
            "extracted": extracted,
            "url": format!("{}/{}", user.email, filename),
        }));
    }

    Ok(Json(json!({ "files": files })))
}

/// POST /api/expenses/upload-token - short-lived token for the QR mobile
/// upload flow.
pub async fn create_upload_token(
    State(db): State<Database>,
    cookies: Cookies,
) -> Result<Json<Value>, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = generate_token();
    let expires_at = Utc::now() + Duration::minutes(UPLOAD_TOKEN_TTL_MINUTES);

    sqlx::query("INSERT INTO upload_tokens (email, token, expires_at) VALUES ($1, $2, $3)")
        .bind(&user.email)
        .bind(&token)
        .bind(expires_at)
        .execute(&db)
        .await
        .map_err(|e| {
            log::error!("Failed to store upload token: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(json!({ "token": token, "expiresAt": expires_at })))
}

#[derive(Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// POST /api/expenses/verify-token - resolve a QR token to its owner.
pub async fn verify_upload_token(
    State(db): State<Database>,
    Json(body): Json<VerifyTokenRequest>,
) -> Result<Json<Value>, StatusCode> {
    let record = sqlx::query_as::<_, UploadToken>(
        "SELECT id, email, token, expires_at FROM upload_tokens WHERE token = $1",
    )
    .bind(&body.token)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Failed to look up upload token: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    if is_expired(record.expires_at, Utc::now()) {
        sqlx::query("DELETE FROM upload_tokens WHERE id = $1")
            .bind(record.id)
            .execute(&db)
            .await
            .map_err(|e| {
                log::error!("Failed to delete expired upload token: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Json(json!({ "email": record.email })))
}

/// GET /api/uploads/*path - serve a stored file back to its owner.
pub async fn serve_upload(
    State(db): State<Database>,
    cookies: Cookies,
    Path(path): Path<String>,
) -> Result<Response, StatusCode> {
    let user = get_current_user(&cookies, &db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let full_path =
        resolve_served_path(&upload_root(), &user.email, &path).ok_or(StatusCode::FORBIDDEN)?;

    let bytes = match tokio::fs::read(&full_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StatusCode::NOT_FOUND);
        }
        Err(e) => {
            log::error!("Failed to read upload {}: {e}", full_path.display());
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Ok((
        [(header::CONTENT_TYPE, content_type_for(&path))],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("invoice.pdf"), "invoice.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a b?.png"), "a_b_.png");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn served_paths_stay_under_the_owner_directory() {
        let root = FsPath::new("/srv/uploads");
        let ok = resolve_served_path(root, "a@b.com", "a@b.com/1-invoice.pdf").unwrap();
        assert_eq!(ok, PathBuf::from("/srv/uploads/a@b.com/1-invoice.pdf"));

        assert!(resolve_served_path(root, "a@b.com", "other@b.com/x.pdf").is_none());
        assert!(resolve_served_path(root, "a@b.com", "../secrets.txt").is_none());
        assert!(resolve_served_path(root, "a@b.com", "a@b.com/../other/x.pdf").is_none());
        assert!(resolve_served_path(root, "a@b.com", "/etc/passwd").is_none());
        assert!(resolve_served_path(root, "a@b.com", "").is_none());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("a/b/scan.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("photo.jpg"), "image/jpeg");
        assert_eq!(content_type_for("shot.png"), "image/png");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
