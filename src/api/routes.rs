//! HTTP route handlers for the API

use super::AppState;
use crate::error::{CoreError, InvalidInputKind, Result};
use crate::memo::{MemoRead, MemoSummary, MemoUpdate};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Upload
// ============================================================================

fn malformed(e: impl std::fmt::Display) -> CoreError {
    CoreError::invalid(InvalidInputKind::Malformed, format!("Multipart error: {}", e))
}

/// Upload a PDF memo.
///
/// Multipart form with `file` (required), `title` (required) and `tags`.
/// The file part is validated while it is read, before any other work.
pub async fn upload_memo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MemoRead>)> {
    let mut payload = None;
    let mut file_name = None;
    let mut title = None;
    let mut tags = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                file_name = Some(field.file_name().unwrap_or("memo").to_string());
                let content_type = field.content_type().map(|c| c.to_string());
                let declared_size = field
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());

                payload = Some(
                    state
                        .memos
                        .receive(content_type.as_deref(), declared_size, field)
                        .await?,
                );
            }
            Some("title") => title = Some(field.text().await.map_err(malformed)?),
            Some("tags") => tags = Some(field.text().await.map_err(malformed)?),
            _ => {} // ignore unknown fields
        }
    }

    let payload = payload.ok_or_else(|| {
        CoreError::invalid(InvalidInputKind::Malformed, "Missing file in multipart form")
    })?;
    let title = title.ok_or_else(|| {
        CoreError::invalid(InvalidInputKind::Malformed, "Missing title in multipart form")
    })?;
    let file_name = file_name.unwrap_or_default();

    let memo = state
        .memos
        .commit(payload, &file_name, &title, tags.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(memo)))
}

// ============================================================================
// Listing & Search
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MemoListItem {
    pub id: i64,
    pub title: String,
    pub uploaded_at: NaiveDateTime,
    pub download_url: String,
    pub download_name: String,
}

fn list_items(state: &AppState, headers: &HeaderMap, memos: Vec<MemoSummary>) -> Vec<MemoListItem> {
    let base_url = base_url(state, headers);
    memos
        .into_iter()
        .map(|m| MemoListItem {
            id: m.id,
            title: m.title,
            uploaded_at: m.uploaded_at,
            download_url: format!("{}{}", base_url, m.download_path),
            download_name: m.download_name,
        })
        .collect()
}

/// Configured public URL, or `http://<Host>` of the current request
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

pub async fn list_memos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MemoListItem>>> {
    let memos = state.memos.list_public().await?;
    Ok(Json(list_items(&state, &headers, memos)))
}

pub async fn search_memos(
    State(state): State<AppState>,
    Path(query): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<MemoListItem>>> {
    let memos = state.memos.search(&query).await?;
    Ok(Json(list_items(&state, &headers, memos)))
}

// ============================================================================
// Download
// ============================================================================

pub async fn download_pdf(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response> {
    let download = state.memos.fetch_blob(id).await?;

    let disposition = content_disposition(&download.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(crate::memo::PDF_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

/// `attachment; filename="..."` with quotes, backslashes and control
/// characters dropped. Non-ASCII names get an ASCII fallback plus an
/// RFC 5987 `filename*` parameter.
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();

    let value = if safe.is_ascii() {
        format!("attachment; filename=\"{}\"", safe)
    } else {
        let fallback: String = safe
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&safe)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ============================================================================
// Update & Delete
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateMemoForm {
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub tags: Option<String>,
}

pub async fn update_memo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<UpdateMemoForm>,
) -> Result<Json<MemoRead>> {
    let record = state
        .memos
        .update(
            id,
            MemoUpdate {
                title: form.title,
                file_name: form.file_name,
                tags: form.tags,
            },
        )
        .await?;
    Ok(Json(MemoRead::from(&record)))
}

pub async fn delete_memo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let message = state.memos.soft_delete(id).await?;
    Ok(Json(serde_json::json!({ "message": message })))
}
