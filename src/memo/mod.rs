//! Memo service: upload commit protocol and the read/update/archive operations
//!
//! An upload is committed in two steps that are not atomic as a pair:
//!
//! 1. the validated PDF is written to the [`BlobStore`]
//! 2. the memo row is inserted in one database transaction
//!
//! If step 2 fails the blob from step 1 is deleted again before the
//! persistence error is returned. A failed compensating delete is logged
//! (the blob is then orphaned) and never replaces the original error.

pub mod naming;

use crate::db::memos::{self, MemoChanges, MemoRecord, NewMemo, PUBLIC_TAG};
use crate::db::Database;
use crate::error::{CoreError, InvalidInputKind, Result};
use crate::storage::BlobStore;
use chrono::{Local, NaiveDateTime, Timelike};
use futures::{Stream, StreamExt};
use naming::{normalize_title, DateStamp, FileNamer};
use serde::Serialize;
use std::fmt::Display;
use std::io;
use std::pin::pin;
use std::sync::Arc;

/// The only accepted content type
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Every accepted upload starts with these bytes
pub const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Numbered variants tried when a stored name is already taken
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Public view returned by upload and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoRead {
    pub title: String,
    pub file_name: String,
    pub tags: String,
}

impl From<&MemoRecord> for MemoRead {
    fn from(record: &MemoRecord) -> Self {
        MemoRead {
            title: record.title.clone(),
            file_name: record.file_name.clone(),
            tags: record.tags.clone(),
        }
    }
}

/// Listing entry for public memos
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoSummary {
    pub id: i64,
    pub title: String,
    pub uploaded_at: NaiveDateTime,
    /// Path of the download route, relative to the server root
    pub download_path: String,
    pub download_name: String,
}

impl From<MemoRecord> for MemoSummary {
    fn from(record: MemoRecord) -> Self {
        MemoSummary {
            download_path: download_path(record.id),
            id: record.id,
            title: record.title,
            uploaded_at: record.uploaded_at,
            download_name: record.file_name,
        }
    }
}

/// Route serving the PDF of memo `id`
pub fn download_path(id: i64) -> String {
    format!("/memo/{}/pdf", id)
}

/// A fully read upload that passed every content check
#[derive(Debug)]
pub struct PdfPayload {
    bytes: Vec<u8>,
}

impl PdfPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Everything `submit` needs for one upload
pub struct Upload<S> {
    pub content_type: Option<String>,
    pub declared_size: Option<u64>,
    pub file_name: String,
    pub title: String,
    pub tags: Option<String>,
    pub content: S,
}

/// Fields of a partial update; empty strings count as absent
#[derive(Debug, Clone, Default)]
pub struct MemoUpdate {
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub tags: Option<String>,
}

/// Bytes of a downloadable memo
#[derive(Debug)]
pub struct MemoDownload {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Coordinates the blob store and the record store
pub struct MemoService {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    namer: FileNamer,
    max_upload_bytes: usize,
}

impl MemoService {
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        stamp: DateStamp,
        max_upload_bytes: usize,
    ) -> Self {
        MemoService {
            db,
            blobs,
            namer: FileNamer::new(stamp),
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Validate and commit a complete upload
    pub async fn submit<S, B, E>(&self, upload: Upload<S>) -> Result<MemoRead>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let payload = self
            .receive(
                upload.content_type.as_deref(),
                upload.declared_size,
                upload.content,
            )
            .await?;
        self.commit(
            payload,
            &upload.file_name,
            &upload.title,
            upload.tags.as_deref(),
        )
        .await
    }

    /// Check content type and size, read the content, check the PDF signature.
    ///
    /// Nothing is written. The stream is not polled when the declared size
    /// is already over the limit, and reading stops at the first chunk that
    /// crosses it.
    pub async fn receive<S, B, E>(
        &self,
        content_type: Option<&str>,
        declared_size: Option<u64>,
        content: S,
    ) -> Result<PdfPayload>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        if !content_type.is_some_and(is_pdf_content_type) {
            return Err(CoreError::invalid(
                InvalidInputKind::WrongType,
                "Only PDF files are allowed",
            ));
        }

        if declared_size.is_some_and(|size| size > self.max_upload_bytes as u64) {
            return Err(self.too_large());
        }

        let mut content = pin!(content);
        let mut bytes = Vec::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| {
                CoreError::invalid(
                    InvalidInputKind::Malformed,
                    format!("Failed to read upload: {}", e),
                )
            })?;
            let chunk = chunk.as_ref();
            if bytes.len() + chunk.len() > self.max_upload_bytes {
                return Err(self.too_large());
            }
            bytes.extend_from_slice(chunk);
        }

        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(CoreError::invalid(
                InvalidInputKind::BadSignature,
                "Invalid PDF file",
            ));
        }

        Ok(PdfPayload { bytes })
    }

    /// Persist a validated upload: blob first, then the record.
    pub async fn commit(
        &self,
        payload: PdfPayload,
        raw_file_name: &str,
        title: &str,
        tags: Option<&str>,
    ) -> Result<MemoRead> {
        let file_name = self.create_blob(raw_file_name, &payload).await?;

        let new_memo = NewMemo {
            title: normalize_title(title),
            file_name: file_name.clone(),
            file_path: self.blobs.location(&file_name),
            uploaded_at: now_to_minute(),
            tags: tags
                .filter(|t| !t.is_empty())
                .unwrap_or(PUBLIC_TAG)
                .to_string(),
        };

        match self
            .db
            .with_tx(move |tx| memos::insert_memo(tx, &new_memo))
            .await
        {
            Ok(record) => {
                tracing::info!(
                    id = record.id,
                    bytes = payload.len(),
                    "Stored memo {}",
                    record.file_name
                );
                Ok(MemoRead::from(&record))
            }
            Err(e) => {
                tracing::error!("Failed to insert memo for {}: {}", file_name, e);
                self.discard_blob(&file_name).await;
                Err(CoreError::Persistence(e))
            }
        }
    }

    /// Write the blob under the derived name, or the first free numbered
    /// variant of it. Existing blobs are never replaced, so the compensating
    /// delete only ever removes what this upload created.
    async fn create_blob(&self, raw_file_name: &str, payload: &PdfPayload) -> Result<String> {
        let derived = self.namer.upload_name(raw_file_name);
        let mut file_name = derived.clone();

        for attempt in 2..=MAX_NAME_ATTEMPTS + 1 {
            match self.blobs.create(&file_name, payload.as_bytes()).await {
                Ok(()) => return Ok(file_name),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!("Blob {} exists, trying a numbered name", file_name);
                    file_name = FileNamer::numbered(&derived, attempt);
                }
                Err(e) => {
                    tracing::error!("Failed to write blob {}: {}", file_name, e);
                    return Err(CoreError::Storage(format!("File upload failed: {}", e)));
                }
            }
        }

        tracing::error!("No free blob name for {}", derived);
        Err(CoreError::Storage(format!(
            "File upload failed: too many files named {}",
            derived
        )))
    }

    /// Compensating delete after a failed insert
    async fn discard_blob(&self, file_name: &str) {
        match self.blobs.exists(file_name).await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!("Could not check blob {}: {}", file_name, e),
        }

        match self.blobs.delete(file_name).await {
            Ok(()) => tracing::info!("Removed blob {} after failed insert", file_name),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                blob = file_name,
                "Compensating delete failed, blob is orphaned: {}",
                e
            ),
        }
    }

    /// All public, non-archived memos
    pub async fn list_public(&self) -> Result<Vec<MemoSummary>> {
        let records = self.db.with_conn(|conn| memos::list_public(conn)).await?;
        Ok(records.into_iter().map(MemoSummary::from).collect())
    }

    /// Public memos whose title or file name contains `query`.
    ///
    /// Unlike [`MemoService::list_public`], an empty result is `NotFound`.
    pub async fn search(&self, query: &str) -> Result<Vec<MemoSummary>> {
        if query.is_empty() {
            return Err(CoreError::NotFound("Memos matching", query.to_string()));
        }

        let q = query.to_string();
        let records = self
            .db
            .with_conn(move |conn| memos::search_public(conn, &q))
            .await?;

        if records.is_empty() {
            return Err(CoreError::NotFound("Memos matching", query.to_string()));
        }
        Ok(records.into_iter().map(MemoSummary::from).collect())
    }

    /// Bytes and download name of a public memo
    pub async fn fetch_blob(&self, id: i64) -> Result<MemoDownload> {
        let record = self
            .db
            .with_conn(move |conn| memos::get_memo(conn, id))
            .await?
            .ok_or_else(|| CoreError::NotFound("Memo", id.to_string()))?;

        if !record.is_public() {
            return Err(CoreError::Forbidden(format!("memo {} is not public", id)));
        }

        let file_missing = || CoreError::NotFound("File", record.file_path.clone());
        let name = self.blobs.resolve(&record.file_path).ok_or_else(file_missing)?;

        let exists = self.blobs.exists(name).await.map_err(|e| {
            tracing::error!("Failed to check blob {}: {}", name, e);
            CoreError::Storage(format!("Failed to check {}: {}", name, e))
        })?;
        if !exists {
            tracing::warn!("Memo {} references missing blob {}", id, record.file_path);
            return Err(file_missing());
        }

        let bytes = self.blobs.read(name).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => file_missing(),
            _ => CoreError::Storage(format!("Failed to read {}: {}", name, e)),
        })?;

        Ok(MemoDownload {
            bytes,
            file_name: record.file_name,
        })
    }

    /// Apply the supplied fields.
    ///
    /// A new file name only changes the record; the blob keeps its name and
    /// `file_path`, so downloads keep working under the displayed new name.
    pub async fn update(&self, id: i64, update: MemoUpdate) -> Result<MemoRecord> {
        let changes = MemoChanges {
            title: non_empty(update.title).map(|t| normalize_title(&t)),
            file_name: non_empty(update.file_name).map(|n| self.namer.rename(&n)),
            tags: non_empty(update.tags),
        };

        let record = self
            .db
            .with_tx(move |tx| memos::update_memo(tx, id, &changes))
            .await?
            .ok_or_else(|| CoreError::NotFound("Memo", id.to_string()))?;

        tracing::info!(id, "Updated memo {}", record.file_name);
        Ok(record)
    }

    /// Archive a memo; the row and the blob are kept
    pub async fn soft_delete(&self, id: i64) -> Result<String> {
        let record = self
            .db
            .with_tx(move |tx| memos::archive_memo(tx, id))
            .await?
            .ok_or_else(|| CoreError::NotFound("Memo", id.to_string()))?;

        tracing::info!(id, "Archived memo {}", record.file_name);
        Ok(format!("{} deleted successfully.", record.title))
    }

    fn too_large(&self) -> CoreError {
        CoreError::invalid(
            InvalidInputKind::TooLarge,
            format!(
                "File exceeds maximum allowed size ({} MB)",
                self.max_upload_bytes / (1024 * 1024)
            ),
        )
    }
}

/// Media type essence is `application/pdf`, parameters ignored
fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn now_to_minute() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}
