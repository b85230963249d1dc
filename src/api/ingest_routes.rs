use super::{parse_text_input, read_body, AppState, BodyKind};
use crate::chunker::{chunk, Chunk, ChunkParams, ChunkUnit};
use crate::error::ApiError;
use crate::monitoring::metrics::{observe_chunking_ms, record_ingest};
use crate::monitoring::{record_chunking_snapshot, ChunkingSnapshot};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    pub size: Option<i64>,
    pub overlap: Option<i64>,
    pub unit: Option<String>,
    pub echo: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Longest upload extension carried over to the temp file
const MAX_EXTENSION_LEN: usize = 16;

/// Resolve per-request chunking parameters over the configured defaults.
///
/// An omitted overlap is the default overlap, shrunk below `size` when a
/// small size is requested.
pub fn resolve_params(defaults: &ChunkParams, query: &IngestQuery) -> Result<ChunkParams, ApiError> {
    let size = query.size.unwrap_or(defaults.size() as i64);
    let overlap = match query.overlap {
        Some(overlap) => overlap,
        None => (defaults.overlap() as i64).min(size.saturating_sub(1)).max(0),
    };
    let unit = match query.unit.as_deref() {
        Some(unit) => unit.parse::<ChunkUnit>()?,
        None => defaults.unit(),
    };
    Ok(ChunkParams::new(size, overlap)?.with_unit(unit))
}

/// Extension of the uploaded file name, if it is short and alphanumeric.
fn upload_suffix(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Stream one multipart field into a temp file. The file is removed when
/// the returned handle drops.
async fn spool_to_tempfile(
    field: &mut Field,
    suffix: String,
    limit: usize,
) -> Result<NamedTempFile, ApiError> {
    let mut file = web::block(move || {
        tempfile::Builder::new()
            .prefix("ingest-")
            .suffix(&suffix)
            .tempfile()
    })
    .await
    .map_err(|e| ApiError::UploadFailed(e.to_string()))?
    .map_err(|e| ApiError::UploadFailed(format!("failed to create temp file: {e}")))?;

    let mut written = 0usize;
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| ApiError::UploadFailed(e.to_string()))?;
        written += data.len();
        if written > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        file = web::block(move || file.write_all(&data).map(|_| file))
            .await
            .map_err(|e| ApiError::UploadFailed(e.to_string()))?
            .map_err(|e| ApiError::UploadFailed(format!("failed to write temp file: {e}")))?;
    }

    file = web::block(move || file.flush().map(|_| file))
        .await
        .map_err(|e| ApiError::UploadFailed(e.to_string()))?
        .map_err(|e| ApiError::UploadFailed(format!("failed to write temp file: {e}")))?;
    debug!(path = %file.path().display(), bytes = written, "upload spooled");
    Ok(file)
}

async fn read_field_text(field: &mut Field, limit: usize) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| ApiError::UploadFailed(e.to_string()))?;
        if buf.len() + data.len() > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&data);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Text from a multipart body: the `file` field goes through the extractor,
/// otherwise the `text` field is used as-is.
async fn text_from_multipart(
    state: &AppState,
    mut payload: Multipart,
) -> Result<(String, &'static str), ApiError> {
    let limit = state.max_upload_bytes;
    let mut text_field = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::UploadFailed(e.to_string()))?;
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);
                let upload =
                    spool_to_tempfile(&mut field, upload_suffix(filename.as_deref()), limit)
                        .await?;
                info!(
                    filename = filename.as_deref().unwrap_or(""),
                    "extracting uploaded file"
                );
                let text = state.extractor.extract(upload.path()).await?;
                return Ok((text, "file"));
            }
            Some("text") if text_field.is_none() => {
                text_field = Some(read_field_text(&mut field, limit).await?);
            }
            _ => {
                // Drain fields we do not use
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| ApiError::UploadFailed(e.to_string()))?;
                }
            }
        }
    }

    Ok((text_field.unwrap_or_default(), "multipart_text"))
}

/// POST /ingest
pub async fn ingest(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let query = web::Query::<IngestQuery>::from_query(req.query_string())
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?
        .into_inner();
    let params = resolve_params(&state.chunk_params, &query)?;
    let echo = query.echo.unwrap_or(state.echo_text);

    let kind = BodyKind::of(&req);
    let (raw, source) = match kind {
        BodyKind::Multipart => {
            text_from_multipart(&state, Multipart::new(req.headers(), payload)).await?
        }
        other => {
            let body = read_body(payload, state.max_upload_bytes).await?;
            (parse_text_input(other, &body)?, other.label())
        }
    };

    let text = raw.trim();
    if text.is_empty() {
        return Err(ApiError::NoInput);
    }

    let started = Instant::now();
    let chunks = chunk(text, &params);
    let elapsed = started.elapsed();

    observe_chunking_ms(elapsed.as_secs_f64() * 1000.0);
    record_ingest(source, chunks.len());
    record_chunking_snapshot(ChunkingSnapshot::new(
        source,
        &params,
        text.len(),
        &chunks,
        elapsed.as_micros() as u64,
    ));

    Ok(HttpResponse::Ok().json(IngestResponse {
        chunks,
        text: echo.then(|| text.to_string()),
    }))
}
