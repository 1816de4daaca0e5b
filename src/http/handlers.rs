//! HTTP request handlers

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ConvertError, Result};
use crate::format::AudioFormat;
use crate::state::AppState;
use crate::transcode::ConversionResult;

/// Stem used when the upload has no usable filename
const FALLBACK_STEM: &str = "audio";

/// Convert an uploaded audio file
/// POST /convert/{to_format}
///
/// The format is checked before the body is read. The staged upload is
/// released once conversion finishes, whether or not it succeeded.
#[tracing::instrument(
    name = "convert",
    skip(state, multipart),
    fields(request_id = %Uuid::new_v4())
)]
pub async fn convert_audio(
    State(state): State<Arc<AppState>>,
    Path(to_format): Path<String>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let format: AudioFormat = to_format.parse()?;
    tracing::info!("desired audio format is {}", format);

    let mut multipart = multipart.map_err(|e| ConvertError::UploadMissing(e.body_text()))?;
    let upload = state.stager.stage(&mut multipart).await?;
    tracing::info!(
        "retrieved audio file from the request; name: {:?}, size: {} bytes",
        upload.filename(),
        upload.size()
    );

    let converted = state.transcoder.convert(&upload, format).await;
    let filename = download_filename(upload.filename(), format);
    upload.release();

    let result = converted?;
    tracing::info!("received converted audio buffer with {} bytes", result.bytes.len());

    Ok(audio_response(&filename, result))
}

fn audio_response(filename: &str, result: ConversionResult) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(result.format.mime_type()),
    );
    let disposition = HeaderValue::from_str(&format!("attachment; filename={}", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    (headers, result.bytes).into_response()
}

/// Name offered to the client: the uploaded file's basename with its
/// extension replaced by the target format.
pub fn download_filename(original: &str, format: AudioFormat) -> String {
    let basename = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = std::path::Path::new(basename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let stem: String = stem
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && !matches!(c, '"' | ';' | '\\' | ',') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim();

    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    format!("{}.{}", stem, format)
}
