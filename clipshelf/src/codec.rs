//! Image payload codec
//!
//! The document store only holds text, so image bytes are stored as
//! `data:<mime>;base64,<payload>` URLs. Everything is normalized to PNG before
//! encoding since that is the only image type every platform clipboard accepts.

use crate::interface::CodecError;
use crate::models::ImageBlob;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use std::io::Cursor;

pub const CANONICAL_MIME: &str = "image/png";

/// Encode bytes as a base64 data URL
pub fn encode(payload: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(payload))
}

/// Decode a data URL (or a bare base64 string) back to bytes
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let encoded = match text.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| CodecError::Decode("data URL has no payload separator".into()))?;
            if !header.ends_with(";base64") {
                return Err(CodecError::Decode(format!("unsupported data URL header `{}`", header)));
            }
            data
        }
        None => text,
    };

    STANDARD
        .decode(encoded.trim())
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Rebuild the runtime image handle for a stored payload.
/// Runs on a blocking thread since payloads can be several megabytes.
pub async fn hydrate(image_data: &str, mime_type: &str) -> Result<ImageBlob, CodecError> {
    let image_data = image_data.to_owned();
    let mime_type = mime_type.to_owned();
    tokio::task::spawn_blocking(move || {
        decode(&image_data).map(|bytes| ImageBlob { bytes, mime_type })
    })
    .await
    .map_err(|e| CodecError::Decode(format!("decode task failed: {}", e)))?
}

fn is_canonical(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(CANONICAL_MIME))
}

/// Transcode to PNG unless the payload already is one.
/// Returns the (possibly new) bytes and their MIME type.
pub async fn normalize(payload: Vec<u8>, mime_type: &str) -> Result<(Vec<u8>, String), CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if is_canonical(mime_type) {
        return Ok((payload, CANONICAL_MIME.to_string()));
    }

    let source_mime = mime_type.to_owned();
    let transcode_error = |reason: String| CodecError::Transcode {
        mime_type: mime_type.to_owned(),
        reason,
    };

    let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
        let decoded = match ImageFormat::from_mime_type(&source_mime) {
            Some(format) => image::load_from_memory_with_format(&payload, format),
            None => image::load_from_memory(&payload),
        }
        .map_err(|e| e.to_string())?;

        let mut out = Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        Ok(out.into_inner())
    })
    .await
    .map_err(|e| transcode_error(e.to_string()))?
    .map_err(transcode_error)?;

    Ok((png, CANONICAL_MIME.to_string()))
}
