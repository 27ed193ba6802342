//! Content reference classification and inline payload decoding.
//!
//! Provider results and reference inputs arrive as one of three shapes:
//! an inline base64 payload (optionally a `data:` URI), an external
//! HTTP(S) URL, or a cloud-object URI. Classification is by prefix; the
//! materializer and the worker both rely on it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Classified content reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// Base64 payload, with or without a `data:` URI wrapper.
    Inline(String),
    /// External `http://` or `https://` URL.
    Url(String),
    /// Cloud object URI (`gs://`, `s3://`).
    CloudUri(String),
}

impl ContentRef {
    /// Classify a raw content reference string.
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            ContentRef::Url(raw.to_string())
        } else if raw.starts_with("gs://") || raw.starts_with("s3://") {
            ContentRef::CloudUri(raw.to_string())
        } else {
            ContentRef::Inline(raw.to_string())
        }
    }
}

/// Default mime type assumed for bare base64 payloads.
pub const DEFAULT_INLINE_MIME: &str = "image/png";

/// Decode an inline payload into bytes and a mime type.
///
/// Accepts both `data:<mime>;base64,<payload>` URIs and bare base64.
pub fn decode_inline(payload: &str) -> Result<(Vec<u8>, String), base64::DecodeError> {
    if let Some(rest) = payload.strip_prefix("data:") {
        if let Some((mime, data)) = rest.split_once(";base64,") {
            let bytes = BASE64.decode(data.trim())?;
            return Ok((bytes, mime.to_string()));
        }
    }
    let bytes = BASE64.decode(payload.trim())?;
    Ok((bytes, DEFAULT_INLINE_MIME.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_prefix() {
        assert_eq!(
            ContentRef::classify("https://cdn.example.com/a.png"),
            ContentRef::Url("https://cdn.example.com/a.png".into())
        );
        assert_eq!(
            ContentRef::classify("gs://bucket/key.mp4"),
            ContentRef::CloudUri("gs://bucket/key.mp4".into())
        );
        assert_eq!(
            ContentRef::classify("aGVsbG8="),
            ContentRef::Inline("aGVsbG8=".into())
        );
    }

    #[test]
    fn decode_data_uri_extracts_mime() {
        let (bytes, mime) = decode_inline("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn decode_bare_base64_uses_default_mime() {
        let (bytes, mime) = decode_inline("aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime, DEFAULT_INLINE_MIME);
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_inline("not-base64!!!").is_err());
    }
}
