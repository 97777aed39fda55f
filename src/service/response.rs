//! Response envelopes and OGC exception reports.

use std::num::NonZeroUsize;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::cache::etag;
use crate::error::{ExceptionCode, ServiceError};
use crate::imaging::ImageFormat;

/// Number of distinct exception documents kept serialized.
pub const EXCEPTION_CACHE_ENTRIES: usize = 1024;

const GENERIC_MESSAGE: &str = "unknown error";
const NOT_AUTHORIZED: &str = "not authorized";

// =============================================================================
// Response Envelope
// =============================================================================

/// Bytes, headers and status produced by every terminal pipeline stage.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub data: Bytes,
    pub headers: HeaderMap,
    pub code: StatusCode,
}

impl ResponseEnvelope {
    pub fn new(code: StatusCode, data: impl Into<Bytes>, headers: HeaderMap) -> Self {
        Self {
            data: data.into(),
            headers,
            code,
        }
    }

    pub fn ok(data: impl Into<Bytes>, headers: HeaderMap) -> Self {
        Self::new(StatusCode::OK, data, headers)
    }

    /// 200 response for an encoded image with type, length and ETag set.
    pub fn image(data: Bytes, format: ImageFormat) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime()));
        set_length_and_etag(&mut headers, &data, true);
        Self::ok(data, headers)
    }

    /// 200 response for a capabilities document.
    pub fn xml(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        set_length_and_etag(&mut headers, &data, true);
        Self::ok(data, headers)
    }

    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Set `content-length` (always) and `etag` (when `replace_etag` or absent).
pub(crate) fn set_length_and_etag(headers: &mut HeaderMap, data: &[u8], replace_etag: bool) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
    if replace_etag || !headers.contains_key(ETAG) {
        if let Ok(value) = HeaderValue::from_str(&etag(data)) {
            headers.insert(ETAG, value);
        }
    }
}

// =============================================================================
// Error Rendering
// =============================================================================

type DocumentKey = (String, ExceptionCode, Option<String>);

/// Turns [`ServiceError`]s into envelopes.
///
/// Exception documents are memoized per (text, code, locator) in a bounded
/// LRU, together with their ETag.
pub struct ServiceErrors {
    documents: Mutex<LruCache<DocumentKey, (Bytes, HeaderValue)>>,
    dev_mode: bool,
}

impl ServiceErrors {
    pub fn new(dev_mode: bool) -> Self {
        Self::with_capacity(dev_mode, EXCEPTION_CACHE_ENTRIES)
    }

    pub fn with_capacity(dev_mode: bool, entries: usize) -> Self {
        let cap = NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            documents: Mutex::new(LruCache::new(cap)),
            dev_mode,
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Number of serialized exception documents currently cached.
    pub async fn cached_documents(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn render(&self, err: &ServiceError) -> ResponseEnvelope {
        match err {
            ServiceError::Parameter {
                code,
                locator,
                message,
            } => {
                warn!(status = 400, code = %code, locator = ?locator, "{}", message);
                self.exception(StatusCode::BAD_REQUEST, *code, locator.as_deref(), message)
                    .await
            }
            ServiceError::Unauthorized => {
                warn!(status = 401, "Layer not viewable");
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                headers.insert(CONTENT_LENGTH, HeaderValue::from(NOT_AUTHORIZED.len()));
                ResponseEnvelope::new(StatusCode::UNAUTHORIZED, NOT_AUTHORIZED, headers)
            }
            ServiceError::NotFound { message } => {
                debug!(status = 404, "{}", message);
                self.exception(
                    StatusCode::NOT_FOUND,
                    ExceptionCode::TileOutOfRange,
                    None,
                    message,
                )
                .await
            }
            ServiceError::Internal { message } => {
                error!(status = 500, "Internal error: {}", message);
                let text = if self.dev_mode {
                    message.as_str()
                } else {
                    GENERIC_MESSAGE
                };
                self.exception(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ExceptionCode::NoApplicableCode,
                    None,
                    text,
                )
                .await
            }
            ServiceError::Cancelled => {
                error!(status = 500, "Request cancelled");
                self.exception(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ExceptionCode::NoApplicableCode,
                    None,
                    &err.to_string(),
                )
                .await
            }
        }
    }

    /// Exception report envelope, served from the document cache when possible.
    pub async fn exception(
        &self,
        status: StatusCode,
        code: ExceptionCode,
        locator: Option<&str>,
        text: &str,
    ) -> ResponseEnvelope {
        let key = (text.to_string(), code, locator.map(str::to_string));

        let (data, tag) = {
            let mut documents = self.documents.lock().await;
            match documents.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let data = Bytes::from(exception_report(code, locator, text));
                    let tag = HeaderValue::from_str(&etag(&data))
                        .unwrap_or_else(|_| HeaderValue::from_static("\"\""));
                    documents.put(key, (data.clone(), tag.clone()));
                    (data, tag)
                }
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
        headers.insert(ETAG, tag);
        ResponseEnvelope::new(status, data, headers)
    }
}

fn exception_report(code: ExceptionCode, locator: Option<&str>, text: &str) -> String {
    let locator = locator
        .map(|l| format!(" locator=\"{}\"", escape_xml(l)))
        .unwrap_or_default();
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<ExceptionReport version=\"1.1.0\" xmlns=\"http://www.opengis.net/ows/1.1\"\n",
            "  xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n",
            "  xsi:schemaLocation=\"http://www.opengis.net/ows/1.1 ",
            "http://geowebcache.org/schema/ows/1.1.0/owsExceptionReport.xsd\">\n",
            "  <Exception exceptionCode=\"{code}\"{locator}>\n",
            "    <ExceptionText>{text}</ExceptionText>\n",
            "  </Exception>\n",
            "</ExceptionReport>\n"
        ),
        code = code,
        locator = locator,
        text = escape_xml(text),
    )
}

pub(crate) fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(envelope: &ResponseEnvelope) -> String {
        String::from_utf8(envelope.data.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_parameter_error_document() {
        let errors = ServiceErrors::new(false);
        let envelope = errors.render(&ServiceError::missing("tilerow")).await;

        assert_eq!(envelope.code, StatusCode::BAD_REQUEST);
        assert_eq!(envelope.header(CONTENT_TYPE), Some("application/xml"));
        let text = body(&envelope);
        assert!(text.contains("exceptionCode=\"MissingParameterValue\""));
        assert!(text.contains("locator=\"TILEROW\""));
        assert!(text.contains("<ExceptionText>missing required parameter: tilerow</ExceptionText>"));
        assert_eq!(
            envelope.header(CONTENT_LENGTH),
            Some(envelope.data.len().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_plain() {
        let errors = ServiceErrors::new(false);
        let envelope = errors.render(&ServiceError::Unauthorized).await;
        assert_eq!(envelope.code, StatusCode::UNAUTHORIZED);
        assert_eq!(body(&envelope), "not authorized");
        assert_eq!(errors.cached_documents().await, 0);
    }

    #[tokio::test]
    async fn test_not_found_has_no_locator() {
        let errors = ServiceErrors::new(false);
        let envelope = errors
            .render(&ServiceError::NotFound {
                message: "tile is not available".into(),
            })
            .await;
        assert_eq!(envelope.code, StatusCode::NOT_FOUND);
        let text = body(&envelope);
        assert!(text.contains("exceptionCode=\"TileOutOfRange\""));
        assert!(!text.contains("locator="));
    }

    #[tokio::test]
    async fn test_internal_detail_hidden_outside_dev_mode() {
        let err = ServiceError::internal("decoder exploded");

        let prod = ServiceErrors::new(false).render(&err).await;
        assert_eq!(prod.code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&prod).contains("unknown error"));
        assert!(!body(&prod).contains("decoder exploded"));
        assert!(body(&prod).contains("NoApplicableCode"));

        let dev = ServiceErrors::new(true).render(&err).await;
        assert!(body(&dev).contains("decoder exploded"));
    }

    #[tokio::test]
    async fn test_cancelled_is_distinct() {
        let envelope = ServiceErrors::new(false).render(&ServiceError::Cancelled).await;
        assert_eq!(envelope.code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&envelope).contains("request cancelled"));
    }

    #[tokio::test]
    async fn test_documents_are_cached() {
        let errors = ServiceErrors::new(false);
        let first = errors.render(&ServiceError::invalid("bbox", "1,2")).await;
        let second = errors.render(&ServiceError::invalid("bbox", "1,2")).await;
        assert_eq!(errors.cached_documents().await, 1);
        assert_eq!(first.data.as_ptr(), second.data.as_ptr());
        assert_eq!(first.header(ETAG), second.header(ETAG));

        errors.render(&ServiceError::invalid("bbox", "3,4")).await;
        assert_eq!(errors.cached_documents().await, 2);
    }

    #[tokio::test]
    async fn test_document_cache_is_bounded() {
        let errors = ServiceErrors::with_capacity(false, 2);
        for value in ["a", "b", "c"] {
            errors.render(&ServiceError::invalid("format", value)).await;
        }
        assert_eq!(errors.cached_documents().await, 2);
    }

    #[test]
    fn test_text_is_escaped() {
        let doc = exception_report(ExceptionCode::InvalidParameterValue, Some("BBOX"), "a<b & \"c\"");
        assert!(doc.contains("a&lt;b &amp; &quot;c&quot;"));
    }

    #[test]
    fn test_image_envelope_headers() {
        let data = Bytes::from_static(b"\x89PNG fake");
        let envelope = ResponseEnvelope::image(data.clone(), ImageFormat::Png);
        assert_eq!(envelope.code, StatusCode::OK);
        assert_eq!(envelope.header(CONTENT_TYPE), Some("image/png"));
        assert_eq!(envelope.header(ETAG), Some(etag(&data).as_str()));
    }

    #[test]
    fn test_existing_etag_kept_unless_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"upstream\""));
        set_length_and_etag(&mut headers, b"abc", false);
        assert_eq!(headers.get(ETAG).unwrap(), "\"upstream\"");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "3");

        set_length_and_etag(&mut headers, b"abc", true);
        assert_eq!(headers.get(ETAG).unwrap().to_str().unwrap(), etag(b"abc"));
    }
}
