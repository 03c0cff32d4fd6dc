//! Byte-exact capture of outgoing responses.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;

/// A fully-buffered copy of one response. Once stored under an idempotency
/// key the record is read-only; replay returns these exact bytes.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub body: Bytes,
    pub captured_at: DateTime<Utc>,
    pub headers: HeaderMap,
    pub status: StatusCode,
}

impl CapturedResponse {
    /// Rebuild the exact response this capture was taken from.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Buffers the pieces of an outgoing response as they are forwarded.
///
/// The capturer wraps the response *pieces* (status, headers, body chunks)
/// rather than any concrete transport type, so it composes with whatever
/// produced them.
#[derive(Debug)]
pub struct ResponseCapturer {
    body: BytesMut,
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseCapturer {
    pub fn new(status: StatusCode, headers: &HeaderMap) -> Self {
        Self {
            body: BytesMut::new(),
            headers: headers.clone(),
            status,
        }
    }

    /// Record one body chunk. Chunks must be fed in write order.
    pub fn record_chunk(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.body.len()
    }

    /// Finish the capture. Callable once the whole body has been recorded.
    pub fn extract(self) -> CapturedResponse {
        CapturedResponse {
            body: self.body.freeze(),
            captured_at: Utc::now(),
            headers: self.headers,
            status: self.status,
        }
    }

    /// Give up on the capture, returning the bytes buffered so far.
    pub fn abandon(self) -> Bytes {
        self.body.freeze()
    }
}

/// Outcome of teeing a response through a capturer.
pub enum CaptureOutcome {
    /// The body fit under the cap; the response is rebuilt byte-identical.
    Captured(Response, CapturedResponse),
    /// The body exceeded the cap. The response carries the original bytes
    /// untouched (buffered prefix chained with the rest of the stream);
    /// nothing was captured.
    Overflow(Response),
}

/// Stream a response body through a capturer, handing back a response the
/// client cannot tell apart from the original.
pub async fn tee(response: Response, limit: usize) -> Result<CaptureOutcome, axum::Error> {
    let (parts, body) = response.into_parts();
    let mut capturer = ResponseCapturer::new(parts.status, &parts.headers);
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if capturer.buffered() + chunk.len() > limit {
            let prefix =
                futures_util::stream::iter([Ok::<_, axum::Error>(capturer.abandon()), Ok(chunk)]);
            let body = Body::from_stream(prefix.chain(stream));
            return Ok(CaptureOutcome::Overflow(Response::from_parts(parts, body)));
        }
        capturer.record_chunk(&chunk);
    }

    let captured = capturer.extract();
    let response = Response::from_parts(parts, Body::from(captured.body.clone()));
    Ok(CaptureOutcome::Captured(response, captured))
}
