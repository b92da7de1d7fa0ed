use axum::{
    body::Body,
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

/// Marks the body as the Vercel AI SDK data stream
pub const DATA_STREAM_HEADER: HeaderName = HeaderName::from_static("x-vercel-ai-data-stream");

/// Set the streaming headers the chat client expects. Safe to apply more
/// than once; existing values are replaced, not duplicated.
pub fn patch_response_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(DATA_STREAM_HEADER, HeaderValue::from_static("v1"));
}

// Streamed body for a chat turn, written out as each chunk is produced
pub struct SseResponse {
    body: BoxStream<'static, Bytes>,
}

impl SseResponse {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Self {
            body: body.boxed(),
        }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx).map(|opt| opt.map(Ok))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self));
        patch_response_headers(response.headers_mut());
        response
    }
}
