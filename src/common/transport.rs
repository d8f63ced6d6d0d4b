//! Request/response envelope and the raw network primitive
//!
//! [`Transport`] sends exactly one request and returns one response or a
//! transport-level failure. [`ReqwestTransport`] is the production
//! implementation; tests plug in scripted fakes.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures (no usable response)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to read body: {0}")]
    Body(#[from] std::io::Error),
    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// One-shot stream of request body chunks
pub type BodyStream = Pin<Box<dyn futures::Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Request body: in-memory bytes, or a stream that can be read only once
pub enum RequestBody {
    Bytes(Bytes),
    Stream(BodyStream),
}

impl RequestBody {
    /// Wrap a one-shot chunk stream
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self::Stream(Box::pin(stream))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(body: String) -> Self {
        Self::Bytes(Bytes::from(body))
    }
}

/// A body buffered once that can reproduce identical bytes for every attempt
#[derive(Debug, Clone)]
pub struct ReplayableBody(Bytes);

impl ReplayableBody {
    /// Buffer `body` fully, reading a stream to its end if necessary
    pub async fn buffer(body: RequestBody) -> Result<Self, TransportError> {
        match body {
            RequestBody::Bytes(bytes) => Ok(Self(bytes)),
            RequestBody::Stream(stream) => {
                let buf = stream
                    .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                        buf.extend_from_slice(&chunk);
                        Ok(buf)
                    })
                    .await?;
                Ok(Self(buf.freeze()))
            }
        }
    }

    /// A fresh body sharing the buffered bytes
    pub fn regenerate(&self) -> RequestBody {
        RequestBody::Bytes(self.0.clone())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outbound request envelope
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Same method, URL and headers with a different body
    pub(crate) fn replay(&self, body: Option<RequestBody>) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}

/// Response body as a stream of chunks
pub struct ResponseBody(BoxStream<'static, Result<Bytes, TransportError>>);

impl ResponseBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self(stream.boxed())
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// Collect the whole body
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        let buf = self
            .0
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Collect the whole body as (lossy) UTF-8 text
    pub async fn text(self) -> Result<String, TransportError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read and discard the rest of the body so the connection can be reused
    pub async fn drain(mut self) {
        while let Some(chunk) = self.0.next().await {
            if chunk.is_err() {
                break;
            }
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(stream::once(async move { Ok(bytes) }))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(body: &'static str) -> Self {
        Self::from(Bytes::from_static(body.as_bytes()))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody(..)")
    }
}

/// Inbound response envelope
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<ResponseBody>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the retrying transport should try again after this status
    pub fn is_retryable(&self) -> bool {
        self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Raw network primitive: one request in, one response or failure out
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes),
            Some(RequestBody::Stream(stream)) => builder.body(reqwest::Body::wrap_stream(stream)),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = ResponseBody::new(response.bytes_stream().map_err(TransportError::from));

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(parts: &[&'static str]) -> RequestBody {
        let chunks: Vec<std::io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        RequestBody::stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_buffer_stream_body() {
        let replay = ReplayableBody::buffer(chunked(&["{\"a\":", "1}"])).await.unwrap();
        assert_eq!(replay.len(), 7);

        for _ in 0..3 {
            match replay.regenerate() {
                RequestBody::Bytes(bytes) => assert_eq!(&bytes[..], b"{\"a\":1}"),
                RequestBody::Stream(_) => panic!("regenerated body should be in memory"),
            }
        }
    }

    #[tokio::test]
    async fn test_buffer_stream_error() {
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "reader closed")),
        ];
        let err = ReplayableBody::buffer(RequestBody::stream(stream::iter(chunks)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Body(_)));
    }

    #[tokio::test]
    async fn test_regenerate_leaves_original_bytes() {
        let original = Bytes::from_static(b"payload");
        let replay = ReplayableBody::buffer(RequestBody::Bytes(original.clone()))
            .await
            .unwrap();

        drop(replay.regenerate());
        assert_eq!(&original[..], b"payload");
        assert_eq!(replay.len(), original.len());
    }

    #[tokio::test]
    async fn test_response_body_text() {
        let body = ResponseBody::new(stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));
        assert_eq!(body.text().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_drain_stops_on_error() {
        let body = ResponseBody::new(stream::iter(vec![
            Ok(Bytes::from_static(b"x")),
            Err(TransportError::Connection("reset".into())),
        ]));
        body.drain().await;
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [429u16, 500, 502, 503, 504] {
            let response = Response::new(StatusCode::from_u16(code).unwrap(), "");
            assert!(response.is_retryable(), "{code} should be retried");
        }
        for code in [200u16, 204, 400, 401, 403, 404] {
            let response = Response::new(StatusCode::from_u16(code).unwrap(), "");
            assert!(!response.is_retryable(), "{code} should pass through");
        }
    }

    #[test]
    fn test_replay_copies_head() {
        let mut request = Request::new(Method::POST, "http://localhost/x").with_body("abc".to_string());
        request
            .headers
            .insert("accept", "application/json".parse().unwrap());

        let copy = request.replay(None);
        assert_eq!(copy.method, Method::POST);
        assert_eq!(copy.url, "http://localhost/x");
        assert_eq!(copy.headers.get("accept").unwrap(), "application/json");
        assert!(copy.body.is_none());
    }
}
