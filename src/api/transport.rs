//! Purpose: Issue HTTP requests against the OrbitDB REST API base URL.
//! Exports: `Transport`, `HttpTransport`, `ApiResult`, `DEFAULT_TIMEOUT`.
//! Role: Thin collaborator behind a trait; the database handle never touches ureq.
//! Invariants: Every path segment is percent-encoded when the URL is built.
//! Invariants: A non-JSON body is a decode failure even when the status is non-2xx.
//! Invariants: Failures carry the raw body; nothing is retried here.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One round trip to the server. `request` decodes the body as JSON;
/// `stream` hands back the raw body reader for server-sent events.
pub trait Transport: Send + Sync {
    fn request(
        &self,
        method: &str,
        segments: &[&str],
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> ApiResult<Value>;

    fn stream(
        &self,
        segments: &[&str],
        timeout: Option<Duration>,
    ) -> ApiResult<Box<dyn Read + Send + Sync>>;
}

#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

struct HttpTransportInner {
    base_url: Url,
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(HttpTransportInner {
                base_url,
                agent,
                timeout,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: &str,
        segments: &[&str],
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> ApiResult<Value> {
        let url = build_url(&self.inner.base_url, segments)?;
        tracing::debug!(method, url = %url, "request");
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .timeout(timeout.unwrap_or(self.inner.timeout))
            .set("Accept", "application/json");
        let response = match body {
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
            None => request.call(),
        };

        match response {
            Ok(resp) => decode_body(read_body(resp)?),
            Err(ureq::Error::Status(status, resp)) => {
                Err(error_from_status(status, read_body(resp)?))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_source(err)),
        }
    }

    fn stream(
        &self,
        segments: &[&str],
        timeout: Option<Duration>,
    ) -> ApiResult<Box<dyn Read + Send + Sync>> {
        let url = build_url(&self.inner.base_url, segments)?;
        tracing::debug!(url = %url, "stream request");
        let mut request = self
            .inner
            .agent
            .request("GET", url.as_str())
            .set("Accept", "text/event-stream");
        // An event stream is unbounded; only an explicit timeout applies.
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        match request.call() {
            Ok(resp) => Ok(Box::new(resp.into_reader())),
            Err(ureq::Error::Status(status, resp)) => {
                Err(error_from_status(status, read_body(resp)?))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("stream request failed")
                .with_source(err)),
        }
    }
}

fn read_body(resp: ureq::Response) -> ApiResult<String> {
    resp.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_source(err)
    })
}

/// Decodes a success body, reporting non-JSON as a decode failure with the
/// raw text attached.
fn decode_body(body: String) -> ApiResult<Value> {
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("response body is not valid json")
            .with_body(body)
            .with_source(err)
    })
}

/// Decode takes priority: a non-2xx response whose body is not JSON surfaces
/// as a decode failure carrying the status. A JSON body becomes a server
/// failure with both the raw and the parsed body attached.
fn error_from_status(status: u16, body: String) -> Error {
    match serde_json::from_str::<Value>(&body) {
        Ok(detail) => Error::new(ErrorKind::Server)
            .with_message("server reported an error")
            .with_status(status)
            .with_body(body)
            .with_detail(detail),
        Err(err) => Error::new(ErrorKind::Decode)
            .with_message("response body is not valid json")
            .with_status(status)
            .with_body(body)
            .with_source(err),
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must use http or https"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Pushing through `path_segments_mut` percent-encodes each segment, which is
/// what keeps URL-unsafe database ids and event names safe in paths.
fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("base url cannot be a base"))?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}
