//! HTTP transport to the engine API
//!
//! The daemon listens either on a unix socket or on a TCP address (plain or
//! TLS). [`Transport`] is the seam the rest of the crate talks to, so tests
//! can swap in an in-memory implementation.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HOST};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use std::path::PathBuf;
use tracing::debug;

use crate::constants::api::SOCKET_AUTHORITY;
use crate::error::{ClientError, Result};


/// A request to the daemon, relative to its API root
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Look up a header value, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully-read response; the connection is released once the body is read
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Sends requests to the daemon
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse>;
}

enum Endpoint {
    Unix(PathBuf),
    Http {
        base: String,
        client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    },
}

/// Transport backed by hyper
pub struct HyperTransport {
    endpoint: Endpoint,
}

impl HyperTransport {
    /// Create a transport for a daemon host such as `unix:///var/run/docker.sock`,
    /// `tcp://10.0.0.5:2375` or `https://swarm.example.com:2376`.
    pub fn new(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ClientError::InvalidHost(host.to_string()));
            }
            return Ok(Self {
                endpoint: Endpoint::Unix(PathBuf::from(path)),
            });
        }

        let base = if let Some(address) = host.strip_prefix("tcp://") {
            format!("http://{}", address)
        } else if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            return Err(ClientError::InvalidHost(host.to_string()));
        };
        let base = base.trim_end_matches('/').to_string();

        let uri: Uri = base
            .parse()
            .map_err(|_| ClientError::InvalidHost(host.to_string()))?;
        if uri.authority().is_none() {
            return Err(ClientError::InvalidHost(host.to_string()));
        }

        let client = HyperClient::builder(TokioExecutor::new()).build(HttpsConnector::new());
        Ok(Self {
            endpoint: Endpoint::Http { base, client },
        })
    }

    fn build_request(
        uri: String,
        authority: Option<&str>,
        request: ApiRequest,
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(authority) = authority {
            builder = builder.header(HOST, authority);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = request.body.unwrap_or_default();
        Ok(builder.body(Full::new(body))?)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        debug!("{} {}", request.method, request.path);

        let response = match &self.endpoint {
            Endpoint::Unix(path) => {
                let uri = request.path.clone();
                let request = Self::build_request(uri, Some(SOCKET_AUTHORITY), request)?;
                send_unix(path, request).await?
            }
            Endpoint::Http { base, client } => {
                let uri = format!("{}{}", base, request.path);
                let request = Self::build_request(uri, None, request)?;
                client.request(request).await?
            }
        };

        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        debug!("Daemon responded {} ({} bytes)", parts.status, body.len());

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// One HTTP/1 connection per request over the daemon socket
#[cfg(unix)]
async fn send_unix(
    path: &std::path::Path,
    request: Request<Full<Bytes>>,
) -> Result<Response<Incoming>> {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path).await?;
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("Daemon connection closed: {}", e);
        }
    });

    Ok(sender.send_request(request).await?)
}

#[cfg(not(unix))]
async fn send_unix(
    path: &std::path::Path,
    _request: Request<Full<Bytes>>,
) -> Result<Response<Incoming>> {
    Err(ClientError::InvalidHost(format!("unix://{}", path.display())))
}
