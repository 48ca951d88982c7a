//! HTTP client for the node's tip and network endpoints.
//!
//! Each call opens a fresh HTTP/1 connection, sends a single GET, and
//! decodes the JSON body. The whole exchange (connect, handshake, request,
//! body) is bounded by the deadline passed in by the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use tipwatch_core::{NetworkInfo, TipInfo};

use crate::error::{ClientError, ClientResult};

/// Path of the tip endpoint, relative to the node's base address.
pub const TIP_PATH: &str = "/api/rest/v0/tip";
/// Path of the network endpoint, relative to the node's base address.
pub const NETWORK_PATH: &str = "/api/rest/v0/network";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only view of a node, as needed by the collector.
pub trait NodeApi: Send + Sync {
    /// Fetch the node's current tip.
    fn fetch_tip(&self, deadline: Instant) -> impl Future<Output = ClientResult<TipInfo>> + Send;

    /// Fetch local and network tips.
    fn fetch_network(
        &self,
        deadline: Instant,
    ) -> impl Future<Output = ClientResult<NetworkInfo>> + Send;
}

impl<T: NodeApi> NodeApi for Arc<T> {
    fn fetch_tip(&self, deadline: Instant) -> impl Future<Output = ClientResult<TipInfo>> + Send {
        (**self).fetch_tip(deadline)
    }

    fn fetch_network(
        &self,
        deadline: Instant,
    ) -> impl Future<Output = ClientResult<NetworkInfo>> + Send {
        (**self).fetch_network(deadline)
    }
}

/// Client for a single node's REST API.
#[derive(Debug, Clone)]
pub struct NodeClient {
    /// Base address as configured, without a trailing slash.
    base_url: String,
    /// Value for the `host` header.
    authority: String,
    /// `host:port` to open TCP connections to.
    connect_addr: String,
    /// Path component of the base address, prepended to endpoint paths.
    path_prefix: String,
    /// Timeout used by [`NodeClient::is_healthy`].
    timeout: Duration,
}

impl NodeClient {
    /// Create a client for the node at `base_url` (`http://host:port[/prefix]`).
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let uri = trimmed
            .parse::<Uri>()
            .map_err(|e| ClientError::InvalidUrl(format!("{trimmed}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme {other:?} in {trimmed}"
                )));
            }
            None => {
                return Err(ClientError::InvalidUrl(format!("missing scheme in {trimmed}")));
            }
        }

        let authority = uri
            .authority()
            .ok_or_else(|| ClientError::InvalidUrl(format!("missing host in {trimmed}")))?;
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            base_url: trimmed.to_string(),
            authority: authority.to_string(),
            connect_addr: format!("{}:{port}", authority.host()),
            path_prefix: uri.path().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the timeout used by [`NodeClient::is_healthy`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a tip fetch currently succeeds.
    pub async fn is_healthy(&self) -> bool {
        self.fetch_tip(Instant::now() + self.timeout).await.is_ok()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, deadline: Instant) -> ClientResult<T> {
        match tokio::time::timeout_at(deadline, self.get_json_inner(path)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(base = %self.base_url, %path, "upstream call timed out");
                Err(ClientError::Timeout)
            }
        }
    }

    async fn get_json_inner<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let target = format!("{}{path}", self.path_prefix);

        let stream = TcpStream::connect(&self.connect_addr)
            .await
            .map_err(|e| ClientError::Network(format!("connect {}: {e}", self.connect_addr)))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ClientError::Network(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "upstream connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(&target)
            .header(HOST, &self.authority)
            .header(USER_AGENT, concat!("tipwatch/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ClientError::InvalidUrl(format!("{target}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClientError::Network(format!("request {target}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, %target, "upstream non-2xx");
            return Err(ClientError::BadStatus(status.as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Network(format!("read body {target}: {e}")))?
            .to_bytes();

        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

impl NodeApi for NodeClient {
    async fn fetch_tip(&self, deadline: Instant) -> ClientResult<TipInfo> {
        self.get_json(TIP_PATH, deadline).await
    }

    async fn fetch_network(&self, deadline: Instant) -> ClientResult<NetworkInfo> {
        self.get_json(NETWORK_PATH, deadline).await
    }
}
