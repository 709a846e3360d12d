//! Minimal HTTP/1 JSON client used for Raft RPCs and cluster joins.
//!
//! One `HttpChannel` per peer keeps a single hyper connection open and
//! reconnects lazily after a failure.

use std::time::Duration;

use bytes::Bytes;
use http::{StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tracing::debug;

/// Transport-level failures talking to a peer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http handshake with {addr}: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: hyper::Error,
    },

    #[error("request {uri}: {source}")]
    Request {
        uri: String,
        #[source]
        source: hyper::Error,
    },

    #[error("build request: {0}")]
    Build(#[from] http::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A lazily connected HTTP/1 channel to one peer.
pub struct HttpChannel {
    addr: String,
    sender: Option<SendRequest<Full<Bytes>>>,
}

impl HttpChannel {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            sender: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Forget the current connection; the next call reconnects.
    pub fn reset(&mut self) {
        self.sender = None;
    }

    async fn connect(&mut self) -> Result<&mut SendRequest<Full<Bytes>>, TransportError> {
        let sender = match self.sender.take() {
            Some(sender) if !sender.is_closed() => sender,
            _ => self.dial().await?,
        };
        Ok(self.sender.insert(sender))
    }

    async fn dial(&self) -> Result<SendRequest<Full<Bytes>>, TransportError> {
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (sender, conn) = http1::handshake(io)
            .await
            .map_err(|source| TransportError::Handshake {
                addr: self.addr.clone(),
                source,
            })?;

        // Drive the connection in the background.
        let addr = self.addr.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(%addr, error = %e, "peer connection closed");
            }
        });

        debug!(addr = %self.addr, "connected to peer");
        Ok(sender)
    }

    /// POST a JSON body and return the status and full response body.
    ///
    /// Any transport failure drops the cached connection.
    pub async fn post_json(
        &mut self,
        path: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<(StatusCode, Bytes), TransportError> {
        let result = tokio::time::timeout(timeout, self.exchange(path, body)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        if outcome.is_err() {
            self.reset();
        }
        outcome
    }

    async fn exchange(
        &mut self,
        path: &str,
        body: Vec<u8>,
    ) -> Result<(StatusCode, Bytes), TransportError> {
        let uri = format!("http://{}{}", self.addr, path);
        let host = self.addr.clone();

        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(&uri)
            .header(header::HOST, host)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "raft3d/0.1")
            .body(Full::new(Bytes::from(body)))?;

        let sender = self.connect().await?;
        sender
            .ready()
            .await
            .map_err(|source| TransportError::Request {
                uri: uri.clone(),
                source,
            })?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|source| TransportError::Request {
                uri: uri.clone(),
                source,
            })?;

        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|source| TransportError::Request { uri, source })?
            .to_bytes();

        Ok((status, bytes))
    }
}

/// One-shot JSON POST on a fresh connection.
pub async fn post_json(
    addr: &str,
    path: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), TransportError> {
    HttpChannel::new(addr).post_json(path, body, timeout).await
}
