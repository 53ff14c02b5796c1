//! HTTP client for the per-pod Galera agent
//!
//! Every MariaDB pod runs an agent sidecar exposing a small REST API on port
//! 5555. The operator uses it to read `grastate.dat`, to run the node in
//! recovery mode and to make a node bootstrap a new cluster.
//!
//! | Operation          | Request                  |
//! |--------------------|--------------------------|
//! | Galera state       | `GET /api/galerastate`   |
//! | Enable recovery    | `PUT /api/recovery`      |
//! | Start recovery     | `POST /api/recovery`     |
//! | Disable recovery   | `DELETE /api/recovery`   |
//! | Enable bootstrap   | `PUT /api/bootstrap`     |
//!
//! Pods are addressed through the headless internal Service, so the operator
//! must run inside the cluster network.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::controller::error::Result;
use crate::crd::{GaleraCluster, NodeState, RecoveredBootstrap};
use crate::resources::AgentClientSet;
use crate::resources::common::internal_service_name;

/// Agent REST API port
pub const AGENT_PORT: u16 = 5555;

/// Overall timeout for a single agent request (connect + request + response)
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by the agent client
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Connection to agent at {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Agent responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid agent response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Agent request timed out")]
    Timeout,
}

/// Position a node must bootstrap from
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    pub uuid: String,
    pub seqno: i64,
}

/// Agent clients for every pod of a cluster
#[derive(Clone, Debug)]
pub struct HttpAgentClientSet {
    namespace: String,
    service: String,
    port: u16,
    timeout: Duration,
}

impl HttpAgentClientSet {
    /// Create a client set addressing the pods of `cluster`
    pub fn new(cluster: &GaleraCluster) -> Self {
        Self {
            namespace: cluster.namespace().unwrap_or_else(|| "default".to_string()),
            service: internal_service_name(cluster),
            port: AGENT_PORT,
            timeout: AGENT_TIMEOUT,
        }
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stable DNS name of a pod behind the headless Service
    pub fn host(&self, pod: &str) -> String {
        format!(
            "{}.{}.{}.svc.cluster.local",
            pod, self.service, self.namespace
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        pod: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> std::result::Result<T, AgentError> {
        let bytes = self.send(pod, method, path, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            debug!(
                pod = pod,
                path = path,
                response = %String::from_utf8_lossy(&bytes),
                error = %e,
                "Failed to parse agent response"
            );
            AgentError::Json(e)
        })
    }

    async fn send(
        &self,
        pod: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> std::result::Result<Bytes, AgentError> {
        timeout(self.timeout, self.send_once(pod, method, path, body))
            .await
            .map_err(|_| AgentError::Timeout)?
    }

    async fn send_once(
        &self,
        pod: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> std::result::Result<Bytes, AgentError> {
        let host = self.host(pod);

        let stream = TcpStream::connect((host.as_str(), self.port))
            .await
            .map_err(|e| AgentError::Connection {
                host: host.clone(),
                message: e.to_string(),
            })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        // The connection must be driven while the body is read
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Agent connection closed: {}", e);
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header("Host", format!("{}:{}", host, self.port));
        let payload = match body {
            Some(bytes) => {
                builder = builder.header("Content-Type", "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(payload)
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let response = sender
            .send_request(req)
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;
        let status = response.status();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?
            .to_bytes();

        trace!(pod = pod, %method, path = path, status = status.as_u16(), "Agent response");

        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        Ok(body)
    }
}

impl AgentClientSet for HttpAgentClientSet {
    async fn node_state(&self, pod: &str) -> Result<NodeState> {
        Ok(self
            .request(pod, Method::GET, "/api/galerastate", None)
            .await?)
    }

    async fn enable_recovery(&self, pod: &str) -> Result<()> {
        self.send(pod, Method::PUT, "/api/recovery", None).await?;
        Ok(())
    }

    async fn start_recovery(&self, pod: &str) -> Result<RecoveredBootstrap> {
        let bootstrap: Bootstrap = self
            .request(pod, Method::POST, "/api/recovery", None)
            .await?;
        Ok(RecoveredBootstrap {
            uuid: bootstrap.uuid,
            seqno: bootstrap.seqno,
        })
    }

    async fn disable_recovery(&self, pod: &str) -> Result<()> {
        self.send(pod, Method::DELETE, "/api/recovery", None).await?;
        Ok(())
    }

    async fn enable_bootstrap(&self, pod: &str, bootstrap: &Bootstrap) -> Result<()> {
        let body = serde_json::to_vec(bootstrap)?;
        self.send(pod, Method::PUT, "/api/bootstrap", Some(body))
            .await?;
        Ok(())
    }
}
