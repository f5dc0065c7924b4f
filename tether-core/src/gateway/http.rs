//! HTTP client for the platform bridge.
//!
//! The bridge is the bot process that owns the platform SDK session; it
//! exposes companion operations as a small JSON API.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tether_core::gateway::{Gateway, HttpGateway};
//!
//! #[tokio::main]
//! async fn main() -> tether_core::Result<()> {
//!     let gateway = HttpGateway::new("http://127.0.0.1:7410")?;
//!     let subscribers = gateway.list_subscribers("event-123").await?;
//!     println!("{} subscribers", subscribers.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use super::{CompanionSnapshot, Gateway, Placement};
use crate::error::{Error, Result};

/// Upper bound for one bridge round trip. The lifecycle layer usually gives
/// up earlier through its own adapter timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway backed by the platform bridge's HTTP API.
#[derive(Clone)]
pub struct HttpGateway {
    /// Base URL of the bridge
    base_url: reqwest::Url,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a client for the bridge at `base_url`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url.as_ref())
            .map_err(|e| Error::Other(format!("Invalid bridge URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Other(format!("Invalid bridge URL: {}", base_url)));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Build `base/<segments...>[?key=value]`, percent-encoding every
    /// segment and query value.
    fn url(&self, segments: &[&str], query: Option<(&str, &str)>) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        url
    }

    async fn send(
        &self,
        op: &'static str,
        method: reqwest::Method,
        url: reqwest::Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        debug!("Bridge request: {} {}", method, url);
        let path = url.path().to_string();

        let mut req = self.client.request(method, url);
        if let Some(ref b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(op, REQUEST_TIMEOUT.as_millis() as u64)
            } else {
                Error::rejected(op, format!("bridge unreachable: {}", e))
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(Error::not_found("Companion", path))
        } else {
            let error_text = resp.text().await.unwrap_or_default();
            Err(Error::rejected(op, format!("{}: {}", status, error_text)))
        }
    }

    async fn json<T: DeserializeOwned>(op: &'static str, resp: reqwest::Response) -> Result<T> {
        resp.json()
            .await
            .map_err(|e| Error::rejected(op, format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn create_companion(
        &self,
        template_id: &str,
        name: &str,
        placement: &Placement,
    ) -> Result<String> {
        let req = CreateCompanionRequest {
            template_id: template_id.to_string(),
            name: name.to_string(),
            kind: placement.kind.as_str().to_string(),
            parent_group_id: placement.parent_group_id.clone(),
        };
        let resp = self
            .send(
                "create_companion",
                reqwest::Method::POST,
                self.url(&["companions"], None),
                Some(serde_json::to_value(&req)?),
            )
            .await?;
        let created: CreateCompanionResponse = Self::json("create_companion", resp).await?;
        Ok(created.id)
    }

    async fn delete_companion(&self, companion_id: &str) -> Result<()> {
        self.send(
            "delete_companion",
            reqwest::Method::DELETE,
            self.url(&["companions", companion_id], None),
            None,
        )
        .await?;
        Ok(())
    }

    async fn fetch_companion(&self, companion_id: &str) -> Result<Option<CompanionSnapshot>> {
        let result = self
            .send(
                "fetch_companion",
                reqwest::Method::GET,
                self.url(&["companions", companion_id], None),
                None,
            )
            .await;
        match result {
            Ok(resp) => Ok(Some(Self::json("fetch_companion", resp).await?)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_companions(
        &self,
        parent_group_id: Option<&str>,
    ) -> Result<Vec<CompanionSnapshot>> {
        let url = self.url(&["companions"], parent_group_id.map(|p| ("parent", p)));
        let resp = self
            .send("list_companions", reqwest::Method::GET, url, None)
            .await?;
        Self::json("list_companions", resp).await
    }

    async fn add_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.send(
            "add_member",
            reqwest::Method::PUT,
            self.url(&["companions", companion_id, "members", identity_id], None),
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.send(
            "remove_member",
            reqwest::Method::DELETE,
            self.url(&["companions", companion_id, "members", identity_id], None),
            None,
        )
        .await?;
        Ok(())
    }

    async fn lock_companion(&self, companion_id: &str, reason: &str) -> Result<()> {
        let req = LockCompanionRequest {
            reason: reason.to_string(),
        };
        self.send(
            "lock_companion",
            reqwest::Method::POST,
            self.url(&["companions", companion_id, "lock"], None),
            Some(serde_json::to_value(&req)?),
        )
        .await?;
        Ok(())
    }

    async fn list_subscribers(&self, template_id: &str) -> Result<BTreeSet<String>> {
        let resp = self
            .send(
                "list_subscribers",
                reqwest::Method::GET,
                self.url(&["templates", template_id, "subscribers"], None),
                None,
            )
            .await?;
        let body: SubscribersResponse = Self::json("list_subscribers", resp).await?;
        Ok(body.subscribers.into_iter().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Create companion request
#[derive(Debug, Serialize)]
pub struct CreateCompanionRequest {
    pub template_id: String,
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<String>,
}

/// Create companion response
#[derive(Debug, Deserialize)]
pub struct CreateCompanionResponse {
    pub id: String,
}

/// Lock companion request
#[derive(Debug, Serialize)]
pub struct LockCompanionRequest {
    pub reason: String,
}

/// Subscriber listing response
#[derive(Debug, Deserialize)]
pub struct SubscribersResponse {
    pub subscribers: Vec<String>,
}
