//! API client for the tether-server daemon.
//!
//! Used for operations that must run inside the daemon's lifecycle
//! manager (sweeps, reclaims) and for health reporting.

use anyhow::{Context, Result};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use tether_core::SweepReport;

use crate::config::Config;
use crate::error::TetherError;

/// API client for tether-server.
pub struct ServerClient {
    client: Client,
    base_url: String,
}

impl ServerClient {
    /// Create a new client from config.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.server_url.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response> {
        let response = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TetherError::ServerUnreachable {
                    url: self.base_url.clone(),
                }
                .into()
            } else {
                anyhow::Error::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TetherError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }

    /// Daemon health.
    pub async fn health(&self) -> Result<Health> {
        let response = self.send(self.request(Method::GET, "/health")).await?;
        Ok(response.json().await?)
    }

    /// Run a sweep pass now.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let response = self.send(self.request(Method::POST, "/api/sweep")).await?;
        Ok(response.json().await?)
    }

    /// Reclaim a template's companion if empty. Returns the raw outcome.
    pub async fn reclaim(&self, template_id: &str) -> Result<serde_json::Value> {
        let path = format!("/api/templates/{}/reclaim", template_id);
        let response = self.send(self.request(Method::POST, &path)).await?;
        Ok(response.json().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub sweeper: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthMetrics {
    pub active_mappings: usize,
    pub archived_mappings: usize,
    pub registered_templates: usize,
    pub last_sweep_at: Option<i64>,
}
