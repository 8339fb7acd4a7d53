//! PuppetDB client service
//!
//! Only the two interactions needed to retire a node are covered: the node
//! query endpoint and the `deactivate node` command.

use std::error::Error as StdError;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info};

use crate::config::{AppConfig, TlsSettings};
use crate::models::{CommandAck, DeactivateNodeCommand, InventoryRecord, InventoryStatus};
use crate::services::http::{build_client, path_segment};
use crate::services::transport::InventoryTransport;
use crate::utils::error::{AppError, AppResult};

/// PuppetDB API client
#[derive(Clone)]
pub struct PuppetDbClient {
    client: Client,
    base_url: String,
}

impl PuppetDbClient {
    pub fn new(base_url: &str, tls: &TlsSettings) -> AppResult<Self> {
        Ok(Self {
            client: build_client("PuppetDB", tls)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for the configured `puppetdb` section, if there is one
    pub fn from_config(config: &AppConfig) -> AppResult<Option<Self>> {
        match (&config.puppetdb, config.puppetdb_tls_settings()) {
            (Some(db), Some(tls)) => Ok(Some(Self::new(&db.base_url(), &tls)?)),
            _ => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Log the cause chain of a failed request before it becomes a transport error
fn log_send_error(url: &str, e: &reqwest::Error) {
    error!("PuppetDB ERROR: HTTP request failed to {}: {}", url, e);
    if e.is_connect() {
        error!("PuppetDB ERROR: Connection failed. Check the PuppetDB host, port and firewall");
    }
    if e.is_timeout() {
        error!("PuppetDB ERROR: Request timed out. Consider increasing puppetdb.timeout_secs");
    }

    let mut current: Option<&dyn StdError> = e.source();
    while let Some(cause) = current {
        error!("PuppetDB ERROR: Caused by: {}", cause);
        current = cause.source();
    }
}

/// Pull the `error` field out of a PuppetDB error body
fn error_text(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(String::from)
}

#[async_trait]
impl InventoryTransport for PuppetDbClient {
    async fn get_node_status(&self, certname: &str) -> AppResult<InventoryStatus> {
        let url = format!("{}/pdb/query/v4/nodes/{}", self.base_url, path_segment(certname));
        debug!("PuppetDB: Sending GET request to {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            log_send_error(&url, &e);
            AppError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let record: InventoryRecord = serde_json::from_str(&body)?;
            return Ok(InventoryStatus::Found(record));
        }

        match error_text(&body) {
            Some(error) => Ok(InventoryStatus::Missing { error }),
            None if status == StatusCode::NOT_FOUND => Ok(InventoryStatus::Missing {
                error: format!("No information is known about node {}", certname),
            }),
            None => Err(AppError::Transport(format!(
                "PuppetDB returned status {}: {}",
                status, body
            ))),
        }
    }

    async fn deactivate_node(&self, certname: &str) -> AppResult<CommandAck> {
        let url = format!("{}/pdb/cmd/v1", self.base_url);
        let command = DeactivateNodeCommand::new(certname);
        debug!(
            "PuppetDB: deactivating {} (producer_timestamp={})",
            certname, command.payload.producer_timestamp
        );

        let response = self
            .client
            .post(&url)
            .json(&command)
            .send()
            .await
            .map_err(|e| {
                log_send_error(&url, &e);
                AppError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Transport(format!(
                "PuppetDB rejected deactivate command for {}: {} - {}",
                certname, status, body
            )));
        }

        let ack: CommandAck = serde_json::from_str(&body)?;
        info!("PuppetDB accepted deactivation of {} (uuid {})", certname, ack.uuid);
        Ok(ack)
    }
}
