//! Puppet CA service for certificate management

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::{AppConfig, TlsSettings};
use crate::models::{CertificateRecord, CertificateStatus};
use crate::services::http::{build_client, path_segment};
use crate::services::transport::CaTransport;
use crate::utils::error::AppResult;

const API_PREFIX: &str = "/puppet-ca/v1";

/// Puppet CA client speaking the `puppet-ca/v1` HTTP API
#[derive(Clone)]
pub struct PuppetCAService {
    client: Client,
    base_url: String,
}

impl PuppetCAService {
    /// Create a client for `base_url` (scheme, host and port)
    pub fn new(base_url: &str, tls: &TlsSettings) -> AppResult<Self> {
        Ok(Self {
            client: build_client("Puppet CA", tls)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create the client described by the loaded configuration
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let tls = config.ssl.tls_settings(config.ca_server.timeout_secs);
        Self::new(&config.ca_server.base_url(), &tls)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str, certname: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.base_url,
            API_PREFIX,
            endpoint,
            path_segment(certname)
        )
    }

    async fn put_desired_state(&self, certname: &str, desired_state: &str) -> AppResult<bool> {
        let url = self.url("certificate_status", certname);
        let body = serde_json::json!({ "desired_state": desired_state });

        let response = self.client.put(&url).json(&body).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            status => {
                let text = response.text().await.unwrap_or_default();
                warn!(
                    "CA refused desired_state={} for {}: {} - {}",
                    desired_state, certname, status, text
                );
                Ok(false)
            }
        }
    }

    async fn get_text(&self, endpoint: &str, certname: &str) -> AppResult<String> {
        let url = self.url(endpoint, certname);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/plain")
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            debug!("GET {} returned {}", url, status);
        }
        Ok(text)
    }
}

#[async_trait]
impl CaTransport for PuppetCAService {
    async fn get_certificate_status(&self, certname: &str) -> AppResult<CertificateStatus> {
        let url = self.url("certificate_status", certname);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let text = response.text().await?;
                let body: serde_json::Value = serde_json::from_str(&text)?;
                Ok(CertificateStatus::Found(CertificateRecord::from_json(
                    certname, body,
                )?))
            }
            status => {
                debug!("No certificate status for {} ({})", certname, status);
                Ok(CertificateStatus::NotFound)
            }
        }
    }

    async fn submit_csr(&self, certname: &str, csr_pem: &str) -> AppResult<bool> {
        let url = self.url("certificate_request", certname);
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "text/plain")
            .body(csr_pem.to_string())
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            status => {
                let text = response.text().await.unwrap_or_default();
                warn!("CA rejected CSR for {}: {} - {}", certname, status, text);
                Ok(false)
            }
        }
    }

    async fn get_csr(&self, certname: &str) -> AppResult<String> {
        self.get_text("certificate_request", certname).await
    }

    async fn delete_csr(&self, certname: &str) -> AppResult<String> {
        let url = self.url("certificate_request", certname);
        let response = self
            .client
            .delete(&url)
            .header(ACCEPT, "text/plain")
            .send()
            .await?;
        Ok(response.text().await?)
    }

    async fn get_certificate(&self, certname: &str) -> AppResult<String> {
        self.get_text("certificate", certname).await
    }

    async fn sign(&self, certname: &str) -> AppResult<bool> {
        self.put_desired_state(certname, "signed").await
    }

    async fn revoke(&self, certname: &str) -> AppResult<bool> {
        self.put_desired_state(certname, "revoked").await
    }

    async fn delete(&self, certname: &str) -> AppResult<bool> {
        let url = self.url("certificate_status", certname);
        let response = self.client.delete(&url).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(true),
            status => {
                let text = response.text().await.unwrap_or_default();
                warn!("CA refused to delete {}: {} - {}", certname, status, text);
                Ok(false)
            }
        }
    }
}
