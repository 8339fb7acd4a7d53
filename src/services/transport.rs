//! Seams between the lifecycle logic and the remote services
//!
//! The lifecycle and workflow code only ever talks to these traits, so tests
//! can drive them with in-memory doubles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{CertificateStatus, CommandAck, InventoryStatus};
use crate::utils::error::AppResult;

/// Puppet CA HTTP API, one method per endpoint interaction
///
/// Boolean results mean "the CA accepted the request". A `false` is a refusal,
/// an `Err` is a transport failure or an unparseable answer.
#[async_trait]
pub trait CaTransport: Send + Sync {
    /// `GET certificate_status/<certname>`
    async fn get_certificate_status(&self, certname: &str) -> AppResult<CertificateStatus>;

    /// `PUT certificate_request/<certname>` with the PEM body
    async fn submit_csr(&self, certname: &str, csr_pem: &str) -> AppResult<bool>;

    /// `GET certificate_request/<certname>`, body returned as-is
    async fn get_csr(&self, certname: &str) -> AppResult<String>;

    /// `DELETE certificate_request/<certname>`, body returned as-is
    async fn delete_csr(&self, certname: &str) -> AppResult<String>;

    /// `GET certificate/<certname>`, body returned as-is (`ca` for the CA itself)
    async fn get_certificate(&self, certname: &str) -> AppResult<String>;

    /// Ask the CA to move the certificate to `signed`
    async fn sign(&self, certname: &str) -> AppResult<bool>;

    /// Ask the CA to move the certificate to `revoked`
    async fn revoke(&self, certname: &str) -> AppResult<bool>;

    /// `DELETE certificate_status/<certname>`
    async fn delete(&self, certname: &str) -> AppResult<bool>;
}

/// PuppetDB inventory API
#[async_trait]
pub trait InventoryTransport: Send + Sync {
    /// `GET /pdb/query/v4/nodes/<certname>`
    async fn get_node_status(&self, certname: &str) -> AppResult<InventoryStatus>;

    /// Submit a `deactivate node` command
    async fn deactivate_node(&self, certname: &str) -> AppResult<CommandAck>;
}

#[async_trait]
impl<T: CaTransport + ?Sized> CaTransport for Arc<T> {
    async fn get_certificate_status(&self, certname: &str) -> AppResult<CertificateStatus> {
        (**self).get_certificate_status(certname).await
    }

    async fn submit_csr(&self, certname: &str, csr_pem: &str) -> AppResult<bool> {
        (**self).submit_csr(certname, csr_pem).await
    }

    async fn get_csr(&self, certname: &str) -> AppResult<String> {
        (**self).get_csr(certname).await
    }

    async fn delete_csr(&self, certname: &str) -> AppResult<String> {
        (**self).delete_csr(certname).await
    }

    async fn get_certificate(&self, certname: &str) -> AppResult<String> {
        (**self).get_certificate(certname).await
    }

    async fn sign(&self, certname: &str) -> AppResult<bool> {
        (**self).sign(certname).await
    }

    async fn revoke(&self, certname: &str) -> AppResult<bool> {
        (**self).revoke(certname).await
    }

    async fn delete(&self, certname: &str) -> AppResult<bool> {
        (**self).delete(certname).await
    }
}

#[async_trait]
impl<T: InventoryTransport + ?Sized> InventoryTransport for Arc<T> {
    async fn get_node_status(&self, certname: &str) -> AppResult<InventoryStatus> {
        (**self).get_node_status(certname).await
    }

    async fn deactivate_node(&self, certname: &str) -> AppResult<CommandAck> {
        (**self).deactivate_node(certname).await
    }
}
