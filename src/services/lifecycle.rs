//! Certificate lifecycle for a single node
//!
//! The CA is the source of truth. Every operation starts by reading the current
//! certificate status and only then decides whether to act; nothing is cached
//! between calls. The read-then-act window is not guarded: a mutating call that
//! the CA refuses comes back as [`TransitionOutcome::Refused`] and is never
//! retried here.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{
    describe_state, normalize_fingerprint, ArtifactKind, CertificateState, CertificateStatus,
};
use crate::services::crypto::CryptoProvider;
use crate::services::material_store::{
    parse_certificates, LocalMaterialStore, LocalState, WriteOutcome,
};
use crate::services::transport::CaTransport;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::ensure_certname;

/// Certname the CA publishes its own certificate under
pub const CA_CERTNAME: &str = "ca";

/// Guarded lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Install,
    Sign,
    Revoke,
    Delete,
}

impl Operation {
    /// State the CA must report for this operation to proceed
    pub fn required(self) -> &'static str {
        match self {
            Operation::Install | Operation::Revoke => "signed",
            Operation::Sign => "requested or pending",
            Operation::Delete => "revoked",
        }
    }

    fn permits(self, state: Option<CertificateState>) -> bool {
        match (self, state) {
            (Operation::Install | Operation::Revoke, Some(CertificateState::Signed)) => true,
            (Operation::Sign, Some(s)) => s.is_awaiting_signature(),
            (Operation::Delete, Some(CertificateState::Revoked)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Install => "install",
            Operation::Sign => "sign",
            Operation::Revoke => "revoke",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// An operation attempted from the wrong state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreconditionFailure {
    pub operation: Operation,
    /// `None` when the CA has no record of the node
    pub observed: Option<CertificateState>,
}

impl fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {}: certificate is {} (requires {})",
            self.operation,
            describe_state(self.observed),
            self.operation.required()
        )
    }
}

/// Result of sign, revoke and delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The CA accepted the request
    Applied,
    /// Not attempted: the observed state does not allow it
    Declined(PreconditionFailure),
    /// Attempted, and the CA answered with a non-success status
    Refused,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// What `enroll` did locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollReport {
    pub private_key: WriteOutcome,
    pub csr: WriteOutcome,
    pub private_key_path: PathBuf,
    pub csr_path: PathBuf,
    /// CA state seen before submitting
    pub observed: Option<CertificateState>,
}

/// Result of `install`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed {
        certificate: PathBuf,
        ca_certificate: PathBuf,
    },
    /// Not signed yet; poll again later
    NotReady { observed: Option<CertificateState> },
}

/// Local certificate compared with the CA's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Reconciliation {
    InSync {
        fingerprint: String,
    },
    Mismatch {
        local: String,
        remote: String,
        state: CertificateState,
    },
    /// No certificate installed locally
    NotInstalled { observed: Option<CertificateState> },
    /// Installed locally but the CA has no record (or no fingerprint) for it
    NoRemoteRecord { local: String },
}

/// Lifecycle operations against one CA
pub struct CertificateLifecycle<C, K> {
    ca: C,
    crypto: K,
}

impl<C: CaTransport, K: CryptoProvider> CertificateLifecycle<C, K> {
    pub fn new(ca: C, crypto: K) -> Self {
        Self { ca, crypto }
    }

    /// Current CA status, `NotFound` when the CA has no record
    pub async fn check_status(&self, certname: &str) -> AppResult<CertificateStatus> {
        ensure_certname(certname)?;
        self.ca.get_certificate_status(certname).await
    }

    /// Create the key and CSR if missing, then submit the CSR
    ///
    /// Existing non-empty files are reused as they are. The CSR that gets
    /// submitted is always the one read back from disk.
    pub async fn enroll(
        &self,
        certname: &str,
        alt_names: &[String],
        base_dir: &Path,
    ) -> AppResult<EnrollReport> {
        let observed = self.check_status(certname).await?.state();
        debug!(
            "Enrolling {} (CA state: {})",
            certname,
            describe_state(observed)
        );

        let store = LocalMaterialStore::new(base_dir);

        let private_key_path = store.path_for(ArtifactKind::PrivateKey, certname)?;
        let private_key = if store.exists(ArtifactKind::PrivateKey, certname)? {
            WriteOutcome::AlreadyPresent
        } else {
            let pem = self.crypto.generate_private_key()?;
            store.store(ArtifactKind::PrivateKey, certname, &pem)?.1
        };
        let key_pem = store.read(ArtifactKind::PrivateKey, certname)?;

        let csr_path = store.path_for(ArtifactKind::CertificateRequest, certname)?;
        let csr = if store.exists(ArtifactKind::CertificateRequest, certname)? {
            WriteOutcome::AlreadyPresent
        } else {
            let pem = self.crypto.generate_csr(&key_pem, certname, alt_names)?;
            store.store(ArtifactKind::CertificateRequest, certname, &pem)?.1
        };
        let csr_pem = store.read(ArtifactKind::CertificateRequest, certname)?;

        if !self.ca.submit_csr(certname, &csr_pem).await? {
            return Err(AppError::Enrollment(format!(
                "CA rejected the certificate request for {}",
                certname
            )));
        }
        info!("Submitted certificate request for {}", certname);

        Ok(EnrollReport {
            private_key,
            csr,
            private_key_path,
            csr_path,
            observed,
        })
    }

    /// Download and store the signed certificate and the CA certificate
    pub async fn install(&self, certname: &str, base_dir: &Path) -> AppResult<InstallOutcome> {
        let observed = self.check_status(certname).await?.state();
        if !Operation::Install.permits(observed) {
            info!(
                "Certificate for {} is {}, nothing to install yet",
                certname,
                describe_state(observed)
            );
            return Ok(InstallOutcome::NotReady { observed });
        }

        let ca_pem = self.ca.get_certificate(CA_CERTNAME).await?;
        parse_certificates(&ca_pem).map_err(|e| {
            AppError::MalformedResponse(format!("CA certificate download: {}", e))
        })?;
        let node_pem = self.ca.get_certificate(certname).await?;
        parse_certificates(&node_pem).map_err(|e| {
            AppError::MalformedResponse(format!("certificate download for {}: {}", certname, e))
        })?;

        let store = LocalMaterialStore::new(base_dir);
        let (ca_certificate, _) = store.store(ArtifactKind::Certificate, CA_CERTNAME, &ca_pem)?;
        let (certificate, _) = store.store(ArtifactKind::Certificate, certname, &node_pem)?;

        // The CA answers with free text either way; it is logged, not judged.
        match self.ca.delete_csr(certname).await {
            Ok(body) => debug!("Delete remote CSR for {}: {}", certname, body.trim()),
            Err(e) => warn!("Could not remove certificate request for {}: {}", certname, e),
        }

        info!("Installed certificate for {} at {}", certname, certificate.display());
        Ok(InstallOutcome::Installed {
            certificate,
            ca_certificate,
        })
    }

    async fn transition<F, Fut>(
        &self,
        operation: Operation,
        certname: &str,
        apply: F,
    ) -> AppResult<TransitionOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<bool>>,
    {
        let observed = self.check_status(certname).await?.state();
        if !operation.permits(observed) {
            let failure = PreconditionFailure {
                operation,
                observed,
            };
            info!("Declined for {}: {}", certname, failure);
            return Ok(TransitionOutcome::Declined(failure));
        }

        if apply().await? {
            info!("{} applied for {}", operation, certname);
            Ok(TransitionOutcome::Applied)
        } else {
            warn!("CA refused {} for {}", operation, certname);
            Ok(TransitionOutcome::Refused)
        }
    }

    /// Sign a pending request; anything else is declined without calling the CA
    pub async fn sign(&self, certname: &str) -> AppResult<TransitionOutcome> {
        self.transition(Operation::Sign, certname, || self.ca.sign(certname))
            .await
    }

    pub async fn revoke(&self, certname: &str) -> AppResult<TransitionOutcome> {
        self.transition(Operation::Revoke, certname, || self.ca.revoke(certname))
            .await
    }

    /// Remove the CA's record; only a revoked certificate can be deleted
    pub async fn delete(&self, certname: &str) -> AppResult<TransitionOutcome> {
        self.transition(Operation::Delete, certname, || self.ca.delete(certname))
            .await
    }

    /// Which artifacts exist locally
    pub fn local_state(&self, certname: &str, base_dir: &Path) -> AppResult<LocalState> {
        LocalMaterialStore::new(base_dir).inspect(certname)
    }

    /// Compare the installed certificate with the CA's record
    pub async fn reconcile(&self, certname: &str, base_dir: &Path) -> AppResult<Reconciliation> {
        let status = self.check_status(certname).await?;
        let local = self.local_state(certname, base_dir)?;

        let Some(local_fp) = local.certificate_fingerprint else {
            return Ok(Reconciliation::NotInstalled {
                observed: status.state(),
            });
        };

        let Some(record) = status.record() else {
            return Ok(Reconciliation::NoRemoteRecord { local: local_fp });
        };
        let Some(remote_fp) = record.sha256_fingerprint() else {
            return Ok(Reconciliation::NoRemoteRecord { local: local_fp });
        };

        if normalize_fingerprint(&local_fp) == normalize_fingerprint(remote_fp) {
            Ok(Reconciliation::InSync {
                fingerprint: local_fp,
            })
        } else {
            Ok(Reconciliation::Mismatch {
                local: local_fp,
                remote: remote_fp.to_string(),
                state: record.state,
            })
        }
    }
}
