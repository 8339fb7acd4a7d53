//! Local SSL material store
//!
//! Keeps the Puppet agent layout under a base directory:
//!
//! ```text
//! <base>/private_keys/<certname>.pem
//! <base>/certificate_request/<certname>.pem
//! <base>/certs/<certname>.pem
//! ```
//!
//! Files are write-once. A non-empty file is never overwritten; an empty one
//! counts as absent.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::models::ArtifactKind;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::ensure_certname;

/// What `write_if_absent` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    AlreadyPresent,
}

/// Path of an artifact under `base_dir`
pub fn path_for(kind: ArtifactKind, certname: &str, base_dir: &Path) -> AppResult<PathBuf> {
    ensure_certname(certname)?;
    Ok(kind.path_for(certname, base_dir))
}

/// Present means: exists and is non-empty
fn is_present(path: &Path) -> AppResult<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::io(path, e)),
    }
}

/// Write `bytes` to `path` unless a non-empty file is already there
///
/// The write goes through a temporary file in the same directory and is
/// renamed into place, so readers never see a partial file. Private keys are
/// created with mode 0600, certificates and requests with 0644.
pub fn write_if_absent(kind: ArtifactKind, path: &Path, bytes: &[u8]) -> AppResult<WriteOutcome> {
    if !kind.matches_path(path) {
        return Err(AppError::UnknownArtifactKind(format!(
            "{} does not belong in a {} directory",
            path.display(),
            kind.dir_name()
        )));
    }

    let exists_empty = match fs::metadata(path) {
        Ok(metadata) if metadata.len() > 0 => {
            debug!("{} already present at {}", kind, path.display());
            return Ok(WriteOutcome::AlreadyPresent);
        }
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(AppError::io(path, e)),
    };

    let parent = path
        .parent()
        .ok_or_else(|| AppError::io(path, io::Error::other("artifact path has no parent")))?;
    fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| AppError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| AppError::io(tmp.path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Temp files start out 0600; only keys stay that way.
        let mode = match kind {
            ArtifactKind::PrivateKey => 0o600,
            ArtifactKind::CertificateRequest | ArtifactKind::Certificate => 0o644,
        };
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
            .map_err(|e| AppError::io(tmp.path(), e))?;
    }

    let persisted = if exists_empty {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };

    match persisted {
        Ok(_) => {
            info!("Wrote {} to {}", kind, path.display());
            Ok(WriteOutcome::Written)
        }
        // Someone else won the race; theirs stays.
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(WriteOutcome::AlreadyPresent)
        }
        Err(e) => Err(AppError::io(path, e.error)),
    }
}

/// Presence of each artifact for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalState {
    pub certname: String,
    pub private_key: bool,
    pub certificate_request: bool,
    pub certificate: bool,
    /// SHA-256 of the installed certificate, colon separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_fingerprint: Option<String>,
}

/// Artifact store rooted at an SSL directory
#[derive(Debug, Clone)]
pub struct LocalMaterialStore {
    base_dir: PathBuf,
}

impl LocalMaterialStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path_for(&self, kind: ArtifactKind, certname: &str) -> AppResult<PathBuf> {
        path_for(kind, certname, &self.base_dir)
    }

    pub fn exists(&self, kind: ArtifactKind, certname: &str) -> AppResult<bool> {
        is_present(&self.path_for(kind, certname)?)
    }

    pub fn read(&self, kind: ArtifactKind, certname: &str) -> AppResult<String> {
        let path = self.path_for(kind, certname)?;
        fs::read_to_string(&path).map_err(|e| AppError::io(&path, e))
    }

    /// Write an artifact for `certname`, returning where it lives
    pub fn store(
        &self,
        kind: ArtifactKind,
        certname: &str,
        pem: &str,
    ) -> AppResult<(PathBuf, WriteOutcome)> {
        let path = self.path_for(kind, certname)?;
        let outcome = write_if_absent(kind, &path, pem.as_bytes())?;
        Ok((path, outcome))
    }

    /// Which artifacts exist for `certname`
    pub fn inspect(&self, certname: &str) -> AppResult<LocalState> {
        let certificate = self.exists(ArtifactKind::Certificate, certname)?;
        let certificate_fingerprint = if certificate {
            let pem = self.read(ArtifactKind::Certificate, certname)?;
            Some(certificate_fingerprint(&pem)?)
        } else {
            None
        };

        Ok(LocalState {
            certname: certname.to_string(),
            private_key: self.exists(ArtifactKind::PrivateKey, certname)?,
            certificate_request: self.exists(ArtifactKind::CertificateRequest, certname)?,
            certificate,
            certificate_fingerprint,
        })
    }
}

/// DER certificates contained in a PEM text
///
/// Fails unless at least one CERTIFICATE block parses.
pub fn parse_certificates(pem: &str) -> AppResult<Vec<Vec<u8>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .map(|der| der.map(|d| d.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::MalformedResponse(format!("invalid PEM: {}", e)))?;

    if certs.is_empty() {
        return Err(AppError::MalformedResponse(
            "no CERTIFICATE block found".to_string(),
        ));
    }
    Ok(certs)
}

/// `AA:BB:...` SHA-256 of the first certificate in `pem`
pub fn certificate_fingerprint(pem: &str) -> AppResult<String> {
    let certs = parse_certificates(pem)?;
    let digest = Sha256::digest(&certs[0]);
    let hex = hex::encode_upper(digest);
    let pairs: Vec<&str> = hex
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .collect();
    Ok(pairs.join(":"))
}
