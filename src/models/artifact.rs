//! Local SSL artifact kinds and their on-disk layout

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// One of the three PEM files kept per node under the SSL directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PrivateKey,
    CertificateRequest,
    Certificate,
}

impl ArtifactKind {
    /// Directory (relative to the SSL dir) holding artifacts of this kind
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::PrivateKey => "private_keys",
            ArtifactKind::CertificateRequest => "certificate_request",
            ArtifactKind::Certificate => "certs",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::PrivateKey => "private_key",
            ArtifactKind::CertificateRequest => "certificate_request",
            ArtifactKind::Certificate => "certificate",
        }
    }

    /// `<base_dir>/<kind dir>/<certname>.pem`
    pub fn path_for(self, certname: &str, base_dir: &Path) -> PathBuf {
        base_dir
            .join(self.dir_name())
            .join(format!("{}.pem", certname))
    }

    /// Whether `path` sits directly in this kind's directory
    pub fn matches_path(self, path: &Path) -> bool {
        path.parent()
            .and_then(Path::file_name)
            .map(|dir| dir == self.dir_name())
            .unwrap_or(false)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private_key" | "private_keys" => Ok(ArtifactKind::PrivateKey),
            "certificate_request" | "csr" => Ok(ArtifactKind::CertificateRequest),
            "certificate" | "certs" => Ok(ArtifactKind::Certificate),
            other => Err(AppError::UnknownArtifactKind(other.to_string())),
        }
    }
}
