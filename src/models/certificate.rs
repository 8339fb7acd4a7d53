//! Certificate status models for the Puppet CA

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Certificate state as reported by the CA
///
/// The CA owns this value. The client only observes it and asks for
/// transitions through sign/revoke/delete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    /// No certificate material known to the CA
    Absent,
    /// CSR submitted, the CA has not decided yet
    Requested,
    /// Alternate spelling some CA versions use for `Requested`
    Pending,
    /// Certificate is signed and valid
    Signed,
    /// Certificate has been revoked
    Revoked,
}

impl CertificateState {
    /// `Requested` and `Pending` are the same condition under two names
    pub fn is_awaiting_signature(self) -> bool {
        matches!(self, CertificateState::Requested | CertificateState::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CertificateState::Absent => "absent",
            CertificateState::Requested => "requested",
            CertificateState::Pending => "pending",
            CertificateState::Signed => "signed",
            CertificateState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certificate status entry from `/puppet-ca/v1/certificate_status/<certname>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateRecord {
    /// Node certname (CN)
    #[serde(default)]
    pub name: String,
    /// Certificate state
    pub state: CertificateState,
    /// Default fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Fingerprints keyed by digest name (`SHA1`, `SHA256`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fingerprints: BTreeMap<String, String>,
    /// DNS alternative names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_alt_names: Option<Vec<String>>,
    /// Serial number assigned by the CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<serde_json::Number>,
    /// Not valid before, in the CA's own timestamp format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    /// Not valid after, in the CA's own timestamp format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    /// Every other field the CA returned, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CertificateRecord {
    /// Parse a status body
    ///
    /// A body without `state`, or with a state this client does not know, is a
    /// malformed response rather than a "not found".
    pub fn from_json(certname: &str, body: serde_json::Value) -> AppResult<Self> {
        let object = body.as_object().ok_or_else(|| {
            AppError::MalformedResponse(format!(
                "certificate status for {} is not a JSON object",
                certname
            ))
        })?;

        if !object.contains_key("state") {
            return Err(AppError::MalformedResponse(format!(
                "certificate status for {} has no state field",
                certname
            )));
        }

        serde_json::from_value(body).map_err(|e| {
            AppError::MalformedResponse(format!(
                "certificate status for {} could not be parsed: {}",
                certname, e
            ))
        })
    }

    /// SHA-256 fingerprint, preferring the explicit digest map
    pub fn sha256_fingerprint(&self) -> Option<&str> {
        self.fingerprints
            .get("SHA256")
            .or(self.fingerprint.as_ref())
            .map(String::as_str)
    }
}

/// Result of a status lookup
///
/// `NotFound` is the "no such node" sentinel. It is distinct both from a
/// record whose state is `absent` and from a transport failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificateStatus {
    NotFound,
    Found(CertificateRecord),
}

impl CertificateStatus {
    pub fn state(&self) -> Option<CertificateState> {
        match self {
            CertificateStatus::NotFound => None,
            CertificateStatus::Found(record) => Some(record.state),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CertificateStatus::NotFound)
    }

    pub fn record(&self) -> Option<&CertificateRecord> {
        match self {
            CertificateStatus::NotFound => None,
            CertificateStatus::Found(record) => Some(record),
        }
    }
}

/// Human-readable description of an observed state (`None` meaning not found)
pub fn describe_state(state: Option<CertificateState>) -> &'static str {
    state.map(CertificateState::as_str).unwrap_or("not found")
}

/// Normalize a fingerprint for comparison (`AB:cd:01` and `abcd01` are equal)
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
