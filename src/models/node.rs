//! PuppetDB node models

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command name PuppetDB expects for node deactivation
pub const DEACTIVATE_NODE_COMMAND: &str = "deactivate node";

/// Version of the deactivate command payload
pub const DEACTIVATE_NODE_VERSION: u32 = 3;

/// A node as returned by `/pdb/query/v4/nodes/<certname>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryRecord {
    /// Certificate name (unique identifier)
    pub certname: String,

    /// When the node was deactivated, if it was
    #[serde(default)]
    pub deactivated: Option<DateTime<Utc>>,

    /// When the node expired, if it did
    #[serde(default)]
    pub expired: Option<DateTime<Utc>>,

    /// Timestamp of the most recent facts
    #[serde(default)]
    pub facts_timestamp: Option<DateTime<Utc>>,

    /// Timestamp of the most recent report
    #[serde(default)]
    pub report_timestamp: Option<DateTime<Utc>>,

    /// Remaining fields, untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InventoryRecord {
    pub fn is_deactivated(&self) -> bool {
        self.deactivated.is_some()
    }
}

/// Result of a node status query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InventoryStatus {
    Found(InventoryRecord),
    /// PuppetDB knows nothing about the node; carries its error text
    Missing { error: String },
}

impl InventoryStatus {
    pub fn record(&self) -> Option<&InventoryRecord> {
        match self {
            InventoryStatus::Found(record) => Some(record),
            InventoryStatus::Missing { .. } => None,
        }
    }
}

/// Payload of the `deactivate node` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeactivatePayload {
    pub certname: String,
    /// ISO-8601 with the local UTC offset in effect when the command is built
    pub producer_timestamp: String,
}

/// Command envelope POSTed to `/pdb/cmd/v1`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeactivateNodeCommand {
    pub command: String,
    pub version: u32,
    pub payload: DeactivatePayload,
}

impl DeactivateNodeCommand {
    /// Build the command stamped with the current local time
    pub fn new(certname: &str) -> Self {
        Self::at(certname, Local::now())
    }

    /// Build the command for an explicit producer time
    ///
    /// Sub-second precision is dropped; the offset is whatever the local
    /// timezone (DST included) says for that instant.
    pub fn at(certname: &str, produced_at: DateTime<Local>) -> Self {
        Self {
            command: DEACTIVATE_NODE_COMMAND.to_string(),
            version: DEACTIVATE_NODE_VERSION,
            payload: DeactivatePayload {
                certname: certname.to_string(),
                producer_timestamp: produced_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            },
        }
    }
}

/// Acknowledgement returned by PuppetDB for a submitted command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandAck {
    /// Tracking identifier for the queued command
    pub uuid: Uuid,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
