//! Multi-step workflows built on the lifecycle and inventory transports

use serde::Serialize;
use tracing::{debug, info};

use crate::models::{CertificateState, CommandAck};
use crate::services::crypto::CryptoProvider;
use crate::services::lifecycle::{
    CertificateLifecycle, Operation, PreconditionFailure, TransitionOutcome,
};
use crate::services::transport::{CaTransport, InventoryTransport};
use crate::utils::error::AppResult;

/// One certificate step taken while decommissioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub operation: Operation,
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecommissionReport {
    pub certname: String,
    pub steps: Vec<StepResult>,
    /// PuppetDB acknowledgement, when an inventory is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation: Option<CommandAck>,
    /// False when a step was declined or refused and the chain stopped
    pub completed: bool,
}

impl DecommissionReport {
    fn new(certname: &str) -> Self {
        Self {
            certname: certname.to_string(),
            steps: Vec::new(),
            deactivation: None,
            completed: false,
        }
    }

    /// Record a step; returns whether the chain may continue
    fn record(&mut self, operation: Operation, outcome: TransitionOutcome) -> bool {
        let applied = outcome.is_applied();
        self.steps.push(StepResult { operation, outcome });
        applied
    }
}

/// Lifecycle plus an optional PuppetDB
pub struct Workflow<C, K, I> {
    lifecycle: CertificateLifecycle<C, K>,
    inventory: Option<I>,
}

impl<C, K, I> Workflow<C, K, I>
where
    C: CaTransport,
    K: CryptoProvider,
    I: InventoryTransport,
{
    pub fn new(lifecycle: CertificateLifecycle<C, K>, inventory: Option<I>) -> Self {
        Self {
            lifecycle,
            inventory,
        }
    }

    pub fn lifecycle(&self) -> &CertificateLifecycle<C, K> {
        &self.lifecycle
    }

    /// Retire a node: revoke if signed, delete if revoked, then deactivate
    ///
    /// A node the CA does not know goes straight to deactivation. A pending
    /// request stops the chain, since there is nothing to revoke yet.
    pub async fn decommission(&self, certname: &str) -> AppResult<DecommissionReport> {
        let mut report = DecommissionReport::new(certname);
        let observed = self.lifecycle.check_status(certname).await?.state();

        match observed {
            None | Some(CertificateState::Absent) => {
                debug!("CA has no certificate for {}", certname);
            }
            Some(CertificateState::Signed) | Some(CertificateState::Revoked) => {
                if observed == Some(CertificateState::Signed) {
                    let outcome = self.lifecycle.revoke(certname).await?;
                    if !report.record(Operation::Revoke, outcome) {
                        return Ok(report);
                    }
                }
                let outcome = self.lifecycle.delete(certname).await?;
                if !report.record(Operation::Delete, outcome) {
                    return Ok(report);
                }
            }
            Some(_) => {
                let failure = PreconditionFailure {
                    operation: Operation::Revoke,
                    observed,
                };
                info!("Not decommissioning {}: {}", certname, failure);
                report.record(Operation::Revoke, TransitionOutcome::Declined(failure));
                return Ok(report);
            }
        }

        if let Some(ref inventory) = self.inventory {
            report.deactivation = Some(inventory.deactivate_node(certname).await?);
        } else {
            debug!("No PuppetDB configured, skipping deactivation of {}", certname);
        }

        report.completed = true;
        Ok(report)
    }
}

/// How to sign the request on the CA host
pub fn signing_instructions(certname: &str) -> String {
    format!(
        r#"Sign:
-----
Go on your puppet CA and sign the CSR for '{certname}'

    puppetserver ca sign --certname {certname}
or, on older servers
    puppet cert sign {certname}
    puppet cert --allow-dns-alt-names sign '{certname}'
"#
    )
}

/// `auth.conf` rule letting `certname` manage certificate_status
pub fn auth_conf_snippet(certname: &str) -> String {
    format!(
        r#"Puppet Server Config:
-----
Add this rule to /etc/puppetlabs/puppetserver/conf.d/auth.conf

authorization: {{
    version: 1
    rules: [
        {{
            "allow": [
                "{certname}"
            ],
            "match-request": {{
                "method": [
                    "delete",
                    "get",
                    "put"
                ],
                "path": "^/puppet-ca/v1/certificate_status/",
                "query-params": {{}},
                "type": "regex"
            }},
            "name": "Puppet CA Admin users",
            "sort-order": 200
        }}
    ]
}}
"#
    )
}
