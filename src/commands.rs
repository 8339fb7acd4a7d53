//! Command execution
//!
//! Turns a parsed [`Cli`] into calls on the lifecycle and workflow services and
//! renders the result both as text and as JSON. Printing is left to the binary.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use crate::cli::{CertSubcommand, Cli, Command, NodeSubcommand};
use crate::config::AppConfig;
use crate::models::{describe_state, CertificateStatus, InventoryStatus};
use crate::services::workflow::{auth_conf_snippet, signing_instructions};
use crate::services::{
    CertificateLifecycle, DecommissionReport, EnrollReport, InstallOutcome, InventoryTransport,
    PuppetCAService, PuppetDbClient, Reconciliation, RsaCryptoProvider, TransitionOutcome,
    Workflow, WriteOutcome,
};
use crate::utils::error::{AppError, AppResult};

/// Process exit status of a command that did not hit a hard error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Declined, not ready, or refused by the CA
    Declined,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Declined => 2,
        }
    }
}

/// Exit code for a hard error
pub const ERROR_EXIT_CODE: i32 = 1;

/// Rendered result of one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub text: String,
    pub json: serde_json::Value,
}

impl CommandOutput {
    fn new(status: ExitStatus, text: String, value: impl Serialize) -> AppResult<Self> {
        Ok(Self {
            status,
            text,
            json: serde_json::to_value(value)?,
        })
    }
}

type Lifecycle = CertificateLifecycle<PuppetCAService, RsaCryptoProvider>;

fn write_outcome(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Written => "created",
        WriteOutcome::AlreadyPresent => "already present",
    }
}

fn render_status(certname: &str, status: &CertificateStatus) -> String {
    match status.record() {
        None => format!("{}: not found", certname),
        Some(record) => {
            let mut text = format!("{}: {}", certname, record.state);
            if let Some(fp) = record.sha256_fingerprint() {
                let _ = write!(text, "\n  fingerprint: {}", fp);
            }
            if let Some(ref names) = record.dns_alt_names {
                if !names.is_empty() {
                    let _ = write!(text, "\n  alt names: {}", names.join(", "));
                }
            }
            if let Some(ref not_after) = record.not_after {
                let _ = write!(text, "\n  expires: {}", not_after);
            }
            text
        }
    }
}

fn render_enroll(certname: &str, report: &EnrollReport) -> String {
    format!(
        "Submitted certificate request for {}\n  private key: {} ({})\n  csr: {} ({})",
        certname,
        report.private_key_path.display(),
        write_outcome(report.private_key),
        report.csr_path.display(),
        write_outcome(report.csr)
    )
}

fn render_transition(certname: &str, verb: &str, outcome: &TransitionOutcome) -> String {
    match outcome {
        TransitionOutcome::Applied => format!("{}: {}", certname, verb),
        TransitionOutcome::Declined(failure) => format!("{}: {}", certname, failure),
        TransitionOutcome::Refused => format!("{}: the CA refused the request", certname),
    }
}

fn transition_output(
    certname: &str,
    verb: &str,
    outcome: TransitionOutcome,
) -> AppResult<CommandOutput> {
    let status = if outcome.is_applied() {
        ExitStatus::Success
    } else {
        ExitStatus::Declined
    };
    let text = render_transition(certname, verb, &outcome);
    CommandOutput::new(status, text, json!({ "certname": certname, "result": outcome }))
}

async fn enroll(
    lifecycle: &Lifecycle,
    certname: &str,
    alt_names: &[String],
    ssl_dir: &Path,
) -> AppResult<(EnrollReport, String)> {
    let report = lifecycle.enroll(certname, alt_names, ssl_dir).await?;
    let text = render_enroll(certname, &report);
    Ok((report, text))
}

async fn install(lifecycle: &Lifecycle, certname: &str, ssl_dir: &Path) -> AppResult<CommandOutput> {
    let outcome = lifecycle.install(certname, ssl_dir).await?;
    let (status, text) = match &outcome {
        InstallOutcome::Installed {
            certificate,
            ca_certificate,
        } => (
            ExitStatus::Success,
            format!(
                "Installed certificate for {}\n  certificate: {}\n  ca: {}",
                certname,
                certificate.display(),
                ca_certificate.display()
            ),
        ),
        InstallOutcome::NotReady { observed } => (
            ExitStatus::Declined,
            format!(
                "Certificate for {} is {}, not signed yet\n\n{}",
                certname,
                describe_state(*observed),
                signing_instructions(certname)
            ),
        ),
    };
    CommandOutput::new(status, text, json!({ "certname": certname, "result": outcome }))
}

fn render_reconciliation(certname: &str, result: &Reconciliation) -> (ExitStatus, String) {
    match result {
        Reconciliation::InSync { fingerprint } => (
            ExitStatus::Success,
            format!("{}: installed certificate matches the CA ({})", certname, fingerprint),
        ),
        Reconciliation::Mismatch {
            local,
            remote,
            state,
        } => (
            ExitStatus::Declined,
            format!(
                "{}: installed certificate differs from the CA's {} certificate\n  local:  {}\n  remote: {}",
                certname, state, local, remote
            ),
        ),
        Reconciliation::NotInstalled { observed } => (
            ExitStatus::Declined,
            format!(
                "{}: no certificate installed (CA state: {})",
                certname,
                describe_state(*observed)
            ),
        ),
        Reconciliation::NoRemoteRecord { local } => (
            ExitStatus::Declined,
            format!(
                "{}: certificate {} is installed but the CA has no fingerprint for it",
                certname, local
            ),
        ),
    }
}

fn render_decommission(report: &DecommissionReport) -> String {
    let mut text = format!("Decommission {}", report.certname);
    for step in &report.steps {
        let _ = write!(
            text,
            "\n  {}: {}",
            step.operation,
            render_transition(&report.certname, "done", &step.outcome)
        );
    }
    match report.deactivation {
        Some(ref ack) => {
            let _ = write!(text, "\n  deactivated in PuppetDB (command {})", ack.uuid);
        }
        None if report.completed => text.push_str("\n  PuppetDB not configured, node left active"),
        None => text.push_str("\n  stopped before deactivation"),
    }
    text
}

fn render_inventory(certname: &str, status: &InventoryStatus) -> String {
    match status {
        InventoryStatus::Found(record) => match record.deactivated {
            Some(at) => format!("{}: deactivated at {}", certname, at.to_rfc3339()),
            None => format!("{}: active", certname),
        },
        InventoryStatus::Missing { error } => format!("{}: {}", certname, error),
    }
}

fn puppetdb(config: &AppConfig) -> AppResult<PuppetDbClient> {
    PuppetDbClient::from_config(config)?
        .ok_or_else(|| AppError::Config("no puppetdb section configured".to_string()))
}

/// Execute one parsed command
pub async fn run(cli: &Cli, config: &AppConfig) -> AppResult<CommandOutput> {
    let ca = PuppetCAService::from_config(config)?;
    let lifecycle = CertificateLifecycle::new(ca, RsaCryptoProvider::default());
    let ssl_dir = config.ssl.effective_ssl_dir();

    match &cli.command {
        Command::Init {
            hostname,
            alt_names,
        } => {
            let (report, text) = enroll(&lifecycle, hostname, alt_names, &ssl_dir).await?;
            let text = format!("{}\n\n{}", text, auth_conf_snippet(hostname));
            CommandOutput::new(ExitStatus::Success, text, report)
        }
        Command::Install { hostname } => install(&lifecycle, hostname, &ssl_dir).await,
        Command::Cert(cert) => match &cert.command {
            CertSubcommand::Generate {
                hostname,
                ssldir,
                alt_names,
            } => {
                let (report, text) = enroll(&lifecycle, hostname, alt_names, ssldir).await?;
                CommandOutput::new(ExitStatus::Success, text, report)
            }
            CertSubcommand::Get { hostname, ssldir } => {
                install(&lifecycle, hostname, ssldir).await
            }
            CertSubcommand::Status { hostname } => {
                let status = lifecycle.check_status(hostname).await?;
                let text = render_status(hostname, &status);
                CommandOutput::new(ExitStatus::Success, text, status)
            }
            CertSubcommand::Sign { hostname } => {
                transition_output(hostname, "signed", lifecycle.sign(hostname).await?)
            }
            CertSubcommand::Revoke { hostname } => {
                transition_output(hostname, "revoked", lifecycle.revoke(hostname).await?)
            }
            CertSubcommand::Delete { hostname } => {
                transition_output(hostname, "deleted", lifecycle.delete(hostname).await?)
            }
            CertSubcommand::Verify { hostname, ssldir } => {
                let dir = ssldir.as_deref().unwrap_or(&ssl_dir);
                let result = lifecycle.reconcile(hostname, dir).await?;
                let (status, text) = render_reconciliation(hostname, &result);
                CommandOutput::new(status, text, result)
            }
        },
        Command::Node(node) => {
            let db = puppetdb(config)?;
            match &node.command {
                NodeSubcommand::Status { hostname } => {
                    let status = db.get_node_status(hostname).await?;
                    let text = render_inventory(hostname, &status);
                    CommandOutput::new(ExitStatus::Success, text, status)
                }
                NodeSubcommand::Deactivate { hostname } => {
                    let ack = db.deactivate_node(hostname).await?;
                    let text = format!("{}: deactivation queued (command {})", hostname, ack.uuid);
                    CommandOutput::new(ExitStatus::Success, text, ack)
                }
            }
        }
        Command::Decommission { hostname } => {
            let workflow = Workflow::new(lifecycle, PuppetDbClient::from_config(config)?);
            let report = workflow.decommission(hostname).await?;
            let status = if report.completed {
                ExitStatus::Success
            } else {
                ExitStatus::Declined
            };
            let text = render_decommission(&report);
            CommandOutput::new(status, text, report)
        }
    }
}
