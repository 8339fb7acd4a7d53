//! Certificate lifecycle against the in-memory CA

use std::fs;

use rstest::rstest;

use openvox_certctl::models::{ArtifactKind, CertificateState};
use openvox_certctl::services::material_store::{path_for, write_if_absent};
use openvox_certctl::services::{
    InstallOutcome, Operation, PreconditionFailure, Reconciliation, TransitionOutcome,
    WriteOutcome,
};
use openvox_certctl::AppError;

use crate::common::{self_signed_pem, Harness};

const NODE: &str = "node02.example.com";

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let h = Harness::new();
    let status = h.lifecycle().check_status("never-enrolled.example.com").await.unwrap();
    assert!(status.is_not_found());
}

#[tokio::test]
async fn test_enroll_submits_csr() {
    let h = Harness::new();
    let report = h
        .lifecycle()
        .enroll(NODE, &["DNS:puppet.example.com".to_string()], h.ssl_dir.path())
        .await
        .unwrap();

    assert_eq!(report.private_key, WriteOutcome::Written);
    assert_eq!(report.csr, WriteOutcome::Written);
    assert_eq!(report.observed, None);
    assert_eq!(h.ca.state_of(NODE), Some(CertificateState::Requested));

    let on_disk = fs::read_to_string(h.ssl_path("certificate_request/node02.example.com.pem")).unwrap();
    assert_eq!(h.ca.csr_of(NODE).as_deref(), Some(on_disk.as_str()));
    assert!(h.ssl_path("private_keys/node02.example.com.pem").exists());
}

#[tokio::test]
async fn test_enroll_is_idempotent() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();

    lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();
    let csr_before = fs::read(h.ssl_path("certificate_request/node02.example.com.pem")).unwrap();

    let second = lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();

    assert_eq!(second.private_key, WriteOutcome::AlreadyPresent);
    assert_eq!(second.csr, WriteOutcome::AlreadyPresent);
    assert_eq!(second.observed, Some(CertificateState::Requested));
    assert_eq!(h.crypto.keys_generated(), 1);
    assert_eq!(h.crypto.csrs_generated(), 1);
    assert_eq!(
        fs::read(h.ssl_path("certificate_request/node02.example.com.pem")).unwrap(),
        csr_before
    );
}

#[tokio::test]
async fn test_enroll_reuses_existing_key() {
    let h = Harness::new();
    let key = rcgen::KeyPair::generate().unwrap().serialize_pem();
    let key_path = path_for(ArtifactKind::PrivateKey, NODE, h.ssl_dir.path()).unwrap();
    write_if_absent(ArtifactKind::PrivateKey, &key_path, key.as_bytes()).unwrap();

    let report = h.lifecycle().enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();

    assert_eq!(report.private_key, WriteOutcome::AlreadyPresent);
    assert_eq!(report.csr, WriteOutcome::Written);
    assert_eq!(h.crypto.keys_generated(), 0);
    assert_eq!(fs::read_to_string(key_path).unwrap(), key);
}

#[tokio::test]
async fn test_enroll_reuses_pkcs1_rsa_key() {
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::LineEnding;

    let h = Harness::new();
    let rsa_key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let key = rsa_key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string();
    let key_path = path_for(ArtifactKind::PrivateKey, NODE, h.ssl_dir.path()).unwrap();
    write_if_absent(ArtifactKind::PrivateKey, &key_path, key.as_bytes()).unwrap();

    let report = h.lifecycle().enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();

    assert_eq!(report.private_key, WriteOutcome::AlreadyPresent);
    assert_eq!(report.csr, WriteOutcome::Written);
    assert_eq!(h.crypto.keys_generated(), 0);
    assert_eq!(fs::read_to_string(key_path).unwrap(), key);
    assert!(h
        .ca
        .csr_of(NODE)
        .unwrap()
        .starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
}

#[tokio::test]
async fn test_enroll_rejected_by_ca() {
    let h = Harness::new();
    h.ca.reject_csr.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = h.lifecycle().enroll(NODE, &[], h.ssl_dir.path()).await.unwrap_err();
    assert!(matches!(err, AppError::Enrollment(_)));
}

#[tokio::test]
async fn test_install_not_ready_has_no_side_effects() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();
    lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();
    h.ca.clear_calls();

    let outcome = lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::NotReady {
            observed: Some(CertificateState::Requested)
        }
    );
    assert_eq!(h.ca.calls(), vec!["get_certificate_status"]);
    assert!(!h.ssl_path("certs").exists());
    assert!(h.ca.csr_of(NODE).is_some());
}

#[tokio::test]
async fn test_install_survives_csr_cleanup_failure() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();
    lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();
    h.ca.sign_out_of_band(NODE);
    h.ca.fail_delete_csr.store(true, std::sync::atomic::Ordering::SeqCst);

    let outcome = lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert!(h.ssl_path("certs/node02.example.com.pem").exists());
    assert!(h.ca.csr_of(NODE).is_some());
}

#[tokio::test]
async fn test_install_when_request_already_gone() {
    let h = Harness::new();
    h.ca.set_state(NODE, CertificateState::Signed);

    let outcome = h.lifecycle().install(NODE, h.ssl_dir.path()).await.unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert!(h.ca.calls().contains(&"delete_csr".to_string()));
}

#[tokio::test]
async fn test_revoke_then_revoke_again_is_declined() {
    let h = Harness::new();
    h.ca.set_state(NODE, CertificateState::Signed);
    let lifecycle = h.lifecycle();

    assert_eq!(lifecycle.revoke(NODE).await.unwrap(), TransitionOutcome::Applied);
    assert_eq!(
        lifecycle.check_status(NODE).await.unwrap().state(),
        Some(CertificateState::Revoked)
    );

    h.ca.clear_calls();
    let again = lifecycle.revoke(NODE).await.unwrap();
    assert_eq!(
        again,
        TransitionOutcome::Declined(PreconditionFailure {
            operation: Operation::Revoke,
            observed: Some(CertificateState::Revoked),
        })
    );
    assert!(!h.ca.calls().contains(&"revoke".to_string()));
}

#[rstest]
#[case(None)]
#[case(Some(CertificateState::Requested))]
#[case(Some(CertificateState::Signed))]
#[tokio::test]
async fn test_delete_requires_revoked(#[case] state: Option<CertificateState>) {
    let h = Harness::new();
    if let Some(state) = state {
        h.ca.set_state(NODE, state);
    }

    let outcome = h.lifecycle().delete(NODE).await.unwrap();

    assert_eq!(
        outcome,
        TransitionOutcome::Declined(PreconditionFailure {
            operation: Operation::Delete,
            observed: state,
        })
    );
    assert!(!h.ca.calls().contains(&"delete".to_string()));
}

#[tokio::test]
async fn test_delete_after_revoke_forgets_node() {
    let h = Harness::new();
    h.ca.set_state(NODE, CertificateState::Revoked);
    let lifecycle = h.lifecycle();

    assert!(lifecycle.delete(NODE).await.unwrap().is_applied());
    assert!(lifecycle.check_status(NODE).await.unwrap().is_not_found());
}

#[rstest]
#[case(CertificateState::Requested)]
#[case(CertificateState::Pending)]
#[tokio::test]
async fn test_sign_awaiting_request(#[case] state: CertificateState) {
    let h = Harness::new();
    h.ca.set_state(NODE, state);

    assert!(h.lifecycle().sign(NODE).await.unwrap().is_applied());
    assert_eq!(h.ca.state_of(NODE), Some(CertificateState::Signed));
}

#[tokio::test]
async fn test_sign_unknown_node_is_declined_without_calling_ca() {
    let h = Harness::new();
    let outcome = h.lifecycle().sign(NODE).await.unwrap();

    assert!(matches!(outcome, TransitionOutcome::Declined(_)));
    assert_eq!(h.ca.calls(), vec!["get_certificate_status"]);
}

#[tokio::test]
async fn test_transport_failure_is_not_a_decline() {
    let h = Harness::new();
    h.ca.unreachable.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = h.lifecycle().revoke(NODE).await.unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
}

#[tokio::test]
async fn test_invalid_certname_is_rejected_before_any_call() {
    let h = Harness::new();
    let err = h.lifecycle().check_status("../../etc/passwd").await.unwrap_err();

    assert!(matches!(err, AppError::InvalidCertname(_)));
    assert!(h.ca.calls().is_empty());
}

#[tokio::test]
async fn test_reconcile() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();
    lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();

    let before = lifecycle.reconcile(NODE, h.ssl_dir.path()).await.unwrap();
    assert_eq!(
        before,
        Reconciliation::NotInstalled {
            observed: Some(CertificateState::Requested)
        }
    );

    h.ca.sign_out_of_band(NODE);
    lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap();
    let after = lifecycle.reconcile(NODE, h.ssl_dir.path()).await.unwrap();
    assert!(matches!(after, Reconciliation::InSync { .. }));

    // A certificate from somewhere else
    fs::write(h.ssl_path("certs/node02.example.com.pem"), self_signed_pem(NODE)).unwrap();
    let drifted = lifecycle.reconcile(NODE, h.ssl_dir.path()).await.unwrap();
    assert!(matches!(
        drifted,
        Reconciliation::Mismatch {
            state: CertificateState::Signed,
            ..
        }
    ));

    let local = lifecycle.local_state(NODE, h.ssl_dir.path()).unwrap();
    assert!(local.private_key && local.certificate_request && local.certificate);
}

#[tokio::test]
async fn test_end_to_end_node02() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();
    let ssl_dir = h.ssl_dir.path();

    lifecycle.enroll(NODE, &[], ssl_dir).await.unwrap();
    assert_eq!(
        lifecycle.check_status(NODE).await.unwrap().state(),
        Some(CertificateState::Requested)
    );

    h.ca.sign_out_of_band(NODE);

    let installed = lifecycle.install(NODE, ssl_dir).await.unwrap();
    let InstallOutcome::Installed {
        certificate,
        ca_certificate,
    } = installed
    else {
        panic!("expected installed outcome, got {:?}", installed);
    };
    assert_eq!(certificate, h.ssl_path("certs/node02.example.com.pem"));
    assert_eq!(ca_certificate, h.ssl_path("certs/ca.pem"));
    assert!(!fs::read_to_string(&certificate).unwrap().is_empty());
    assert_eq!(fs::read_to_string(&ca_certificate).unwrap(), h.ca.ca_certificate());
    assert!(h.ca.csr_of(NODE).is_none());

    assert!(lifecycle.revoke(NODE).await.unwrap().is_applied());
    assert_eq!(
        lifecycle.check_status(NODE).await.unwrap().state(),
        Some(CertificateState::Revoked)
    );

    assert!(lifecycle.delete(NODE).await.unwrap().is_applied());
    assert!(lifecycle.check_status(NODE).await.unwrap().is_not_found());
}
