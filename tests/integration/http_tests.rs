//! Lifecycle over real HTTP against a mocked Puppet CA

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use openvox_certctl::config::TlsSettings;
use openvox_certctl::models::CertificateState;
use openvox_certctl::services::{CertificateLifecycle, InstallOutcome, PuppetCAService};
use openvox_certctl::AppError;

use crate::common::{self_signed_pem, CountingCrypto, Harness};

const NODE: &str = "node02.example.com";

fn ca_service(server: &MockServer) -> PuppetCAService {
    let tls = TlsSettings {
        timeout_secs: 5,
        ..Default::default()
    };
    PuppetCAService::new(&server.uri(), &tls).unwrap()
}

async fn mount_status(server: &MockServer, state: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/puppet-ca/v1/certificate_status/{}", NODE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": NODE,
            "state": state
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_enroll_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/puppet-ca/v1/certificate_status/{}", NODE)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/puppet-ca/v1/certificate_request/{}", NODE)))
        .and(header("content-type", "text/plain"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new();
    let lifecycle = CertificateLifecycle::new(ca_service(&server), CountingCrypto::new());
    let report = lifecycle.enroll(NODE, &[], h.ssl_dir.path()).await.unwrap();

    assert_eq!(report.observed, None);
    assert!(h.ssl_path("certificate_request/node02.example.com.pem").exists());
}

#[tokio::test]
async fn test_install_over_http() {
    let server = MockServer::start().await;
    mount_status(&server, "signed").await;
    Mock::given(method("GET"))
        .and(path("/puppet-ca/v1/certificate/ca"))
        .respond_with(ResponseTemplate::new(200).set_body_string(self_signed_pem("puppet.example.com")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/puppet-ca/v1/certificate/{}", NODE)))
        .respond_with(ResponseTemplate::new(200).set_body_string(self_signed_pem(NODE)))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/puppet-ca/v1/certificate_request/{}", NODE)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new();
    let lifecycle = CertificateLifecycle::new(ca_service(&server), CountingCrypto::new());
    let outcome = lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert!(h.ssl_path("certs/ca.pem").exists());
    assert!(h.ssl_path("certs/node02.example.com.pem").exists());
}

#[tokio::test]
async fn test_install_pending_over_http() {
    let server = MockServer::start().await;
    mount_status(&server, "requested").await;

    let h = Harness::new();
    let lifecycle = CertificateLifecycle::new(ca_service(&server), CountingCrypto::new());
    let outcome = lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::NotReady {
            observed: Some(CertificateState::Requested)
        }
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_install_rejects_diagnostic_body() {
    let server = MockServer::start().await;
    mount_status(&server, "signed").await;
    Mock::given(method("GET"))
        .and(path("/puppet-ca/v1/certificate/ca"))
        .respond_with(ResponseTemplate::new(200).set_body_string(self_signed_pem("puppet.example.com")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/puppet-ca/v1/certificate/{}", NODE)))
        .respond_with(
            ResponseTemplate::new(404).set_body_string("Not Found: Could not find certificate"),
        )
        .mount(&server)
        .await;

    let h = Harness::new();
    let lifecycle = CertificateLifecycle::new(ca_service(&server), CountingCrypto::new());
    let err = lifecycle.install(NODE, h.ssl_dir.path()).await.unwrap_err();

    assert!(matches!(err, AppError::MalformedResponse(_)));
    assert!(!h.ssl_path("certs").exists());
}

#[tokio::test]
async fn test_stateless_status_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": NODE})))
        .mount(&server)
        .await;

    let lifecycle = CertificateLifecycle::new(ca_service(&server), CountingCrypto::new());
    let err = lifecycle.revoke(NODE).await.unwrap_err();

    assert!(matches!(err, AppError::MalformedResponse(_)));
}
