//! Decommission workflow and inventory behavior

use openvox_certctl::models::{CertificateState, InventoryStatus};
use openvox_certctl::services::{InventoryTransport, Operation, TransitionOutcome};

use crate::common::Harness;

#[tokio::test]
async fn test_decommission_signed_node() {
    let h = Harness::new();
    h.ca.set_state("node03.example.com", CertificateState::Signed);
    h.inventory.add_node("node03.example.com");

    let report = h.workflow().decommission("node03.example.com").await.unwrap();

    assert!(report.completed);
    let operations: Vec<Operation> = report.steps.iter().map(|s| s.operation).collect();
    assert_eq!(operations, vec![Operation::Revoke, Operation::Delete]);
    assert!(report.deactivation.is_some());
    assert!(h.ca.state_of("node03.example.com").is_none());

    let status = h.inventory.get_node_status("node03.example.com").await.unwrap();
    assert!(status.record().unwrap().is_deactivated());
}

#[tokio::test]
async fn test_decommission_revoked_node_only_deletes() {
    let h = Harness::new();
    h.ca.set_state("node04.example.com", CertificateState::Revoked);

    let report = h.workflow().decommission("node04.example.com").await.unwrap();

    assert!(report.completed);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].operation, Operation::Delete);
}

#[tokio::test]
async fn test_decommission_stops_on_pending_request() {
    let h = Harness::new();
    h.ca.set_state("node06.example.com", CertificateState::Requested);

    let report = h.workflow().decommission("node06.example.com").await.unwrap();

    assert!(!report.completed);
    assert!(matches!(report.steps[0].outcome, TransitionOutcome::Declined(_)));
    assert!(report.deactivation.is_none());
    assert_eq!(h.inventory.commands_received(), 0);
    assert_eq!(
        h.ca.state_of("node06.example.com"),
        Some(CertificateState::Requested)
    );
}

#[tokio::test]
async fn test_decommission_without_inventory() {
    let h = Harness::new();
    h.ca.set_state("node07.example.com", CertificateState::Signed);

    let report = h
        .workflow_without_inventory()
        .decommission("node07.example.com")
        .await
        .unwrap();

    assert!(report.completed);
    assert!(report.deactivation.is_none());
}

#[tokio::test]
async fn test_deactivate_unknown_node() {
    let h = Harness::new();

    let before = h.inventory.get_node_status("node05.example.com").await.unwrap();
    assert!(matches!(before, InventoryStatus::Missing { .. }));

    let ack = h.inventory.deactivate_node("node05.example.com").await.unwrap();
    assert!(!ack.uuid.is_nil());

    let after = h.inventory.get_node_status("node05.example.com").await.unwrap();
    assert!(after.record().unwrap().deactivated.is_some());
}

#[tokio::test]
async fn test_decommission_unknown_node_still_deactivates() {
    let h = Harness::new();

    let report = h.workflow().decommission("node05.example.com").await.unwrap();

    assert!(report.completed);
    assert!(report.steps.is_empty());
    assert_eq!(h.inventory.commands_received(), 1);
}
