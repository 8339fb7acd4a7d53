//! Test world for Cucumber scenarios

use std::fmt;

use cucumber::World;

use openvox_certctl::models::{CommandAck, InventoryStatus};
use openvox_certctl::services::{InstallOutcome, TransitionOutcome};

use crate::common::Harness;

/// Test world that maintains state across scenario steps
#[derive(World)]
#[world(init = Self::new)]
pub struct TestWorld {
    /// In-memory CA, PuppetDB and SSL directory
    pub harness: Harness,

    /// Result of the last install step
    pub last_install: Option<InstallOutcome>,

    /// Result of the last sign/revoke/delete step
    pub last_transition: Option<TransitionOutcome>,

    /// Result of the last PuppetDB query
    pub last_inventory: Option<InventoryStatus>,

    /// Acknowledgement of the last deactivation
    pub last_ack: Option<CommandAck>,
}

impl TestWorld {
    fn new() -> Self {
        Self {
            harness: Harness::new(),
            last_install: None,
            last_transition: None,
            last_inventory: None,
            last_ack: None,
        }
    }
}

impl fmt::Debug for TestWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestWorld")
            .field("ssl_dir", &self.harness.ssl_dir.path())
            .field("last_install", &self.last_install)
            .field("last_transition", &self.last_transition)
            .field("last_inventory", &self.last_inventory)
            .field("last_ack", &self.last_ack)
            .finish()
    }
}
