//! Business logic services

pub mod crypto;
pub mod http;
pub mod lifecycle;
pub mod material_store;
pub mod puppet_ca;
pub mod puppetdb;
pub mod transport;
pub mod workflow;

pub use crypto::{CryptoProvider, RsaCryptoProvider};
pub use lifecycle::{
    CertificateLifecycle, EnrollReport, InstallOutcome, Operation, PreconditionFailure,
    Reconciliation, TransitionOutcome,
};
pub use material_store::{LocalMaterialStore, LocalState, WriteOutcome};
pub use puppet_ca::PuppetCAService;
pub use puppetdb::PuppetDbClient;
pub use transport::{CaTransport, InventoryTransport};
pub use workflow::{DecommissionReport, Workflow};
