//! OpenVox certificate lifecycle toolkit
//!
//! Client-side management of Puppet/OpenVox node certificates: key and CSR
//! generation, submission to the Puppet CA, signing, installation, revocation
//! and deletion, plus node deactivation in PuppetDB.

pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use services::{
    CaTransport, CertificateLifecycle, CryptoProvider, InventoryTransport, LocalMaterialStore,
    Workflow,
};
pub use utils::error::{AppError, AppResult};
