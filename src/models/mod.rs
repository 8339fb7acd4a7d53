//! Data models

mod artifact;
mod certificate;
mod node;

pub use artifact::*;
pub use certificate::*;
pub use node::*;
