//! Shared utilities

pub mod error;
pub mod validation;

pub use error::{AppError, AppResult, ErrorResponse};
pub use validation::{ensure_certname, validate_certname};
