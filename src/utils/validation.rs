//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::{AppError, AppResult};

/// Puppet certnames: lowercase, digits, dots, dashes and underscores
static CERTNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("static certname regex"));

/// Validate a certificate name
///
/// Certnames end up as file names under the SSL directory, so anything that
/// could walk out of it (`..`, separators) is refused here.
pub fn validate_certname(certname: &str) -> bool {
    !certname.is_empty()
        && certname.len() <= 255
        && !certname.contains("..")
        && CERTNAME_REGEX.is_match(certname)
}

/// Same check, as a `Result` for use with `?`
pub fn ensure_certname(certname: &str) -> AppResult<()> {
    if validate_certname(certname) {
        Ok(())
    } else {
        Err(AppError::InvalidCertname(certname.to_string()))
    }
}
