//! Key and certificate request generation

use std::sync::Arc;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::debug;

use crate::utils::error::{AppError, AppResult};

/// Key size Puppet agents use by default
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Produces private keys and CSRs as PEM text
pub trait CryptoProvider: Send + Sync {
    fn generate_private_key(&self) -> AppResult<String>;

    fn generate_csr(
        &self,
        private_key_pem: &str,
        common_name: &str,
        alt_names: &[String],
    ) -> AppResult<String>;
}

impl<T: CryptoProvider + ?Sized> CryptoProvider for Arc<T> {
    fn generate_private_key(&self) -> AppResult<String> {
        (**self).generate_private_key()
    }

    fn generate_csr(
        &self,
        private_key_pem: &str,
        common_name: &str,
        alt_names: &[String],
    ) -> AppResult<String> {
        (**self).generate_csr(private_key_pem, common_name, alt_names)
    }
}

/// RSA keys, PKCS#8 PEM encoded
#[derive(Debug, Clone)]
pub struct RsaCryptoProvider {
    bits: usize,
}

impl RsaCryptoProvider {
    pub fn new(bits: usize) -> Self {
        Self { bits }
    }
}

impl Default for RsaCryptoProvider {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS)
    }
}

impl CryptoProvider for RsaCryptoProvider {
    fn generate_private_key(&self) -> AppResult<String> {
        debug!("Generating {}-bit RSA private key", self.bits);
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| AppError::Crypto(format!("RSA key generation failed: {}", e)))?;
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::Crypto(format!("failed to encode private key: {}", e)))?;
        Ok(pem.to_string())
    }

    fn generate_csr(
        &self,
        private_key_pem: &str,
        common_name: &str,
        alt_names: &[String],
    ) -> AppResult<String> {
        build_csr(private_key_pem, common_name, alt_names)
    }
}

/// Strip the `DNS:`/`IP:` prefixes Puppet uses in `dns_alt_names`
fn bare_alt_name(name: &str) -> String {
    let name = name.trim();
    name.strip_prefix("DNS:")
        .or_else(|| name.strip_prefix("IP:"))
        .unwrap_or(name)
        .to_string()
}

/// Load a signing key from PEM
///
/// Accepts PKCS#8 as well as the PKCS#1 `RSA PRIVATE KEY` form that Puppet
/// and OpenSSL leave in an agent's `private_keys` directory.
fn load_key_pair(private_key_pem: &str) -> AppResult<KeyPair> {
    let pkcs8_err = match KeyPair::from_pem(private_key_pem) {
        Ok(key_pair) => return Ok(key_pair),
        Err(e) => e,
    };

    let rsa_key = RsaPrivateKey::from_pkcs1_pem(private_key_pem).map_err(|_| {
        AppError::Crypto(format!("cannot load private key: {}", pkcs8_err))
    })?;
    debug!("Converting PKCS#1 RSA private key to PKCS#8");
    let der = rsa_key
        .to_pkcs8_der()
        .map_err(|e| AppError::Crypto(format!("failed to re-encode private key: {}", e)))?;
    KeyPair::try_from(der.as_bytes())
        .map_err(|e| AppError::Crypto(format!("cannot load private key: {}", e)))
}

/// Build a PEM CSR signed by the given key
///
/// Subject is `CN=<common_name>`. Alternative names go into the
/// subjectAltName extension; the CN is not repeated there.
pub fn build_csr(
    private_key_pem: &str,
    common_name: &str,
    alt_names: &[String],
) -> AppResult<String> {
    let key_pair = load_key_pair(private_key_pem)?;

    let sans: Vec<String> = alt_names
        .iter()
        .map(|n| bare_alt_name(n))
        .filter(|n| !n.is_empty())
        .collect();

    let mut params = CertificateParams::new(sans)
        .map_err(|e| AppError::Crypto(format!("invalid alternative name: {}", e)))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| AppError::Crypto(format!("CSR generation failed: {}", e)))?;
    csr.pem()
        .map_err(|e| AppError::Crypto(format!("failed to encode CSR: {}", e)))
}
