//! HTTP client construction shared by the Puppet CA and PuppetDB transports

use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Certificate, Client, Identity};
use tracing::{debug, info, warn};

use crate::config::TlsSettings;
use crate::utils::error::{AppError, AppResult};

/// Check that an SSL file exists and is a regular file, logging the result
fn ssl_file_present(path: &Path, file_type: &str) -> bool {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::MetadataExt;
                debug!(
                    "{} file permissions: mode={:o}, uid={}, gid={}, path={}",
                    file_type,
                    metadata.mode() & 0o777,
                    metadata.uid(),
                    metadata.gid(),
                    path.display()
                );
            }
            true
        }
        Ok(_) => {
            warn!("{} path is not a file: {}", file_type, path.display());
            false
        }
        Err(e) => {
            debug!("{} not available at {}: {}", file_type, path.display(), e);
            false
        }
    }
}

fn read_ssl_file(path: &Path, file_type: &str) -> AppResult<Vec<u8>> {
    fs::read(path).map_err(|e| {
        AppError::Config(format!(
            "{} exists but cannot be read: {} - {}",
            file_type,
            path.display(),
            e
        ))
    })
}

/// Build a reqwest client for one of the Puppet services
///
/// The client identity is attached only when both the certificate and the key
/// are configured and present on disk. A node that has not been enrolled yet
/// talks to the CA anonymously.
pub fn build_client(service: &str, tls: &TlsSettings) -> AppResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(tls.timeout_secs));

    // Add CA certificate if provided (must be done before identity for rustls)
    if let Some(ref ca_path) = tls.ca_cert {
        let ca_pem = read_ssl_file(ca_path, "CA certificate")?;
        let certs = Certificate::from_pem_bundle(&ca_pem).map_err(|e| {
            AppError::Config(format!("failed to parse CA certificate(s) as PEM: {}", e))
        })?;

        info!(
            "{} SSL: parsed {} certificate(s) from CA bundle",
            service,
            certs.len()
        );

        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    match (&tls.client_cert, &tls.client_key) {
        (Some(cert_path), Some(key_path))
            if ssl_file_present(cert_path, "Client certificate")
                && ssl_file_present(key_path, "Client private key") =>
        {
            let cert = read_ssl_file(cert_path, "Client certificate")?;
            let key = read_ssl_file(key_path, "Client private key")?;

            // Combine cert and key into a single PEM bundle for rustls
            let mut pem_bundle = cert;
            pem_bundle.push(b'\n');
            pem_bundle.extend_from_slice(&key);

            let identity = Identity::from_pem(&pem_bundle).map_err(|e| {
                AppError::Config(format!(
                    "failed to create identity from {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
            builder = builder.identity(identity);
            info!("{} SSL: using client certificate {}", service, cert_path.display());
        }
        (Some(_), Some(_)) => {
            info!("{} SSL: client certificate not installed yet, connecting without it", service);
        }
        (None, None) => {}
        _ => {
            warn!(
                "Partial SSL configuration for {}: both client cert and key must be provided",
                service
            );
        }
    }

    // Configure SSL verification (must be after identity for rustls compatibility)
    if !tls.verify {
        debug!("{} SSL: certificate verification disabled (self-issued CA)", service);
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| AppError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Encode a certname for use as a URL path segment
pub fn path_segment(certname: &str) -> String {
    urlencoding::encode(certname).into_owned()
}
