// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Certificate provider
//!
//! Identities live under `certs/<name>/{cert,key}.pem`, where `<name>` is
//! the domain with `*` replaced by `_`. Generation and trust-store
//! installation happen outside this process; we only read the materialized
//! PEM pair and hand it to the TLS listener.

use anyhow::{bail, Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::constants::CERTS_DIR;

/// Materialized leaf chain and private key for one identity
#[derive(Debug)]
pub struct CertificateHandle {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Filesystem-safe identity name for a domain (`*.foo.com` -> `_.foo.com`)
pub fn safe_cert_name(domain: &str) -> String {
    domain.replace('*', "_")
}

/// Names of all identities present under the certs directory
pub fn list_certs() -> Result<Vec<String>> {
    list_certs_in(Path::new(CERTS_DIR))
}

pub fn list_certs_in(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", dir.display())),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Read the PEM pair for a named identity
pub fn load_cert(name: &str) -> Result<CertificateHandle> {
    load_cert_from(Path::new(CERTS_DIR), name)
}

pub fn load_cert_from(dir: &Path, name: &str) -> Result<CertificateHandle> {
    let cert_path: PathBuf = dir.join(name).join("cert.pem");
    let key_path: PathBuf = dir.join(name).join("key.pem");

    let cert_pem = std::fs::read(&cert_path)
        .with_context(|| format!("failed to read {}", cert_path.display()))?;
    let key_pem = std::fs::read(&key_path)
        .with_context(|| format!("failed to read {}", key_path.display()))?;

    Ok(CertificateHandle { cert_pem, key_pem })
}

impl CertificateHandle {
    /// Parse the PEM pair into a TLS server configuration serving this
    /// single certificate for every connection
    pub fn server_config(&self) -> Result<rustls::ServerConfig> {
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(self.cert_pem.as_slice()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to parse certificate PEM")?;
        if certs.is_empty() {
            bail!("certificate PEM contains no certificates");
        }

        let key: PrivateKeyDer<'static> =
            rustls_pemfile::private_key(&mut BufReader::new(self.key_pem.as_slice()))
                .context("failed to parse private key PEM")?
                .context("key PEM contains no private key")?;

        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("certificate and key do not form a usable pair")?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_cert_name_replaces_wildcard() {
        assert_eq!(safe_cert_name("*.ol.epicgames.com"), "_.ol.epicgames.com");
        assert_eq!(safe_cert_name("localhost"), "localhost");
    }

    #[test]
    fn test_list_certs_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("certs");
        assert!(list_certs_in(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_list_certs_names_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("_.example.com")).unwrap();
        std::fs::create_dir(dir.path().join("localhost")).unwrap();
        std::fs::write(dir.path().join("stray.pem"), b"x").unwrap();

        let names = list_certs_in(dir.path()).unwrap();
        assert_eq!(names, vec!["_.example.com", "localhost"]);
    }

    #[test]
    fn test_load_cert_missing_pair_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cert_from(dir.path(), "nope").unwrap_err().to_string();
        assert!(err.contains("cert.pem"));
    }

    #[test]
    fn test_empty_pem_rejected() {
        let handle = CertificateHandle {
            cert_pem: Vec::new(),
            key_pem: Vec::new(),
        };
        assert!(handle.server_config().is_err());
    }
}
