//! Root certificate authority and leaf issuance

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::pki_types::CertificateDer;
use rustls_pemfile;
use std::io::BufReader;
use std::net::IpAddr;
use std::path::Path;

use crate::error::{Error, Result};

/// A freshly generated root CA certificate and key pair
pub struct GeneratedAuthority {
    /// PEM-encoded certificate
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
}

impl GeneratedAuthority {
    /// Generate a new root CA
    pub fn generate() -> Result<Self> {
        let mut params = CertificateParams::default();

        params
            .distinguished_name
            .push(DnType::CommonName, "Propylon Proxy CA");
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Propylon");

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        // Valid for 10 years
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after = params.not_before + time::Duration::days(3650);

        let key_pair = KeyPair::generate().map_err(|e| Error::certificate(e.to_string()))?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::certificate(e.to_string()))?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Save the certificate and key to files
    pub fn save(&self, cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(cert_path.as_ref(), &self.cert_pem).map_err(|e| {
            Error::certificate(format!(
                "Failed to write certificate to '{}': {}",
                cert_path.as_ref().display(),
                e
            ))
        })?;

        std::fs::write(key_path.as_ref(), &self.key_pem).map_err(|e| {
            Error::certificate(format!(
                "Failed to write key to '{}': {}",
                key_path.as_ref().display(),
                e
            ))
        })?;

        // Restrict key file permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(key_path.as_ref())?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(key_path.as_ref(), perms)?;
        }

        Ok(())
    }
}

/// A leaf certificate issued for one hostname
pub struct IssuedCert {
    /// PEM-encoded leaf certificate
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
}

/// The pre-provisioned root CA used to sign interception certificates
pub struct RootAuthority {
    /// The CA key pair (used for signing)
    key_pair: KeyPair,
    /// DER-encoded CA certificate
    cert_der: CertificateDer<'static>,
}

impl RootAuthority {
    /// Load a CA from PEM-encoded certificate and key
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| Error::certificate(format!("Failed to parse CA private key: {}", e)))?;

        let mut cert_reader = BufReader::new(cert_pem.as_bytes());
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .filter_map(|r| r.ok())
            .collect();

        let cert_der = certs
            .into_iter()
            .next()
            .ok_or_else(|| Error::certificate("No certificate found in PEM"))?;

        Ok(Self { key_pair, cert_der })
    }

    /// Load a CA from files. Failure here is fatal to interception: no
    /// hostname can be served without the root material.
    pub fn from_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_pem = std::fs::read_to_string(cert_path.as_ref()).map_err(|e| {
            Error::certificate(format!(
                "Failed to read CA certificate '{}': {}",
                cert_path.as_ref().display(),
                e
            ))
        })?;

        let key_pem = std::fs::read_to_string(key_path.as_ref()).map_err(|e| {
            Error::certificate(format!(
                "Failed to read CA key '{}': {}",
                key_path.as_ref().display(),
                e
            ))
        })?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Issue a leaf certificate for a hostname (or IP literal), signed by
    /// this CA. The leaf is valid for 10 years and carries server and
    /// client auth usage.
    pub fn issue_for_host(&self, hostname: &str) -> Result<IssuedCert> {
        let mut params = CertificateParams::default();

        params.distinguished_name.push(DnType::CommonName, hostname);

        let san = match hostname.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(hostname.try_into().map_err(|e| {
                Error::certificate(format!("Invalid hostname '{}': {}", hostname, e))
            })?),
        };
        params.subject_alt_names = vec![san];

        params.is_ca = IsCa::NoCa;

        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];

        // Valid for 10 years from now; issued certs are reused
        // indefinitely, there is no rotation.
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after = params.not_before + time::Duration::days(3650);

        let leaf_key = KeyPair::generate().map_err(|e| Error::certificate(e.to_string()))?;

        // Reconstruct the issuer from the loaded CA certificate so the
        // leaf chains to the real provisioned root.
        let ca_params = CertificateParams::from_ca_cert_der(&self.cert_der)
            .map_err(|e| Error::certificate(format!("Failed to parse CA certificate: {}", e)))?;
        let ca_cert = ca_params
            .self_signed(&self.key_pair)
            .map_err(|e| Error::certificate(format!("Failed to rebuild CA for signing: {}", e)))?;

        let cert = params
            .signed_by(&leaf_key, &ca_cert, &self.key_pair)
            .map_err(|e| Error::certificate(format!("Failed to sign certificate: {}", e)))?;

        Ok(IssuedCert {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }

    /// Get the CA certificate in DER format
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }
}
