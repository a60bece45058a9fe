//! Root CA Certificate Generation Module
//!
//! Builds the self-signed RSA root that anchors a content-signature chain, and
//! the "irrelevant" root that shares its profile but anchors nothing.
//!
//! # Chain Position
//! ```text
//! Root CA (self-signed, RSA-4096) ← This module
//!   └── Intermediate CA (ECDSA P-384)
//!       └── [Second Intermediate CA]
//!           └── Leaf (code signing)
//! ```
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Key Usage**: keyCertSign, cRLSign (critical)
//! - **Extended Key Usage**: codeSigning
//! - **Basic Constraints**: CA=true (critical)
//! - **Key**: RSA 4096-bit, signed with SHA-384
//! - **Serial**: fixed, 1
//! - **Authority Key Identifier**: raw bytes supplied by the caller
//!
//! # Example
//! ```rust,no_run
//! # use content_signature_chain::error::Result;
//! # fn example() -> Result<()> {
//! use content_signature_chain::generate_root_ca::RsaRootCABuilder;
//!
//! let now = chrono::Utc::now().timestamp();
//! let (root_key, root_cert) = RsaRootCABuilder::new()
//!     .subject_common_name("test-root-ca-production-amo".to_string())
//!     .not_before(now - 86_400)
//!     .not_after(now + 365 * 86_400)
//!     .authority_key_id(vec![1, 3, 6, 1, 5, 5, 7, 3, 3])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::certificate_model::CertificateRole;
use crate::error::Result;
use crate::pki_generator::{
    append_ca_extensions, append_code_signing_eku, append_raw_authority_key_id,
    append_subject_key_id, certificate_builder, generate_rsa_key, sign_certificate,
    DistinguishedName, SerialNumber, Validity, COUNTRY, ORGANIZATION,
};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tracing::debug;

pub const ROOT_CA_COMMON_NAME: &str = "test-root-ca-production-amo";
pub const IRRELEVANT_ROOT_CA_COMMON_NAME: &str = "irrelevant-root-template";
pub const ROOT_CA_ORGANIZATIONAL_UNIT: &str = "Mozilla AMO Test Signing Service";
const ROOT_CA_SERIAL: u32 = 1;

/// Builder for an RSA key pair and its self-signed root CA certificate.
///
/// Every field has a default matching the test signing root, so only the
/// validity window and the authority key id normally need setting. The same
/// builder makes the irrelevant root: set [`RsaRootCABuilder::role`] and a
/// different common name.
pub struct RsaRootCABuilder {
    role: CertificateRole,
    subject_common_name: String,
    organization: String,
    organizational_unit: String,
    country: String,
    serial: u32,
    not_before: i64,
    not_after: i64,
    authority_key_id: Vec<u8>,
}

impl RsaRootCABuilder {
    /// Create a builder with the test signing root's subject and a zero-length
    /// validity window starting now.
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            role: CertificateRole::Root,
            subject_common_name: ROOT_CA_COMMON_NAME.to_string(),
            organization: ORGANIZATION.to_string(),
            organizational_unit: ROOT_CA_ORGANIZATIONAL_UNIT.to_string(),
            country: COUNTRY.to_string(),
            serial: ROOT_CA_SERIAL,
            not_before: now,
            not_after: now,
            authority_key_id: Vec::new(),
        }
    }

    /// Role reported in logs and errors (`Root` or `IrrelevantRoot`).
    pub fn role(mut self, role: CertificateRole) -> Self {
        self.role = role;
        self
    }

    /// Set the common name (CN) for the certificate
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Start of validity, Unix seconds
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.not_before = timestamp;
        self
    }

    /// End of validity, Unix seconds
    pub fn not_after(mut self, timestamp: i64) -> Self {
        self.not_after = timestamp;
        self
    }

    /// Bytes placed in the authority key identifier extension. Empty omits it.
    pub fn authority_key_id(mut self, key_id: Vec<u8>) -> Self {
        self.authority_key_id = key_id;
        self
    }

    /// Build the RSA key pair and self-signed root CA certificate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    ///
    /// # Errors
    /// * [`ChainError::KeyGeneration`](crate::error::ChainError::KeyGeneration) if the RSA key cannot be generated
    /// * [`ChainError::CertificateSigning`](crate::error::ChainError::CertificateSigning) if any field, extension or the signature is rejected
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let role = self.role;
        let private_key = generate_rsa_key(role)?;

        let name = DistinguishedName {
            country: self.country,
            organization: self.organization,
            organizational_unit: self.organizational_unit,
            locality: None,
            common_name: self.subject_common_name,
        }
        .to_x509_name(role)?;

        let mut builder = certificate_builder(
            role,
            SerialNumber::Fixed(self.serial),
            &name,
            &name,
            Validity {
                not_before: self.not_before,
                not_after: self.not_after,
            },
            &private_key,
        )?;

        append_ca_extensions(&mut builder, role)?;
        append_code_signing_eku(&mut builder, role)?;
        append_subject_key_id(&mut builder, role)?;
        append_raw_authority_key_id(&mut builder, role, &self.authority_key_id)?;

        let certificate = sign_certificate(builder, role, &private_key)?;
        debug!(certificate = %role, "generated self-signed RSA root");
        Ok((private_key, certificate))
    }
}

impl Default for RsaRootCABuilder {
    fn default() -> Self {
        Self::new()
    }
}
