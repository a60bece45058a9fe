//! Intermediate CA Certificate Generation Module
//!
//! Builds the ECDSA P-384 intermediates of a content-signature chain. The same
//! builder makes three different certificates:
//!
//! - the first intermediate, issued by the RSA root;
//! - the optional second intermediate, issued by the first;
//! - the irrelevant intermediate, self-signed under the first intermediate's
//!   subject so that a validator matching on names alone picks the wrong one.
//!
//! # Chain Position
//! ```text
//! Root CA (self-signed)
//!   └── Intermediate CA (signed by Root) ← This module
//!       └── [Second Intermediate CA] ← This module
//!           └── Leaf
//! ```
//!
//! # Certificate Properties
//! - **Key Usage**: keyCertSign, cRLSign (critical)
//! - **Extended Key Usage**: codeSigning
//! - **Basic Constraints**: CA=true (critical)
//! - **Name Constraints**: permitted DNS subtrees of the signing domain
//! - **Key**: ECDSA P-384, signed with SHA-384 by the issuer's key
//! - **Serial**: random 128-bit

use crate::certificate_model::CertificateRole;
use crate::error::Result;
use crate::pki_generator::{
    append_ca_extensions, append_code_signing_eku, append_issuer_key_id, append_name_constraints,
    append_raw_authority_key_id, append_subject_key_id, certificate_builder, generate_p384_key,
    sign_certificate, DistinguishedName, SerialNumber, Validity, COUNTRY, ORGANIZATION,
};
use crate::generate_root_ca::ROOT_CA_ORGANIZATIONAL_UNIT;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::{X509Ref, X509};
use tracing::debug;

pub const INTERMEDIATE_CA_COMMON_NAME: &str =
    "Content Signing Intermediate/emailAddress=foxsec@mozilla.com";

/// DNS subtrees the leaf's subject must fall under.
pub const PERMITTED_DNS_DOMAINS: [&str; 2] =
    [".content-signature.mozilla.org", "content-signature.mozilla.org"];

/// Who signs the intermediate.
pub enum Issuer<'a> {
    /// Signed by an existing CA; the authority key id is taken from its
    /// subject key id.
    Ca {
        key: &'a PKeyRef<Private>,
        certificate: &'a X509Ref,
    },
    /// Signed by its own key; the authority key id carries the given bytes.
    SelfSigned { authority_key_id: &'a [u8] },
}

/// Builder for an ECDSA P-384 key pair and intermediate CA certificate
///
/// # Examples
/// ```rust,no_run
/// # use content_signature_chain::error::Result;
/// # use openssl::pkey::{PKey, Private};
/// # use openssl::x509::X509;
/// # fn example(root_key: PKey<Private>, root_cert: X509) -> Result<()> {
/// use content_signature_chain::generate_intermediate_ca::{EcIntermediateCABuilder, Issuer};
///
/// let now = chrono::Utc::now().timestamp();
/// let (key, cert) = EcIntermediateCABuilder::new(Issuer::Ca {
///     key: &root_key,
///     certificate: &root_cert,
/// })
/// .not_before(now)
/// .not_after(now + 365 * 86_400)
/// .build()?;
/// # Ok(())
/// # }
/// ```
pub struct EcIntermediateCABuilder<'a> {
    role: CertificateRole,
    issuer: Issuer<'a>,
    subject_common_name: String,
    organization: String,
    organizational_unit: String,
    country: String,
    permitted_dns_domains: Vec<String>,
    not_before: i64,
    not_after: i64,
}

impl<'a> EcIntermediateCABuilder<'a> {
    /// Create a builder with the content signing intermediate's subject and
    /// name constraints.
    ///
    /// # Arguments
    /// * `issuer` - The signing CA, or [`Issuer::SelfSigned`] for a decoy
    pub fn new(issuer: Issuer<'a>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            role: CertificateRole::Intermediate,
            issuer,
            subject_common_name: INTERMEDIATE_CA_COMMON_NAME.to_string(),
            organization: ORGANIZATION.to_string(),
            organizational_unit: ROOT_CA_ORGANIZATIONAL_UNIT.to_string(),
            country: COUNTRY.to_string(),
            permitted_dns_domains: PERMITTED_DNS_DOMAINS.iter().map(|d| d.to_string()).collect(),
            not_before: now,
            not_after: now,
        }
    }

    /// Role reported in logs and errors
    pub fn role(mut self, role: CertificateRole) -> Self {
        self.role = role;
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

    /// Build the P-384 key pair and intermediate CA certificate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, signed certificate)
    ///
    /// # Errors
    /// Returns a key generation error if the P-384 key cannot be made, and a
    /// certificate signing error if the issuer or any extension is rejected.
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let role = self.role;
        let private_key = generate_p384_key(role)?;

        let subject_name = DistinguishedName {
            country: self.country,
            organization: self.organization,
            organizational_unit: self.organizational_unit,
            locality: None,
            common_name: self.subject_common_name,
        }
        .to_x509_name(role)?;

        let issuer_name = match &self.issuer {
            Issuer::Ca { certificate, .. } => certificate.subject_name(),
            Issuer::SelfSigned { .. } => &*subject_name,
        };

        let mut builder = certificate_builder(
            role,
            SerialNumber::Random,
            &subject_name,
            issuer_name,
            Validity {
                not_before: self.not_before,
                not_after: self.not_after,
            },
            &private_key,
        )?;

        append_ca_extensions(&mut builder, role)?;
        append_code_signing_eku(&mut builder, role)?;
        append_name_constraints(&mut builder, role, &self.permitted_dns_domains)?;
        append_subject_key_id(&mut builder, role)?;

        let certificate = match self.issuer {
            Issuer::Ca { key, certificate } => {
                append_issuer_key_id(&mut builder, role, certificate)?;
                sign_certificate(builder, role, key)?
            }
            Issuer::SelfSigned { authority_key_id } => {
                append_raw_authority_key_id(&mut builder, role, authority_key_id)?;
                sign_certificate(builder, role, &private_key)?
            }
        };

        debug!(certificate = %role, "generated P-384 intermediate");
        Ok((private_key, certificate))
    }
}
