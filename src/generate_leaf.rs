//! Leaf Certificate Generation Module
//!
//! Builds the end-entity certificate whose key signs content. The leaf's common
//! name is what the update client pins, so it comes straight from the model.
//!
//! # Chain Position
//! ```text
//! Root CA (self-signed)
//!   └── Intermediate CA (signed by Root)
//!       └── [Second Intermediate CA]
//!           └── Leaf (signed by the lowest intermediate) ← This module
//! ```
//!
//! # Certificate Properties
//! - **Key Usage**: digitalSignature (critical)
//! - **Extended Key Usage**: codeSigning
//! - **Basic Constraints**: absent
//! - **Key**: ECDSA P-384, signed with SHA-384
//! - **Serial**: 1988
//! - **Validity**: ten days ago until one year from now

use crate::certificate_model::CertificateRole;
use crate::error::Result;
use crate::pki_generator::{
    append_code_signing_eku, append_issuer_key_id, certificate_builder, generate_p384_key,
    sign_certificate, CertContext, DistinguishedName, SerialNumber, Validity, COUNTRY,
    ORGANIZATION,
};
use chrono::{Duration, Utc};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::KeyUsage;
use openssl::x509::{X509Ref, X509};
use tracing::debug;

pub const LEAF_ORGANIZATIONAL_UNIT: &str = "Cumulonimbus Services";
pub const LEAF_LOCALITY: &str = "Broadview";
const LEAF_SERIAL: u32 = 1988;
const LEAF_BACKDATE_DAYS: i64 = 10;
const LEAF_VALIDITY_DAYS: i64 = 365;

/// Builder for an ECDSA P-384 key pair and code-signing leaf certificate
///
/// # Examples
/// ```rust,no_run
/// # use content_signature_chain::error::Result;
/// # use openssl::pkey::{PKey, Private};
/// # use openssl::x509::X509;
/// # fn example(intermediate_key: PKey<Private>, intermediate_cert: X509) -> Result<()> {
/// use content_signature_chain::generate_leaf::EcLeafBuilder;
///
/// let (leaf_key, leaf_cert) = EcLeafBuilder::new(&intermediate_key, &intermediate_cert)
///     .subject_common_name("aus.content-signature.mozilla.org".to_string())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct EcLeafBuilder<'a> {
    subject_common_name: String,
    organization: String,
    organizational_unit: String,
    locality: String,
    country: String,
    not_before: i64,
    not_after: i64,
    signing_key: &'a PKeyRef<Private>,
    signing_cert: &'a X509Ref,
}

impl<'a> EcLeafBuilder<'a> {
    /// Create a leaf builder
    ///
    /// # Arguments
    /// * `ca_key` - Issuing intermediate's private key
    /// * `ca_cert` - Issuing intermediate's certificate (issuer name and key id)
    pub fn new(ca_key: &'a PKeyRef<Private>, ca_cert: &'a X509Ref) -> Self {
        let now = Utc::now();
        Self {
            subject_common_name: String::new(),
            organization: ORGANIZATION.to_string(),
            organizational_unit: LEAF_ORGANIZATIONAL_UNIT.to_string(),
            locality: LEAF_LOCALITY.to_string(),
            country: COUNTRY.to_string(),
            not_before: (now - Duration::days(LEAF_BACKDATE_DAYS)).timestamp(),
            not_after: (now + Duration::days(LEAF_VALIDITY_DAYS)).timestamp(),
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    /// Set the common name (CN), the name clients pin against
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Build the P-384 key pair and leaf certificate signed by the intermediate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, signed certificate)
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let role = CertificateRole::Leaf;
        let private_key = generate_p384_key(role)?;

        let subject_name = DistinguishedName {
            country: self.country,
            organization: self.organization,
            organizational_unit: self.organizational_unit,
            locality: Some(self.locality),
            common_name: self.subject_common_name,
        }
        .to_x509_name(role)?;

        let mut builder = certificate_builder(
            role,
            SerialNumber::Fixed(LEAF_SERIAL),
            &subject_name,
            self.signing_cert.subject_name(),
            Validity {
                not_before: self.not_before,
                not_after: self.not_after,
            },
            &private_key,
        )?;

        // digitalSignature only; the leaf signs content, never certificates
        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .build()
            .cert_context(role, "build KeyUsage")?;
        builder
            .append_extension(ku)
            .cert_context(role, "add KeyUsage")?;
        append_code_signing_eku(&mut builder, role)?;
        append_issuer_key_id(&mut builder, role, self.signing_cert)?;

        let certificate = sign_certificate(builder, role, self.signing_key)?;
        debug!(certificate = %role, "generated P-384 code-signing leaf");
        Ok((private_key, certificate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_intermediate_ca::{EcIntermediateCABuilder, Issuer};
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::nid::Nid;
    use openssl::x509::X509VerifyResult;
    use x509_parser::prelude::{FromDer, X509Certificate};

    #[test]
    fn test_leaf_profile() {
        let now = Utc::now().timestamp();
        let (ca_key, ca_cert) = EcIntermediateCABuilder::new(Issuer::SelfSigned {
            authority_key_id: &[],
        })
        .not_before(now - 60)
        .not_after(now + 86_400)
        .build()
        .unwrap();

        let (leaf_key, leaf) = EcLeafBuilder::new(&ca_key, &ca_cert)
            .subject_common_name("aus.content-signature.mozilla.org".to_string())
            .build()
            .unwrap();

        assert_eq!(ca_cert.issued(&leaf), X509VerifyResult::OK);
        assert!(leaf.verify(&ca_key).unwrap());
        assert!(leaf.public_key().unwrap().public_eq(&leaf_key));
        assert_eq!(
            leaf.serial_number().to_bn().unwrap(),
            BigNum::from_u32(1988).unwrap()
        );
        assert_eq!(leaf.signature_algorithm().object().nid(), Nid::ECDSA_WITH_SHA384);

        let cn = leaf
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "aus.content-signature.mozilla.org");

        let nine_days_ago = Asn1Time::from_unix(now - 9 * 86_400).unwrap();
        let eleven_days_ago = Asn1Time::from_unix(now - 11 * 86_400).unwrap();
        assert!(leaf.not_before() < nine_days_ago);
        assert!(leaf.not_before() > eleven_days_ago);
        let in_364_days = Asn1Time::from_unix(now + 364 * 86_400).unwrap();
        assert!(leaf.not_after() > in_364_days);

        let der = leaf.to_der().unwrap();
        let (_, parsed) = X509Certificate::from_der(&der).unwrap();
        assert!(parsed.basic_constraints().unwrap().is_none());
        assert!(leaf.subject_key_id().is_none());
        let ku = parsed.key_usage().unwrap().unwrap();
        assert!(ku.critical);
        assert!(ku.value.digital_signature());
        assert!(!ku.value.key_cert_sign());
        assert!(!ku.value.crl_sign());
        assert!(parsed.extended_key_usage().unwrap().unwrap().value.code_signing);
    }
}
