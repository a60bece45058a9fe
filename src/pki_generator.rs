//! Shared certificate plumbing used by the per-role builders.
//!
//! Key generation, distinguished names, serial numbers, validity windows and
//! the handful of X.509v3 extensions the content-signature profile needs. Every
//! helper reports failures against the [`CertificateRole`] being built.

use crate::certificate_model::CertificateRole;
use crate::error::{ChainError, Result};
use bcder::encode::{self, Values};
use bcder::{Mode, OctetString, Tag};
use openssl::asn1::{Asn1Time, Asn1Type};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameRef, X509Ref, X509};

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub(crate) const RSA_KEY_SIZE: u32 = 4096;
pub(crate) const RANDOM_SERIAL_BITS: i32 = 128;

pub(crate) const COUNTRY: &str = "Mozilia";
pub(crate) const ORGANIZATION: &str = "Mozilla";

/// Attach the failing certificate and step to an openssl error.
pub(crate) trait CertContext<T> {
    fn cert_context(self, role: CertificateRole, step: &str) -> Result<T>;
}

impl<T> CertContext<T> for std::result::Result<T, ErrorStack> {
    fn cert_context(self, role: CertificateRole, step: &str) -> Result<T> {
        self.map_err(|e| ChainError::signing(role.label(), format!("{}: {}", step, e)))
    }
}

pub(crate) fn generate_rsa_key(role: CertificateRole) -> Result<PKey<Private>> {
    let rsa =
        Rsa::generate(RSA_KEY_SIZE).map_err(|e| ChainError::key_generation(role.label(), e))?;
    PKey::from_rsa(rsa).map_err(|e| ChainError::key_generation(role.label(), e))
}

pub(crate) fn generate_p384_key(role: CertificateRole) -> Result<PKey<Private>> {
    let group = EcGroup::from_curve_name(Nid::SECP384R1)
        .map_err(|e| ChainError::key_generation(role.label(), e))?;
    let ec_key = EcKey::generate(&group).map_err(|e| ChainError::key_generation(role.label(), e))?;
    PKey::from_ec_key(ec_key).map_err(|e| ChainError::key_generation(role.label(), e))
}

/// Subject fields in the order they are encoded (C, O, OU, L, CN).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DistinguishedName {
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: Option<String>,
    pub common_name: String,
}

impl DistinguishedName {
    pub(crate) fn to_x509_name(&self, role: CertificateRole) -> Result<X509Name> {
        let mut name_builder = X509Name::builder().cert_context(role, "create name builder")?;

        // Written as a PrintableString so the value is not held to the
        // two-letter ISO country code length.
        name_builder
            .append_entry_by_nid_with_type(Nid::COUNTRYNAME, &self.country, Asn1Type::PRINTABLESTRING)
            .cert_context(role, "set country")?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, &self.organization)
            .cert_context(role, "set organization")?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, &self.organizational_unit)
            .cert_context(role, "set organizational unit")?;
        if let Some(locality) = &self.locality {
            name_builder
                .append_entry_by_nid(Nid::LOCALITYNAME, locality)
                .cert_context(role, "set locality")?;
        }
        // An empty CN is left out rather than encoded as a zero-length string.
        if !self.common_name.is_empty() {
            name_builder
                .append_entry_by_nid(Nid::COMMONNAME, &self.common_name)
                .cert_context(role, "set CN")?;
        }

        Ok(name_builder.build())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SerialNumber {
    Fixed(u32),
    Random,
}

/// Unix-second validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Validity {
    pub not_before: i64,
    pub not_after: i64,
}

/// Start an X.509v3 certificate with everything except extensions filled in.
pub(crate) fn certificate_builder(
    role: CertificateRole,
    serial: SerialNumber,
    subject: &X509NameRef,
    issuer: &X509NameRef,
    validity: Validity,
    public_key: &PKeyRef<Private>,
) -> Result<X509Builder> {
    let mut builder = X509::builder().cert_context(role, "create X509 builder")?;

    builder
        .set_version(X509_VERSION_3)
        .cert_context(role, "set version")?;

    let serial = match serial {
        SerialNumber::Fixed(value) => BigNum::from_u32(value).cert_context(role, "create serial")?,
        SerialNumber::Random => {
            let mut serial = BigNum::new().cert_context(role, "create serial")?;
            serial
                .rand(RANDOM_SERIAL_BITS, MsbOption::MAYBE_ZERO, false)
                .cert_context(role, "randomize serial")?;
            serial
        }
    };
    let asn1_serial = serial
        .to_asn1_integer()
        .cert_context(role, "encode serial")?;
    builder
        .set_serial_number(&asn1_serial)
        .cert_context(role, "set serial")?;

    builder
        .set_subject_name(subject)
        .cert_context(role, "set subject")?;
    builder
        .set_issuer_name(issuer)
        .cert_context(role, "set issuer")?;

    let not_before = Asn1Time::from_unix(validity.not_before).cert_context(role, "create not_before")?;
    builder
        .set_not_before(&not_before)
        .cert_context(role, "set not_before")?;
    let not_after = Asn1Time::from_unix(validity.not_after).cert_context(role, "create not_after")?;
    builder
        .set_not_after(&not_after)
        .cert_context(role, "set not_after")?;

    builder
        .set_pubkey(public_key)
        .cert_context(role, "set public key")?;

    Ok(builder)
}

/// Basic constraints CA=true and key usage keyCertSign + cRLSign, both critical.
pub(crate) fn append_ca_extensions(builder: &mut X509Builder, role: CertificateRole) -> Result<()> {
    let bc = BasicConstraints::new()
        .critical()
        .ca()
        .build()
        .cert_context(role, "build BasicConstraints")?;
    builder
        .append_extension(bc)
        .cert_context(role, "add BasicConstraints")?;

    let ku = KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .build()
        .cert_context(role, "build KeyUsage")?;
    builder
        .append_extension(ku)
        .cert_context(role, "add KeyUsage")?;
    Ok(())
}

pub(crate) fn append_code_signing_eku(builder: &mut X509Builder, role: CertificateRole) -> Result<()> {
    let eku = ExtendedKeyUsage::new()
        .code_signing()
        .build()
        .cert_context(role, "build ExtendedKeyUsage")?;
    builder
        .append_extension(eku)
        .cert_context(role, "add ExtendedKeyUsage")
}

/// Subject key identifier hashed from the builder's public key.
pub(crate) fn append_subject_key_id(builder: &mut X509Builder, role: CertificateRole) -> Result<()> {
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .cert_context(role, "build SubjectKeyIdentifier")?;
    builder
        .append_extension(ski)
        .cert_context(role, "add SubjectKeyIdentifier")
}

/// Authority key identifier copied from the issuer's subject key identifier.
pub(crate) fn append_issuer_key_id(
    builder: &mut X509Builder,
    role: CertificateRole,
    issuer: &X509Ref,
) -> Result<()> {
    let aki = AuthorityKeyIdentifier::new()
        .keyid(true)
        .build(&builder.x509v3_context(Some(issuer), None))
        .cert_context(role, "build AuthorityKeyIdentifier")?;
    builder
        .append_extension(aki)
        .cert_context(role, "add AuthorityKeyIdentifier")
}

/// Authority key identifier carrying caller-supplied bytes. Self-signed
/// certificates take theirs from the model; an empty id adds nothing.
pub(crate) fn append_raw_authority_key_id(
    builder: &mut X509Builder,
    role: CertificateRole,
    key_id: &[u8],
) -> Result<()> {
    if key_id.is_empty() {
        return Ok(());
    }
    #[allow(deprecated)]
    let aki = X509Extension::new_nid(
        None,
        None,
        Nid::AUTHORITY_KEY_IDENTIFIER,
        &format!("DER:{}", hex::encode(authority_key_id_der(key_id))),
    )
    .cert_context(role, "build AuthorityKeyIdentifier")?;
    builder
        .append_extension(aki)
        .cert_context(role, "add AuthorityKeyIdentifier")
}

/// `AuthorityKeyIdentifier ::= SEQUENCE { keyIdentifier [0] IMPLICIT OCTET STRING }`
fn authority_key_id_der(key_id: &[u8]) -> Vec<u8> {
    encode::sequence(OctetString::encode_slice_as(key_id, Tag::CTX_0))
        .to_captured(Mode::Der)
        .as_slice()
        .to_vec()
}

/// Permitted DNS subtrees; names outside them are rejected below this CA.
pub(crate) fn append_name_constraints(
    builder: &mut X509Builder,
    role: CertificateRole,
    permitted_dns_domains: &[String],
) -> Result<()> {
    if permitted_dns_domains.is_empty() {
        return Ok(());
    }
    let value = permitted_dns_domains
        .iter()
        .map(|domain| format!("permitted;DNS:{}", domain))
        .collect::<Vec<_>>()
        .join(",");
    #[allow(deprecated)]
    let nc = X509Extension::new_nid(
        None,
        Some(&builder.x509v3_context(None, None)),
        Nid::NAME_CONSTRAINTS,
        &value,
    )
    .cert_context(role, "build NameConstraints")?;
    builder
        .append_extension(nc)
        .cert_context(role, "add NameConstraints")
}

/// All certificates in the profile are signed over SHA-384.
pub(crate) fn sign_certificate(
    mut builder: X509Builder,
    role: CertificateRole,
    signing_key: &PKeyRef<Private>,
) -> Result<X509> {
    builder
        .sign(signing_key, MessageDigest::sha384())
        .cert_context(role, "sign certificate")?;
    Ok(builder.build())
}
