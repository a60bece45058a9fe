//! Content signatures over the leaf key.
//!
//! A content signature is ECDSA P-384 over
//! `SHA-384("Content-Signature:\0" || payload)`, carried as 96 raw bytes: `r`
//! then `s`, each left-padded with zeros to 48 bytes. OpenSSL produces the
//! DER `SEQUENCE { INTEGER r, INTEGER s }` form, so [`sign`] re-packs it.
//!
//! The module also owns the fingerprint format used for the root
//! (uppercase hex octets joined by `:`) and the `Content-Signature` header
//! value update clients read.

use crate::chain_builder::Chain;
use crate::error::{ChainError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use openssl::bn::{BigNum, BigNumRef};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKeyRef};
use openssl::sign::Signer;
use openssl::x509::X509;
use sha2::{Digest, Sha256, Sha384};

/// Domain-separation prefix hashed ahead of every payload.
pub const CONTENT_SIGNATURE_PREFIX: &[u8] = b"Content-Signature:\x00";

/// Width of one P-384 scalar.
pub const P384_SCALAR_LEN: usize = 48;

/// Width of an encoded signature (`r || s`).
pub const SIGNATURE_LEN: usize = 2 * P384_SCALAR_LEN;

/// `SHA-384(prefix || payload)`, the value the leaf key signs.
pub fn content_signature_digest(payload: &[u8]) -> [u8; 48] {
    let mut hasher = Sha384::new();
    hasher.update(CONTENT_SIGNATURE_PREFIX);
    hasher.update(payload);
    let mut digest = [0u8; 48];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Sign `payload` with the chain's leaf key.
///
/// ECDSA uses a fresh nonce per call, so two signatures of the same payload
/// differ; both verify.
///
/// # Errors
/// [`ChainError::SignatureEncoding`] if OpenSSL fails to sign or returns a
/// signature whose scalars do not fit in 48 bytes.
pub fn sign(chain: &Chain, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
    let encoding = |e: openssl::error::ErrorStack| ChainError::SignatureEncoding(e.to_string());

    let mut signer = Signer::new(MessageDigest::sha384(), chain.leaf_private_key()).map_err(encoding)?;
    signer.update(CONTENT_SIGNATURE_PREFIX).map_err(encoding)?;
    signer.update(payload).map_err(encoding)?;
    let der = signer.sign_to_vec().map_err(encoding)?;

    der_to_fixed_width(&der)
}

/// Convert a DER ECDSA signature to the fixed 96-byte `r || s` form.
pub fn der_to_fixed_width(der: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
    let signature = EcdsaSig::from_der(der)
        .map_err(|e| ChainError::SignatureEncoding(format!("malformed DER signature: {}", e)))?;

    let mut encoded = [0u8; SIGNATURE_LEN];
    let (r, s) = encoded.split_at_mut(P384_SCALAR_LEN);
    write_scalar(r, signature.r(), "r")?;
    write_scalar(s, signature.s(), "s")?;
    Ok(encoded)
}

fn write_scalar(field: &mut [u8], value: &BigNumRef, name: &str) -> Result<()> {
    let bytes = value.to_vec();
    if bytes.len() > field.len() {
        return Err(ChainError::SignatureEncoding(format!(
            "{} is {} bytes, wider than {}",
            name,
            bytes.len(),
            field.len()
        )));
    }
    let offset = field.len() - bytes.len();
    field[offset..].copy_from_slice(&bytes);
    Ok(())
}

/// Check a fixed-width signature against the leaf certificate published in
/// the chain's PEM bundle.
///
/// Returns `Ok(false)` for a well-formed signature that does not match.
pub fn verify(chain: &Chain, payload: &[u8], signature: &[u8]) -> Result<bool> {
    let bundle = X509::stack_from_pem(chain.pem_bundle().as_bytes())
        .map_err(|e| ChainError::Serialization(format!("PEM bundle: {}", e)))?;
    let leaf = bundle
        .first()
        .ok_or_else(|| ChainError::Serialization("PEM bundle is empty".to_string()))?;
    let public_key = leaf
        .public_key()
        .map_err(|e| ChainError::Serialization(format!("leaf public key: {}", e)))?;
    verify_with_key(&public_key, payload, signature)
}

/// Check a fixed-width signature against an EC public key.
pub fn verify_with_key<T: HasPublic>(
    public_key: &PKeyRef<T>,
    payload: &[u8],
    signature: &[u8],
) -> Result<bool> {
    if signature.len() != SIGNATURE_LEN {
        return Err(ChainError::SignatureEncoding(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    let encoding = |e: openssl::error::ErrorStack| ChainError::SignatureEncoding(e.to_string());

    let (r, s) = signature.split_at(P384_SCALAR_LEN);
    let r = BigNum::from_slice(r).map_err(encoding)?;
    let s = BigNum::from_slice(s).map_err(encoding)?;
    let signature = EcdsaSig::from_private_components(r, s).map_err(encoding)?;

    let ec_key = public_key.ec_key().map_err(encoding)?;
    signature
        .verify(&content_signature_digest(payload), &ec_key)
        .map_err(encoding)
}

/// The chain's root fingerprint.
pub fn root_fingerprint(chain: &Chain) -> &str {
    chain.root_fingerprint()
}

/// SHA-256 of `der`, formatted as uppercase hex octets joined by `:`.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    format_fingerprint(&Sha256::digest(der))
}

pub fn format_fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(":")
}

/// `Content-Signature` header value: `x5u=<url>;p384ecdsa=<base64url>`.
///
/// The signature is base64url without padding, so the value splits cleanly on
/// `;` and `=` as long as `x5u` contains neither.
pub fn content_signature_header(signature: &[u8], x5u: &str) -> String {
    format!("x5u={};p384ecdsa={}", x5u, URL_SAFE_NO_PAD.encode(signature))
}
