//! Error type shared by chain generation and content signing.

use openssl::error::ErrorStack;
use thiserror::Error;

/// Everything that can go wrong while building a chain or signing with it.
///
/// Build errors carry the role of the certificate that failed so a caller
/// can tell a root failure from a leaf failure without parsing messages.
///
/// NOTE: openssl's `ErrorStack` is captured as a string; it is neither
/// `Clone` nor `Eq`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// RSA or ECDSA key pair generation failed.
    #[error("failed to generate key pair for {certificate}: {reason}")]
    KeyGeneration {
        certificate: &'static str,
        reason: String,
    },

    /// The certificate could not be assembled or signed.
    #[error("failed to create {certificate} certificate: {reason}")]
    CertificateSigning {
        certificate: &'static str,
        reason: String,
    },

    /// A produced signature could not be re-packed into the fixed-width form.
    #[error("signature encoding failed: {0}")]
    SignatureEncoding(String),

    /// PEM or DER encoding of a certificate failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A reconfiguration request carried a model that could not be decoded.
    #[error("invalid certificate model: {0}")]
    InvalidModel(String),
}

impl ChainError {
    pub(crate) fn key_generation(certificate: &'static str, err: ErrorStack) -> Self {
        Self::KeyGeneration {
            certificate,
            reason: err.to_string(),
        }
    }

    pub(crate) fn signing(certificate: &'static str, reason: impl ToString) -> Self {
        Self::CertificateSigning {
            certificate,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
