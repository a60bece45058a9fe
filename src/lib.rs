//! Content Signature Chain - synthetic X.509 chains for content signing
//!
//! Generates throw-away certificate chains shaped like the ones an update
//! server uses to sign content, and signs payloads with the chain's leaf key
//! in the `p384ecdsa` content-signature format. Clients under test fetch the
//! PEM bundle, pin the root fingerprint, and verify signatures.
//!
//! # Overview
//!
//! ```text
//! Root CA (RSA-4096, self-signed)
//!   └── Intermediate CA (ECDSA P-384, name-constrained)
//!       └── [Second Intermediate CA]
//!           └── Leaf (ECDSA P-384, code signing)
//! ```
//!
//! A [`CertificateModel`](certificate_model::CertificateModel) can add decoys
//! a correct client must ignore:
//! - an **irrelevant root**, a second self-signed RSA root placed just before
//!   or just after the real one;
//! - an **irrelevant intermediate**, self-signed under the same subject as the
//!   first intermediate, placed around the second intermediate.
//!
//! Every build generates fresh keys for every certificate.
//!
//! # Quick Start
//!
//! ## As an Application
//!
//! ```bash
//! cargo build --release
//! ./target/release/content-signature-chain            # reads ./config.toml if present
//! ./target/release/content-signature-chain my.toml
//! ```
//!
//! The binary exports `exports/chain.pem` and `exports/root_fingerprint.txt`
//! and then offers a menu to rebuild the chain or sign files.
//!
//! ## As a Library
//!
//! ```no_run
//! use content_signature_chain::certificate_model::CertificateModel;
//! use content_signature_chain::chain_state::ChainStore;
//! use content_signature_chain::signature_codec::content_signature_header;
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = ChainStore::new(&CertificateModel::default())?;
//!     println!("root: {}", store.root_fingerprint());
//!
//!     let signature = store.sign(br#"{"data":[]}"#)?;
//!     println!(
//!         "Content-Signature: {}",
//!         content_signature_header(&signature, "https://example.com/chain.pem")
//!     );
//!
//!     // Swap in a chain with an irrelevant root on top
//!     store.regenerate(&CertificateModel {
//!         additional_root: true,
//!         additional_root_top_or_bot: true,
//!         ..CertificateModel::default()
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`certificate_model`]: build input, its JSON wire form and decoy placement
//! - [`generate_root_ca`], [`generate_intermediate_ca`], [`generate_leaf`]:
//!   one builder per certificate profile over shared extension plumbing
//! - [`chain_builder`]: [`build`](chain_builder::build) a [`Chain`](chain_builder::Chain)
//!   and lay out its PEM bundle
//! - [`signature_codec`]: sign, verify, fixed-width encoding, fingerprints
//! - [`chain_state`]: the published chain and atomic regeneration
//! - [`protocol`]: JSON request/response interface over the store
//! - [`configs`]: TOML configuration for the binary
//!
//! # Signature Format
//!
//! The leaf key signs `SHA-384("Content-Signature:\0" || payload)`. The
//! signature is the 48-byte `r` followed by the 48-byte `s`, both big-endian
//! and left-padded with zeros, not the DER structure OpenSSL emits.
//!
//! # Error Handling
//!
//! Library operations return [`error::Result`], whose
//! [`ChainError`](error::ChainError) names the certificate that failed to
//! build. The binary and configuration loading use `anyhow`.

pub mod certificate_model;
pub mod chain_builder;
pub mod chain_state;
pub mod configs;
pub mod error;
pub mod generate_intermediate_ca;
pub mod generate_leaf;
pub mod generate_root_ca;
mod pki_generator;
pub mod protocol;
pub mod signature_codec;
