//! Protocol Module
//!
//! Request/response types for driving a [`ChainStore`] from outside the crate
//! (an HTTP router, the operator menu, a test harness) plus their JSON
//! serialization.
//!
//! Every request is answered; failures come back as [`Response::Error`] with
//! the published chain left as it was.

use crate::certificate_model::{CertificateModel, CertificateRole};
use crate::chain_state::ChainStore;
use crate::error::ChainError;
use crate::signature_codec::content_signature_header;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Request types from external callers
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Replace the published chain with one built from `model`.
    Regenerate { model: CertificateModel },
    /// Sign a payload given as standard base64.
    Sign { payload: String },
    RootFingerprint,
    CertificateChain,
    ChainStatus,
}

/// Response types sent back to callers
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    RegenerateResponse {
        message: String,
        generation: u64,
        layout: Vec<CertificateRole>,
        root_fingerprint: String,
    },
    SignResponse {
        message: String,
        /// 96-byte `r || s`, standard base64.
        signature: String,
        /// Value for the `Content-Signature` header.
        content_signature: String,
    },
    RootFingerprintResponse {
        root_fingerprint: String,
    },
    CertificateChainResponse {
        pem_bundle: String,
    },
    ChainStatusResponse {
        generation: u64,
        layout: Vec<CertificateRole>,
        root_fingerprint: String,
    },
    Error {
        message: String,
    },
}

/// Answers [`Request`]s against a shared chain store.
pub struct Protocol {
    store: Arc<ChainStore>,
    x5u: String,
}

impl Protocol {
    /// # Arguments
    /// * `store` - The published chain
    /// * `x5u` - URL clients fetch the PEM bundle from, echoed in signature headers
    pub fn new(store: Arc<ChainStore>, x5u: String) -> Self {
        Self { store, x5u }
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    pub fn process_request(&self, request: Request) -> Response {
        debug!(request = ?request, "processing request");
        match request {
            Request::Regenerate { model } => match self.store.regenerate(&model) {
                Ok(snapshot) => Response::RegenerateResponse {
                    message: "Chain regenerated".to_string(),
                    generation: snapshot.generation,
                    layout: snapshot.chain.layout().to_vec(),
                    root_fingerprint: snapshot.chain.root_fingerprint().to_string(),
                },
                Err(e) => error_response(e),
            },
            Request::Sign { payload } => {
                let payload = match STANDARD.decode(payload.as_bytes()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        return Response::Error {
                            message: format!("payload is not valid base64: {}", e),
                        }
                    }
                };
                match self.store.sign(&payload) {
                    Ok(signature) => Response::SignResponse {
                        message: format!("Signed {} bytes", payload.len()),
                        signature: STANDARD.encode(signature),
                        content_signature: content_signature_header(&signature, &self.x5u),
                    },
                    Err(e) => error_response(e),
                }
            }
            Request::RootFingerprint => Response::RootFingerprintResponse {
                root_fingerprint: self.store.root_fingerprint(),
            },
            Request::CertificateChain => Response::CertificateChainResponse {
                pem_bundle: self.store.pem_bundle(),
            },
            Request::ChainStatus => {
                let snapshot = self.store.snapshot();
                Response::ChainStatusResponse {
                    generation: snapshot.generation,
                    layout: snapshot.chain.layout().to_vec(),
                    root_fingerprint: snapshot.chain.root_fingerprint().to_string(),
                }
            }
        }
    }

    /// Decode a JSON request, process it and encode the JSON response.
    ///
    /// A body that is not a valid request is answered with
    /// [`Response::Error`].
    pub fn handle_json(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let response = match deserialize_request(bytes) {
            Ok(request) => self.process_request(request),
            Err(e) => Response::Error {
                message: format!("invalid request: {:#}", e),
            },
        };
        serialize_response(&response)
    }
}

fn error_response(err: ChainError) -> Response {
    Response::Error {
        message: err.to_string(),
    }
}

/// Serialize a Request to JSON bytes
///
/// # Example
/// ```no_run
/// use content_signature_chain::protocol::{Request, serialize_request};
///
/// let bytes = serialize_request(&Request::RootFingerprint)?;
/// assert_eq!(bytes, br#"{"type":"RootFingerprint"}"#);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn serialize_request(request: &Request) -> Result<Vec<u8>> {
    serde_json::to_vec(request).context("Failed to serialize request to JSON")
}

/// Deserialize JSON bytes to a Request
///
/// # Example
/// ```no_run
/// use content_signature_chain::protocol::deserialize_request;
///
/// let request = deserialize_request(br#"{"type":"ChainStatus"}"#)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn deserialize_request(bytes: &[u8]) -> Result<Request> {
    let json_str = std::str::from_utf8(bytes).context("Failed to decode request bytes as UTF-8")?;

    let request: Request =
        serde_json::from_str(json_str).context("Failed to deserialize JSON to Request")?;

    Ok(request)
}

/// Serialize a Response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>> {
    serde_json::to_vec(response).context("Failed to serialize response to JSON")
}

/// Deserialize JSON bytes to a Response
pub fn deserialize_response(bytes: &[u8]) -> Result<Response> {
    let json_str =
        std::str::from_utf8(bytes).context("Failed to decode response bytes as UTF-8")?;

    let response: Response =
        serde_json::from_str(json_str).context("Failed to deserialize JSON to Response")?;

    Ok(response)
}
