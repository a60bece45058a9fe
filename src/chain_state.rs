//! The published chain.
//!
//! Readers take an `Arc` snapshot and keep using it for as long as they need;
//! a rebuild never mutates a chain someone is holding. [`ChainStore::regenerate`]
//! builds the replacement first and swaps it in only on success, so a failed
//! rebuild leaves the previous chain in place.

use crate::certificate_model::CertificateModel;
use crate::chain_builder::{build, Chain};
use crate::error::Result;
use crate::signature_codec::{self, SIGNATURE_LEN};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// A chain together with how many times the store has published.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub chain: Arc<Chain>,
    /// 1 for the chain built by [`ChainStore::new`], incremented per
    /// successful regeneration.
    pub generation: u64,
}

pub struct ChainStore {
    current: RwLock<Snapshot>,
}

impl ChainStore {
    /// Build the initial chain from `model` and publish it.
    pub fn new(model: &CertificateModel) -> Result<Self> {
        let chain = build(model)?;
        info!(root_fingerprint = %chain.root_fingerprint(), "published initial chain");
        Ok(Self::from_chain(chain))
    }

    /// Publish an already built chain as generation 1.
    pub fn from_chain(chain: Chain) -> Self {
        Self {
            current: RwLock::new(Snapshot {
                chain: Arc::new(chain),
                generation: 1,
            }),
        }
    }

    /// Rebuild from `model` and publish the result.
    ///
    /// On failure the error is returned and the previously published chain
    /// stays current.
    pub fn regenerate(&self, model: &CertificateModel) -> Result<Snapshot> {
        let chain = match build(model) {
            Ok(chain) => Arc::new(chain),
            Err(e) => {
                warn!(error = %e, "chain rebuild failed, keeping the published chain");
                return Err(e);
            }
        };

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = current.generation + 1;
        *current = Snapshot { chain, generation };
        info!(
            generation = current.generation,
            root_fingerprint = %current.chain.root_fingerprint(),
            "published regenerated chain"
        );
        Ok(current.clone())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current(&self) -> Arc<Chain> {
        self.snapshot().chain
    }

    /// Sign with the leaf key of the chain current at the time of the call.
    pub fn sign(&self, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
        signature_codec::sign(&self.current(), payload)
    }

    pub fn root_fingerprint(&self) -> String {
        self.current().root_fingerprint().to_string()
    }

    pub fn pem_bundle(&self) -> String {
        self.current().pem_bundle().to_string()
    }
}
