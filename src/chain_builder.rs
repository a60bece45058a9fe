//! Chain Builder Module
//!
//! Turns a [`CertificateModel`] into a [`Chain`]: every certificate the model
//! asks for is generated and signed along the issuance graph, then the bundle
//! is written in the order update clients parse it:
//!
//! ```text
//! leaf
//! intermediate
//! [irrelevant intermediate]   (before the second intermediate)
//! [second intermediate]
//! [irrelevant intermediate]   (after the second intermediate)
//! [irrelevant root]           (before the root)
//! root
//! [irrelevant root]           (after the root)
//! ```
//!
//! Keys and certificates not referenced by the finished chain are dropped when
//! [`build`] returns. Nothing is published on failure; publishing is the job of
//! [`ChainStore`](crate::chain_state::ChainStore).

use crate::certificate_model::{CertificateModel, CertificateRole, DecoyPlacement, Position};
use crate::error::{ChainError, Result};
use crate::generate_intermediate_ca::{EcIntermediateCABuilder, Issuer};
use crate::generate_leaf::EcLeafBuilder;
use crate::generate_root_ca::{RsaRootCABuilder, IRRELEVANT_ROOT_CA_COMMON_NAME};
use crate::signature_codec::sha256_fingerprint;
use chrono::{Duration, Utc};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::{X509Ref, X509};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

const CA_VALIDITY_DAYS: i64 = 365;

/// A generated certificate chain together with the leaf's signing key.
///
/// The three parts always come from the same build; a `Chain` is never
/// modified after [`build`] returns it.
pub struct Chain {
    pem_bundle: String,
    leaf_private_key: PKey<Private>,
    root_fingerprint: String,
    layout: Vec<CertificateRole>,
}

impl Chain {
    /// Concatenated PEM blocks, leaf first.
    pub fn pem_bundle(&self) -> &str {
        &self.pem_bundle
    }

    pub fn leaf_private_key(&self) -> &PKeyRef<Private> {
        &self.leaf_private_key
    }

    /// SHA-256 of the root's DER, as `AB:CD:...`.
    pub fn root_fingerprint(&self) -> &str {
        &self.root_fingerprint
    }

    /// Role of each PEM block, in bundle order.
    pub fn layout(&self) -> &[CertificateRole] {
        &self.layout
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("layout", &self.layout)
            .field("root_fingerprint", &self.root_fingerprint)
            .field("leaf_private_key", &"<redacted>")
            .finish()
    }
}

/// Generate every certificate `model` calls for and assemble the bundle.
///
/// # Errors
/// The first key generation or signing failure aborts the build and names the
/// certificate that failed. PEM or DER encoding failures surface as
/// [`ChainError::Serialization`].
pub fn build(model: &CertificateModel) -> Result<Chain> {
    let ca_not_after = (Utc::now() + Duration::days(CA_VALIDITY_DAYS)).timestamp();

    let (root_key, root_cert) = root_ca(model, ca_not_after).build()?;
    let irrelevant_root = if model.additional_root {
        Some(irrelevant_root_ca(model, ca_not_after).build()?.1)
    } else {
        None
    };

    let (intermediate_key, intermediate_cert) =
        intermediate_ca(&root_key, &root_cert, model, ca_not_after).build()?;
    let second_intermediate = if model.additional_intermediate {
        Some(second_intermediate_ca(&intermediate_key, &intermediate_cert, model, ca_not_after).build()?)
    } else {
        None
    };
    let irrelevant_intermediate = if model.additional_irrelevant_intermediate {
        Some(irrelevant_intermediate_ca(model, ca_not_after).build()?.1)
    } else {
        None
    };

    let (leaf_issuer_key, leaf_issuer_cert) = match &second_intermediate {
        Some((key, cert)) => (key, cert),
        None => (&intermediate_key, &intermediate_cert),
    };
    let (leaf_private_key, leaf_cert) = leaf(leaf_issuer_key, leaf_issuer_cert, model).build()?;

    let root_der = root_cert
        .to_der()
        .map_err(|e| ChainError::Serialization(format!("root certificate DER: {}", e)))?;
    let root_fingerprint = sha256_fingerprint(&root_der);

    let mut certificates: HashMap<CertificateRole, X509> = HashMap::new();
    certificates.insert(CertificateRole::Leaf, leaf_cert);
    certificates.insert(CertificateRole::Intermediate, intermediate_cert);
    certificates.insert(CertificateRole::Root, root_cert);
    if let Some((_, cert)) = second_intermediate {
        certificates.insert(CertificateRole::SecondIntermediate, cert);
    }
    if let Some(cert) = irrelevant_intermediate {
        certificates.insert(CertificateRole::IrrelevantIntermediate, cert);
    }
    if let Some(cert) = irrelevant_root {
        certificates.insert(CertificateRole::IrrelevantRoot, cert);
    }

    let layout = assemble_layout(&model.trust_path(), &model.decoy_placements());
    let pem_bundle = encode_bundle(&layout, &certificates)?;

    info!(
        subject = %model.subject,
        layout = ?layout,
        root_fingerprint = %root_fingerprint,
        "built content-signature chain"
    );

    Ok(Chain {
        pem_bundle,
        leaf_private_key,
        root_fingerprint,
        layout,
    })
}

// ================= Per-role templates =================

fn root_ca(model: &CertificateModel, not_after: i64) -> RsaRootCABuilder {
    RsaRootCABuilder::new()
        .not_before(model.not_before.timestamp())
        .not_after(not_after)
        .authority_key_id(model.authority_key_id.clone())
}

fn irrelevant_root_ca(model: &CertificateModel, not_after: i64) -> RsaRootCABuilder {
    root_ca(model, not_after)
        .role(CertificateRole::IrrelevantRoot)
        .subject_common_name(IRRELEVANT_ROOT_CA_COMMON_NAME.to_string())
}

fn intermediate_ca<'a>(
    root_key: &'a PKeyRef<Private>,
    root_cert: &'a X509Ref,
    model: &CertificateModel,
    not_after: i64,
) -> EcIntermediateCABuilder<'a> {
    EcIntermediateCABuilder::new(Issuer::Ca {
        key: root_key,
        certificate: root_cert,
    })
    .not_before(model.not_before.timestamp())
    .not_after(not_after)
}

fn second_intermediate_ca<'a>(
    intermediate_key: &'a PKeyRef<Private>,
    intermediate_cert: &'a X509Ref,
    model: &CertificateModel,
    not_after: i64,
) -> EcIntermediateCABuilder<'a> {
    intermediate_ca(intermediate_key, intermediate_cert, model, not_after)
        .role(CertificateRole::SecondIntermediate)
}

/// Self-signed, under the first intermediate's subject.
fn irrelevant_intermediate_ca(model: &CertificateModel, not_after: i64) -> EcIntermediateCABuilder<'_> {
    EcIntermediateCABuilder::new(Issuer::SelfSigned {
        authority_key_id: &model.authority_key_id,
    })
    .role(CertificateRole::IrrelevantIntermediate)
    .not_before(model.not_before.timestamp())
    .not_after(not_after)
}

fn leaf<'a>(
    issuer_key: &'a PKeyRef<Private>,
    issuer_cert: &'a X509Ref,
    model: &CertificateModel,
) -> EcLeafBuilder<'a> {
    EcLeafBuilder::new(issuer_key, issuer_cert).subject_common_name(model.subject.clone())
}

// ================= Bundle assembly =================

/// Interleave decoys with the trust path. A placement whose anchor is not on
/// the path is dropped.
pub(crate) fn assemble_layout(
    trust_path: &[CertificateRole],
    placements: &[DecoyPlacement],
) -> Vec<CertificateRole> {
    let mut layout = Vec::with_capacity(trust_path.len() + placements.len());
    for anchor in trust_path {
        let around = |position: Position| {
            placements
                .iter()
                .filter(move |p| p.anchor == *anchor && p.position == position)
                .map(|p| p.decoy)
        };
        layout.extend(around(Position::Before));
        layout.push(*anchor);
        layout.extend(around(Position::After));
    }
    layout
}

fn encode_bundle(
    layout: &[CertificateRole],
    certificates: &HashMap<CertificateRole, X509>,
) -> Result<String> {
    let mut bundle = String::new();
    for role in layout {
        let certificate = certificates.get(role).ok_or_else(|| {
            ChainError::Serialization(format!("{} certificate was not generated", role))
        })?;
        let pem = certificate
            .to_pem()
            .map_err(|e| ChainError::Serialization(format!("{} certificate PEM: {}", role, e)))?;
        let pem = String::from_utf8(pem)
            .map_err(|e| ChainError::Serialization(format!("{} certificate PEM: {}", role, e)))?;
        bundle.push_str(&pem);
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_intermediate_ca::INTERMEDIATE_CA_COMMON_NAME;
    use crate::generate_root_ca::ROOT_CA_COMMON_NAME;
    use openssl::nid::Nid;
    use openssl::sha::sha256;
    use openssl::stack::Stack;
    use openssl::x509::store::X509StoreBuilder;
    use openssl::x509::verify::X509VerifyFlags;
    use openssl::x509::{X509StoreContext, X509VerifyResult};
    use CertificateRole::*;

    fn parse_bundle(chain: &Chain) -> Vec<X509> {
        X509::stack_from_pem(chain.pem_bundle().as_bytes()).unwrap()
    }

    fn common_name(cert: &X509) -> String {
        cert.subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string()
    }

    /// Build a path from the bundle's first block with only `root` trusted and
    /// every other block offered as untrusted. Returns the DER of the verified
    /// path, leaf first.
    fn verified_path(bundle: &[X509], root: &X509) -> Option<Vec<Vec<u8>>> {
        let mut store = X509StoreBuilder::new().unwrap();
        store.add_cert(root.clone()).unwrap();
        store.set_flags(X509VerifyFlags::PARTIAL_CHAIN).unwrap();
        let store = store.build();

        let mut untrusted = Stack::new().unwrap();
        for cert in &bundle[1..] {
            untrusted.push(cert.clone()).unwrap();
        }

        let mut ctx = X509StoreContext::new().unwrap();
        ctx.init(&store, &bundle[0], &untrusted, |c| {
            if !c.verify_cert()? {
                return Ok(None);
            }
            Ok(c.chain().map(|path| {
                path.iter()
                    .map(|cert| cert.to_der().unwrap())
                    .collect::<Vec<_>>()
            }))
        })
        .unwrap()
    }

    fn ders(certs: &[&X509]) -> Vec<Vec<u8>> {
        certs.iter().map(|c| c.to_der().unwrap()).collect()
    }

    #[test]
    fn test_layout_without_decoys() {
        assert_eq!(
            assemble_layout(&[Leaf, Intermediate, Root], &[]),
            vec![Leaf, Intermediate, Root]
        );
    }

    #[test]
    fn test_layout_every_decoy_position() {
        let path = [Leaf, Intermediate, SecondIntermediate, Root];
        let before = |decoy, anchor| DecoyPlacement::new(decoy, Position::Before, anchor);
        let after = |decoy, anchor| DecoyPlacement::new(decoy, Position::After, anchor);

        assert_eq!(
            assemble_layout(
                &path,
                &[
                    before(IrrelevantIntermediate, SecondIntermediate),
                    before(IrrelevantRoot, Root)
                ]
            ),
            vec![Leaf, Intermediate, IrrelevantIntermediate, SecondIntermediate, IrrelevantRoot, Root]
        );
        assert_eq!(
            assemble_layout(
                &path,
                &[
                    after(IrrelevantIntermediate, SecondIntermediate),
                    after(IrrelevantRoot, Root)
                ]
            ),
            vec![Leaf, Intermediate, SecondIntermediate, IrrelevantIntermediate, Root, IrrelevantRoot]
        );
        // anchors missing from the path contribute nothing
        assert_eq!(
            assemble_layout(&[Leaf, Intermediate, Root], &[after(IrrelevantRoot, SecondIntermediate)]),
            vec![Leaf, Intermediate, Root]
        );
    }

    #[test]
    fn test_default_chain() {
        let chain = build(&CertificateModel::default()).unwrap();
        assert_eq!(chain.layout(), &[Leaf, Intermediate, Root]);

        let bundle = parse_bundle(&chain);
        assert_eq!(bundle.len(), 3);
        let (leaf, intermediate, root) = (&bundle[0], &bundle[1], &bundle[2]);

        assert_eq!(common_name(leaf), "aus.content-signature.mozilla.org");
        assert_eq!(common_name(intermediate), INTERMEDIATE_CA_COMMON_NAME);
        assert_eq!(common_name(root), ROOT_CA_COMMON_NAME);
        assert_eq!(intermediate.issued(leaf), X509VerifyResult::OK);
        assert_eq!(root.issued(intermediate), X509VerifyResult::OK);

        assert_eq!(
            verified_path(&bundle, root),
            Some(ders(&[leaf, intermediate, root]))
        );
        assert!(leaf.public_key().unwrap().public_eq(chain.leaf_private_key()));
        assert_eq!(
            root.authority_key_id().unwrap().as_slice(),
            &[1, 3, 6, 1, 5, 5, 7, 3, 3]
        );
    }

    #[test]
    fn test_pem_framing() {
        let chain = build(&CertificateModel::default()).unwrap();
        let pem = chain.pem_bundle();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
        assert_eq!(pem.matches("-----BEGIN CERTIFICATE-----").count(), 3);
        assert!(!pem.contains("\n\n"));
    }

    #[test]
    fn test_fingerprint_matches_root_block() {
        let chain = build(&CertificateModel::default()).unwrap();
        let bundle = parse_bundle(&chain);
        let root = bundle.last().unwrap();

        let fingerprint = chain.root_fingerprint();
        assert_eq!(fingerprint.len(), 32 * 2 + 31);
        assert_eq!(fingerprint.matches(':').count(), 31);
        assert!(fingerprint
            .split(':')
            .all(|octet| octet.len() == 2
                && octet.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))));

        let digest = sha256(&root.to_der().unwrap());
        let expected = digest
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        assert_eq!(fingerprint, expected);
    }

    #[test]
    fn test_additional_intermediate() {
        let model = CertificateModel {
            additional_intermediate: true,
            ..CertificateModel::default()
        };
        let chain = build(&model).unwrap();
        assert_eq!(chain.layout(), &[Leaf, Intermediate, SecondIntermediate, Root]);

        let bundle = parse_bundle(&chain);
        assert_eq!(bundle.len(), 4);
        let (leaf, first, second, root) = (&bundle[0], &bundle[1], &bundle[2], &bundle[3]);
        assert_eq!(second.issued(leaf), X509VerifyResult::OK);
        assert_ne!(first.issued(leaf), X509VerifyResult::OK);
        assert_eq!(first.issued(second), X509VerifyResult::OK);
        assert_eq!(
            second.signature_algorithm().object().nid(),
            Nid::ECDSA_WITH_SHA384
        );
        assert_eq!(
            verified_path(&bundle, root),
            Some(ders(&[leaf, second, first, root]))
        );
    }

    #[test]
    fn test_irrelevant_root_before_and_after_root() {
        for top in [true, false] {
            let model = CertificateModel {
                additional_root: true,
                additional_root_top_or_bot: top,
                ..CertificateModel::default()
            };
            let chain = build(&model).unwrap();
            let bundle = parse_bundle(&chain);
            assert_eq!(bundle.len(), 4);

            let (decoy_index, root_index) = if top { (2, 3) } else { (3, 2) };
            let decoy = &bundle[decoy_index];
            let root = &bundle[root_index];
            assert_eq!(common_name(decoy), IRRELEVANT_ROOT_CA_COMMON_NAME);
            assert_eq!(common_name(root), ROOT_CA_COMMON_NAME);
            assert_eq!(chain.layout()[decoy_index], IrrelevantRoot);

            for cert in &bundle {
                if cert.to_der().unwrap() != decoy.to_der().unwrap() {
                    assert_ne!(decoy.issued(cert), X509VerifyResult::OK);
                }
            }
            assert_eq!(
                verified_path(&bundle, root),
                Some(ders(&[&bundle[0], &bundle[1], root]))
            );
        }
    }

    #[test]
    fn test_irrelevant_intermediate_positions() {
        for top in [true, false] {
            let model = CertificateModel {
                additional_intermediate: true,
                additional_irrelevant_intermediate: true,
                additional_irrelevant_intermediate_top_or_bot: top,
                ..CertificateModel::default()
            };
            let chain = build(&model).unwrap();
            let expected = if top {
                vec![Leaf, Intermediate, IrrelevantIntermediate, SecondIntermediate, Root]
            } else {
                vec![Leaf, Intermediate, SecondIntermediate, IrrelevantIntermediate, Root]
            };
            assert_eq!(chain.layout(), expected.as_slice());

            let bundle = parse_bundle(&chain);
            let decoy_index = if top { 2 } else { 3 };
            let second_index = if top { 3 } else { 2 };
            let decoy = &bundle[decoy_index];
            let first = &bundle[1];

            assert_eq!(
                decoy.subject_name().to_der().unwrap(),
                first.subject_name().to_der().unwrap()
            );
            assert!(decoy.verify(&decoy.public_key().unwrap()).unwrap());
            assert_ne!(bundle[4].issued(decoy), X509VerifyResult::OK);
            assert_ne!(decoy.issued(&bundle[second_index]), X509VerifyResult::OK);
            assert_ne!(decoy.issued(&bundle[0]), X509VerifyResult::OK);

            assert_eq!(
                verified_path(&bundle, &bundle[4]),
                Some(ders(&[&bundle[0], &bundle[second_index], first, &bundle[4]]))
            );
        }
    }

    #[test]
    fn test_irrelevant_intermediate_without_second_intermediate() {
        for top in [true, false] {
            let model = CertificateModel {
                additional_irrelevant_intermediate: true,
                additional_irrelevant_intermediate_top_or_bot: top,
                ..CertificateModel::default()
            };
            let chain = build(&model).unwrap();
            assert_eq!(
                chain.layout(),
                &[Leaf, Intermediate, IrrelevantIntermediate, Root]
            );
            let bundle = parse_bundle(&chain);
            assert_eq!(
                verified_path(&bundle, &bundle[3]),
                Some(ders(&[&bundle[0], &bundle[1], &bundle[3]]))
            );
        }
    }

    #[test]
    fn test_five_block_bundle_with_irrelevant_root_on_top() {
        let model = CertificateModel {
            additional_root: true,
            additional_root_top_or_bot: true,
            additional_intermediate: true,
            ..CertificateModel::default()
        };
        let chain = build(&model).unwrap();
        assert_eq!(
            chain.layout(),
            &[Leaf, Intermediate, SecondIntermediate, IrrelevantRoot, Root]
        );

        let bundle = parse_bundle(&chain);
        assert_eq!(bundle.len(), 5);
        assert_eq!(common_name(&bundle[3]), IRRELEVANT_ROOT_CA_COMMON_NAME);
        let path = verified_path(&bundle, &bundle[4]).unwrap();
        assert_eq!(path.len(), 4);
        assert!(!path.contains(&bundle[3].to_der().unwrap()));
    }

    #[test]
    fn test_empty_subject_omits_common_name() {
        let model = CertificateModel {
            subject: String::new(),
            ..CertificateModel::default()
        };
        let chain = build(&model).unwrap();
        let bundle = parse_bundle(&chain);
        let leaf = &bundle[0];

        assert_eq!(leaf.subject_name().entries_by_nid(Nid::COMMONNAME).count(), 0);
        assert_eq!(
            leaf.subject_name()
                .entries_by_nid(Nid::ORGANIZATIONALUNITNAME)
                .next()
                .unwrap()
                .data()
                .as_utf8()
                .unwrap()
                .to_string(),
            "Cumulonimbus Services"
        );
        assert_eq!(
            verified_path(&bundle, &bundle[2]),
            Some(ders(&[leaf, &bundle[1], &bundle[2]]))
        );
    }

    #[test]
    fn test_subject_outside_permitted_domain_fails_validation() {
        let model = CertificateModel {
            subject: "aus.content-signature.example.org".to_string(),
            ..CertificateModel::default()
        };
        let chain = build(&model).unwrap();
        let bundle = parse_bundle(&chain);
        assert_eq!(verified_path(&bundle, &bundle[2]), None);

        let model = CertificateModel {
            subject: "content-signature.mozilla.org".to_string(),
            ..CertificateModel::default()
        };
        let chain = build(&model).unwrap();
        let bundle = parse_bundle(&chain);
        assert!(verified_path(&bundle, &bundle[2]).is_some());
    }

    #[test]
    fn test_signing_failure_names_certificate() {
        // CN is capped at 64 characters
        let model = CertificateModel {
            subject: "x".repeat(65),
            ..CertificateModel::default()
        };
        match build(&model) {
            Err(ChainError::CertificateSigning { certificate, .. }) => {
                assert_eq!(certificate, "leaf")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let chain = build(&CertificateModel::default()).unwrap();
        let debug = format!("{:?}", chain);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
