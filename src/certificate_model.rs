//! Certificate Model Module
//!
//! Describes the shape of the chain a build should produce: the leaf subject,
//! the validity start, the authority key id to stamp on self-signed
//! certificates, and which decoy certificates to mix into the bundle.
//!
//! The model arrives from test drivers as JSON using the field names the update
//! service mock has always accepted:
//!
//! ```json
//! {
//!   "AuthorityKeyID": "AQMGAQUFBwMD",
//!   "NotBefore": "2024-01-01T00:00:00Z",
//!   "Subject": "aus.content-signature.mozilla.org",
//!   "AdditionalIntermediate": false,
//!   "AdditionalRoot": true,
//!   "AdditionalRootTopOrBot": true,
//!   "AdditionalIrrelevantIntermediate": false,
//!   "AdditionalIrrelevantIntermediateTopOrBot": false
//! }
//! ```
//!
//! The toggles are turned into [`DecoyPlacement`] directives so the PEM
//! assembly step never branches on the raw booleans.

use crate::error::{ChainError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject CN the update client pins the leaf against.
pub const DEFAULT_SUBJECT: &str = "aus.content-signature.mozilla.org";

/// Bytes of the code-signing EKU OID, reused as the default authority key id.
pub const DEFAULT_AUTHORITY_KEY_ID: [u8; 9] = [1, 3, 6, 1, 5, 5, 7, 3, 3];

const DEFAULT_NOT_BEFORE_DAYS_AGO: i64 = 10;

/// Input configuration for one chain build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateModel {
    #[serde(rename = "AuthorityKeyID", with = "base64_bytes")]
    pub authority_key_id: Vec<u8>,
    #[serde(rename = "NotBefore")]
    pub not_before: DateTime<Utc>,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "AdditionalIntermediate")]
    pub additional_intermediate: bool,
    #[serde(rename = "AdditionalRoot")]
    pub additional_root: bool,
    /// `true` places the irrelevant root before the real root.
    #[serde(rename = "AdditionalRootTopOrBot")]
    pub additional_root_top_or_bot: bool,
    #[serde(rename = "AdditionalIrrelevantIntermediate")]
    pub additional_irrelevant_intermediate: bool,
    /// `true` places the irrelevant intermediate before the second intermediate.
    #[serde(rename = "AdditionalIrrelevantIntermediateTopOrBot")]
    pub additional_irrelevant_intermediate_top_or_bot: bool,
}

impl Default for CertificateModel {
    fn default() -> Self {
        Self {
            authority_key_id: DEFAULT_AUTHORITY_KEY_ID.to_vec(),
            not_before: Utc::now() - Duration::days(DEFAULT_NOT_BEFORE_DAYS_AGO),
            subject: DEFAULT_SUBJECT.to_string(),
            additional_intermediate: false,
            additional_root: false,
            additional_root_top_or_bot: false,
            additional_irrelevant_intermediate: false,
            additional_irrelevant_intermediate_top_or_bot: false,
        }
    }
}

impl CertificateModel {
    /// Decode a model from its JSON wire form. Absent fields take the default
    /// model's values.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ChainError::InvalidModel(e.to_string()))
    }

    /// Roles on the real trust path, in bundle order (leaf first).
    pub fn trust_path(&self) -> Vec<CertificateRole> {
        let mut roles = vec![CertificateRole::Leaf, CertificateRole::Intermediate];
        if self.additional_intermediate {
            roles.push(CertificateRole::SecondIntermediate);
        }
        roles.push(CertificateRole::Root);
        roles
    }

    /// Where each requested decoy goes relative to the trust path.
    pub fn decoy_placements(&self) -> Vec<DecoyPlacement> {
        let mut placements = Vec::new();

        if self.additional_irrelevant_intermediate {
            let decoy = CertificateRole::IrrelevantIntermediate;
            let placement = match (
                self.additional_intermediate,
                self.additional_irrelevant_intermediate_top_or_bot,
            ) {
                (true, true) => {
                    DecoyPlacement::new(decoy, Position::Before, CertificateRole::SecondIntermediate)
                }
                (true, false) => {
                    DecoyPlacement::new(decoy, Position::After, CertificateRole::SecondIntermediate)
                }
                // Without a second intermediate both positions collapse onto
                // the slot right after the first one.
                (false, _) => {
                    DecoyPlacement::new(decoy, Position::After, CertificateRole::Intermediate)
                }
            };
            placements.push(placement);
        }

        if self.additional_root {
            let position = if self.additional_root_top_or_bot {
                Position::Before
            } else {
                Position::After
            };
            placements.push(DecoyPlacement::new(
                CertificateRole::IrrelevantRoot,
                position,
                CertificateRole::Root,
            ));
        }

        placements
    }
}

/// The part a certificate plays in a generated chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateRole {
    Leaf,
    Intermediate,
    SecondIntermediate,
    IrrelevantIntermediate,
    Root,
    IrrelevantRoot,
}

impl CertificateRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Intermediate => "intermediate",
            Self::SecondIntermediate => "second intermediate",
            Self::IrrelevantIntermediate => "irrelevant intermediate",
            Self::Root => "root",
            Self::IrrelevantRoot => "irrelevant root",
        }
    }
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

/// Emit `decoy` immediately before or after `anchor` in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoyPlacement {
    pub decoy: CertificateRole,
    pub position: Position,
    pub anchor: CertificateRole,
}

impl DecoyPlacement {
    pub fn new(decoy: CertificateRole, position: Position, anchor: CertificateRole) -> Self {
        Self {
            decoy,
            position,
            anchor,
        }
    }
}

/// `Vec<u8>` as standard base64, `null` decoding to an empty id.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let model = CertificateModel::default();
        assert_eq!(model.subject, DEFAULT_SUBJECT);
        assert_eq!(model.authority_key_id, vec![1, 3, 6, 1, 5, 5, 7, 3, 3]);
        assert!(model.not_before < Utc::now() - Duration::days(9));
        assert!(model.decoy_placements().is_empty());
        assert_eq!(
            model.trust_path(),
            vec![
                CertificateRole::Leaf,
                CertificateRole::Intermediate,
                CertificateRole::Root
            ]
        );
    }

    #[test]
    fn test_from_json_wire_names() {
        let json = r#"{
            "AuthorityKeyID": "AQMGAQUFBwMD",
            "NotBefore": "2024-03-01T12:00:00Z",
            "Subject": "whatever",
            "AdditionalIntermediate": true,
            "AdditionalRoot": true,
            "AdditionalRootTopOrBot": false,
            "AdditionalIrrelevantIntermediate": false,
            "AdditionalIrrelevantIntermediateTopOrBot": false
        }"#;
        let model = CertificateModel::from_json(json.as_bytes()).unwrap();
        assert_eq!(model.authority_key_id, DEFAULT_AUTHORITY_KEY_ID.to_vec());
        assert_eq!(model.subject, "whatever");
        assert_eq!(model.not_before.to_rfc3339(), "2024-03-01T12:00:00+00:00");
        assert!(model.additional_intermediate);
        assert!(model.additional_root);
        assert!(!model.additional_root_top_or_bot);
    }

    #[test]
    fn test_from_json_missing_fields_use_defaults() {
        let model = CertificateModel::from_json(br#"{"AdditionalRoot": true}"#).unwrap();
        assert_eq!(model.subject, DEFAULT_SUBJECT);
        assert_eq!(model.authority_key_id, DEFAULT_AUTHORITY_KEY_ID.to_vec());
        assert!(model.additional_root);

        let model = CertificateModel::from_json(br#"{"AuthorityKeyID": null}"#).unwrap();
        assert!(model.authority_key_id.is_empty());
    }

    #[test]
    fn test_from_json_rejects_bad_key_id() {
        let err = CertificateModel::from_json(br#"{"AuthorityKeyID": "not base64!"}"#)
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidModel(_)));
    }

    #[test]
    fn test_json_keeps_wire_names() {
        let json = serde_json::to_value(CertificateModel::default()).unwrap();
        assert_eq!(json["AuthorityKeyID"], "AQMGAQUFBwMD");
        assert_eq!(json["Subject"], DEFAULT_SUBJECT);
        assert_eq!(json["AdditionalIrrelevantIntermediateTopOrBot"], false);
    }

    #[test]
    fn test_root_decoy_placement() {
        let mut model = CertificateModel {
            additional_root: true,
            additional_root_top_or_bot: true,
            ..CertificateModel::default()
        };
        assert_eq!(
            model.decoy_placements(),
            vec![DecoyPlacement::new(
                CertificateRole::IrrelevantRoot,
                Position::Before,
                CertificateRole::Root
            )]
        );

        model.additional_root_top_or_bot = false;
        assert_eq!(model.decoy_placements()[0].position, Position::After);
    }

    #[test]
    fn test_intermediate_decoy_placement() {
        let mut model = CertificateModel {
            additional_intermediate: true,
            additional_irrelevant_intermediate: true,
            additional_irrelevant_intermediate_top_or_bot: true,
            ..CertificateModel::default()
        };
        assert_eq!(
            model.decoy_placements(),
            vec![DecoyPlacement::new(
                CertificateRole::IrrelevantIntermediate,
                Position::Before,
                CertificateRole::SecondIntermediate
            )]
        );

        model.additional_irrelevant_intermediate_top_or_bot = false;
        assert_eq!(
            model.decoy_placements()[0],
            DecoyPlacement::new(
                CertificateRole::IrrelevantIntermediate,
                Position::After,
                CertificateRole::SecondIntermediate
            )
        );

        // position flag is irrelevant without the second intermediate
        model.additional_intermediate = false;
        for top in [true, false] {
            model.additional_irrelevant_intermediate_top_or_bot = top;
            assert_eq!(
                model.decoy_placements()[0],
                DecoyPlacement::new(
                    CertificateRole::IrrelevantIntermediate,
                    Position::After,
                    CertificateRole::Intermediate
                )
            );
        }
    }

    #[test]
    fn test_position_flags_ignored_when_toggle_off() {
        let model = CertificateModel {
            additional_root_top_or_bot: true,
            additional_irrelevant_intermediate_top_or_bot: true,
            ..CertificateModel::default()
        };
        assert!(model.decoy_placements().is_empty());
    }
}
