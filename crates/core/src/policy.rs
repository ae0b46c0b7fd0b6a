//! Policy versions, layers, scopes, and lifecycle status.
//!
//! A policy version is identified by `state::sector::layer::version`. The
//! identity is derived once from validated scope fields and never changes;
//! re-ingesting the same identity replaces its chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::collection::Metadata;
use crate::error::IngestError;

/// Wildcard sentinel for a scope dimension ("applies to every value").
pub const WILDCARD: &str = "ALL";

/// Separator between the components of a policy or chunk id.
pub const ID_SEPARATOR: &str = "::";

/// Metadata field names denormalized onto every chunk.
pub mod fields {
    pub const POLICY_ID: &str = "policy_id";
    pub const LAYER: &str = "layer";
    pub const STATE: &str = "state";
    pub const SECTOR: &str = "sector";
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const DOC_NAME: &str = "doc_name";
}

/// One of the four fixed policy categories. Each has its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    BasePolicy,
    StateRules,
    SectorRules,
    Environment,
}

impl Layer {
    /// Every layer, in citation order.
    pub const ALL: [Layer; 4] = [
        Layer::BasePolicy,
        Layer::StateRules,
        Layer::SectorRules,
        Layer::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::BasePolicy => "base_policy",
            Layer::StateRules => "state_rules",
            Layer::SectorRules => "sector_rules",
            Layer::Environment => "environment",
        }
    }

    /// Short citation tag; snippets are cited as `<TAG>-<n>`.
    pub fn tag(&self) -> &'static str {
        match self {
            Layer::BasePolicy => "BASE",
            Layer::StateRules => "STATE",
            Layer::SectorRules => "SECTOR",
            Layer::Environment => "ENV",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Layer::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(needle) || l.tag().eq_ignore_ascii_case(needle))
            .ok_or_else(|| IngestError::InvalidScope {
                field: fields::LAYER.into(),
                reason: format!("unknown layer '{needle}'"),
            })
    }
}

/// Governance lifecycle of a policy version. Only `draft -> active` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Active,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Draft => "draft",
            PolicyStatus::Active => "active",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PolicyStatus::Draft),
            "active" => Ok(PolicyStatus::Active),
            other => Err(IngestError::InvalidScope {
                field: fields::STATUS.into(),
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// Trim and validate a scope label. Labels must be non-empty and must not
/// contain the id separator.
fn validate_label(field: &str, value: &str) -> Result<String, IngestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IngestError::InvalidScope {
            field: field.into(),
            reason: "must not be empty".into(),
        });
    }
    if value.contains(ID_SEPARATOR) {
        return Err(IngestError::InvalidScope {
            field: field.into(),
            reason: format!("must not contain '{ID_SEPARATOR}'"),
        });
    }
    Ok(value.to_string())
}

/// The (state, sector) pair qualifying which cases a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub state: String,
    pub sector: String,
}

impl Scope {
    /// Build a validated scope.
    pub fn new(state: &str, sector: &str) -> Result<Self, IngestError> {
        Ok(Self {
            state: validate_label(fields::STATE, state)?,
            sector: validate_label(fields::SECTOR, sector)?,
        })
    }

    /// The fully wildcarded scope (`ALL`, `ALL`).
    pub fn wildcard() -> Self {
        Self {
            state: WILDCARD.into(),
            sector: WILDCARD.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.state == WILDCARD && self.sector == WILDCARD
    }
}

/// Composite identity `state::sector::layer::version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    /// Derive the id from already-validated parts.
    pub fn new(scope: &Scope, layer: Layer, version: &str) -> Self {
        Self(
            [scope.state.as_str(), scope.sector.as_str(), layer.as_str(), version]
                .join(ID_SEPARATOR),
        )
    }

    /// Parse an id back into its scope, layer and version.
    pub fn parse(raw: &str) -> Result<(Scope, Layer, String), IngestError> {
        let parts: Vec<&str> = raw.trim().split(ID_SEPARATOR).collect();
        let [state, sector, layer, version] = parts.as_slice() else {
            return Err(IngestError::InvalidScope {
                field: fields::POLICY_ID.into(),
                reason: format!("expected state{0}sector{0}layer{0}version, got '{raw}'", ID_SEPARATOR),
            });
        };
        let scope = Scope::new(state, sector)?;
        let layer = layer.parse()?;
        let version = validate_label(fields::VERSION, version)?;
        Ok((scope, layer, version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the `index`-th chunk of this policy version.
    pub fn chunk_id(&self, index: usize) -> String {
        format!("{}{ID_SEPARATOR}chunk_{index}", self.0)
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<PolicyId> for String {
    fn from(id: PolicyId) -> Self {
        id.0
    }
}

/// A single ingested document revision and its governance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub policy_id: PolicyId,
    pub layer: Layer,
    pub state: String,
    pub sector: String,
    pub version: String,
    pub status: PolicyStatus,
    #[serde(default)]
    pub doc_name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl PolicyVersion {
    /// Validate the version label and derive the policy id.
    pub fn new(
        layer: Layer,
        scope: Scope,
        version: &str,
        status: PolicyStatus,
        doc_name: impl Into<String>,
    ) -> Result<Self, IngestError> {
        let version = validate_label(fields::VERSION, version)?;
        let policy_id = PolicyId::new(&scope, layer, &version);
        Ok(Self {
            policy_id,
            layer,
            state: scope.state,
            sector: scope.sector,
            version,
            status,
            doc_name: doc_name.into(),
            uploaded_at: Utc::now(),
            status_updated_at: None,
            approved_by: None,
        })
    }

    pub fn scope(&self) -> Scope {
        Scope {
            state: self.state.clone(),
            sector: self.sector.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PolicyStatus::Active
    }

    /// The metadata copied onto each chunk at ingest time.
    pub fn chunk_metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            policy_id: self.policy_id.clone(),
            layer: self.layer,
            state: self.state.clone(),
            sector: self.sector.clone(),
            version: self.version.clone(),
            status: self.status,
            doc_name: self.doc_name.clone(),
        }
    }
}

/// Typed view of the metadata denormalized onto a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub policy_id: PolicyId,
    pub layer: Layer,
    pub state: String,
    pub sector: String,
    pub version: String,
    pub status: PolicyStatus,
    pub doc_name: String,
}

impl ChunkMetadata {
    /// Flatten into the string map the collections filter on.
    pub fn to_metadata(&self) -> Metadata {
        Metadata::from([
            (fields::POLICY_ID.to_string(), self.policy_id.to_string()),
            (fields::LAYER.to_string(), self.layer.as_str().to_string()),
            (fields::STATE.to_string(), self.state.clone()),
            (fields::SECTOR.to_string(), self.sector.clone()),
            (fields::VERSION.to_string(), self.version.clone()),
            (fields::STATUS.to_string(), self.status.as_str().to_string()),
            (fields::DOC_NAME.to_string(), self.doc_name.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_id_is_derived_from_scope_fields() {
        let scope = Scope::wildcard();
        let id = PolicyId::new(&scope, Layer::BasePolicy, "2024-01-01");
        assert_eq!(id.as_str(), "ALL::ALL::base_policy::2024-01-01");
        assert_eq!(id.chunk_id(2), "ALL::ALL::base_policy::2024-01-01::chunk_2");
    }

    #[test]
    fn policy_id_parse_inverts_new() {
        let scope = Scope::new("Uttarakhand", "warehouse").unwrap();
        let id = PolicyId::new(&scope, Layer::SectorRules, "2024-06-30");
        let (parsed_scope, layer, version) = PolicyId::parse(id.as_str()).unwrap();
        assert_eq!(parsed_scope, scope);
        assert_eq!(layer, Layer::SectorRules);
        assert_eq!(version, "2024-06-30");
    }

    #[test]
    fn policy_id_parse_rejects_wrong_arity() {
        assert!(PolicyId::parse("ALL::ALL::base_policy").is_err());
        assert!(PolicyId::parse("a::b::base_policy::v1::extra").is_err());
    }

    #[test]
    fn scope_rejects_empty_and_separator() {
        assert!(matches!(
            Scope::new("  ", "warehouse"),
            Err(IngestError::InvalidScope { ref field, .. }) if field == "state"
        ));
        assert!(matches!(
            Scope::new("Kerala", "a::b"),
            Err(IngestError::InvalidScope { ref field, .. }) if field == "sector"
        ));
    }

    #[test]
    fn scope_labels_are_trimmed() {
        let scope = Scope::new(" Kerala ", "retail\n").unwrap();
        assert_eq!(scope.state, "Kerala");
        assert_eq!(scope.sector, "retail");
    }

    #[test]
    fn empty_version_is_invalid() {
        let err = PolicyVersion::new(
            Layer::BasePolicy,
            Scope::wildcard(),
            "",
            PolicyStatus::Draft,
            "policy.pdf",
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::InvalidScope { ref field, .. } if field == "version"));
    }

    #[test]
    fn layer_parses_name_and_tag() {
        assert_eq!("state_rules".parse::<Layer>().unwrap(), Layer::StateRules);
        assert_eq!("ENV".parse::<Layer>().unwrap(), Layer::Environment);
        assert_eq!("base".parse::<Layer>().unwrap(), Layer::BasePolicy);
        assert!("unknown".parse::<Layer>().is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<PolicyStatus>().unwrap(), PolicyStatus::Active);
        assert!("retired".parse::<PolicyStatus>().is_err());
    }

    #[test]
    fn policy_version_serializes_registry_fields() {
        let pv = PolicyVersion::new(
            Layer::Environment,
            Scope::new("Goa", "ALL").unwrap(),
            "2025-01-01",
            PolicyStatus::Draft,
            "env.pdf",
        )
        .unwrap();
        let json = serde_json::to_string(&pv).unwrap();
        assert!(json.contains(r#""policy_id":"Goa::ALL::environment::2025-01-01""#));
        assert!(json.contains(r#""layer":"environment""#));
        assert!(json.contains(r#""status":"draft""#));
        assert!(!json.contains("approved_by"));
    }

    #[test]
    fn chunk_metadata_flattens_all_fields() {
        let pv = PolicyVersion::new(
            Layer::BasePolicy,
            Scope::wildcard(),
            "v1",
            PolicyStatus::Active,
            "base.pdf",
        )
        .unwrap();
        let meta = pv.chunk_metadata().to_metadata();
        assert_eq!(meta.get(fields::STATUS).map(String::as_str), Some("active"));
        assert_eq!(meta.get(fields::STATE).map(String::as_str), Some("ALL"));
        assert_eq!(meta.get(fields::LAYER).map(String::as_str), Some("base_policy"));
        assert_eq!(meta.len(), 7);
    }
}
