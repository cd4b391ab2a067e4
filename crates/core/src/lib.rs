use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag { pub key: String, pub value: String }

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Value side of an exclusion rule.
///
/// A single string may contain `*` wildcards and must match the whole tag
/// value. A list is an exact-membership test and never expands wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Pattern(String),
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclusionRule { pub key: String, pub value: RuleValue }

impl ExclusionRule {
    pub fn pattern(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: RuleValue::Pattern(value.into()) }
    }

    pub fn one_of<I, S>(key: impl Into<String>, values: I) -> Self
    where I: IntoIterator<Item = S>, S: Into<String> {
        Self { key: key.into(), value: RuleValue::OneOf(values.into_iter().map(Into::into).collect()) }
    }
}

/// Effective options of the encryption check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckOptions {
    /// Clusters carrying a matching tag are excluded and reported as PASS.
    #[serde(default = "default_exclusions")]
    pub exclude_on_tag: Vec<ExclusionRule>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default = "yes")]
    pub require_in_transit_encryption: bool,
    #[serde(default = "yes")]
    pub require_at_rest_encryption: bool,
}

fn default_exclusions() -> Vec<ExclusionRule> { vec![ExclusionRule::pattern("environment", "test*")] }
fn yes() -> bool { true }

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            exclude_on_tag: default_exclusions(),
            case_insensitive: false,
            require_in_transit_encryption: true,
            require_at_rest_encryption: true,
        }
    }
}

/// Encryption flags of a resolved EMR security configuration.
///
/// Flags absent from the source document decode as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityConfiguration {
    #[serde(rename = "EnableInTransitEncryption", default)]
    pub in_transit: bool,
    #[serde(rename = "EnableAtRestEncryption", default)]
    pub at_rest: bool,
}

impl SecurityConfiguration {
    pub fn new(in_transit: bool, at_rest: bool) -> Self { Self { in_transit, at_rest } }

    /// Decode a raw security configuration document.
    ///
    /// `raw` is either the document itself or a string holding it as JSON.
    /// Returns the parsed document alongside the flags read from its
    /// `EncryptionConfiguration` block.
    pub fn from_document(name: &str, raw: serde_json::Value) -> Result<(serde_json::Value, Self), CheckError> {
        let invalid = |reason: String| CheckError::InvalidSecurityConfiguration { name: name.to_string(), reason };
        let doc = match raw {
            serde_json::Value::String(s) => serde_json::from_str(&s).map_err(|e| invalid(e.to_string()))?,
            other => other,
        };
        if !doc.is_object() {
            return Err(invalid("expected a JSON object".to_string()));
        }
        let flags = match doc.get("EncryptionConfiguration") {
            None | Some(serde_json::Value::Null) => Self::default(),
            Some(block) => Self::deserialize(block).map_err(|e| invalid(e.to_string()))?,
        };
        Ok((doc, flags))
    }
}

/// A cluster as returned by the listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary { pub id: ClusterId, pub name: String, pub state: String }

impl ClusterSummary {
    /// Terminated clusters remain listed for about two weeks.
    pub fn is_terminated(&self) -> bool { self.state.contains("TERMINAT") }
}

/// A cluster as returned by the describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetail {
    pub id: ClusterId,
    pub name: String,
    pub status: String,
    /// Name of the attached security configuration; may be empty.
    #[serde(default)]
    pub security_configuration: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl ClusterDetail {
    /// The security configuration reference, treating an empty name as absent.
    pub fn security_configuration_name(&self) -> Option<&str> {
        self.security_configuration.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict { Pass, Fail }

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self { Verdict::Pass => "PASS", Verdict::Fail => "FAIL" }
    }
}

/// Attributes captured while inspecting a cluster, attached to every alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub id: ClusterId,
    pub name: Option<String>,
    pub status: Option<String>,
    pub security_configuration: Option<String>,
    pub security_configuration_details: Option<serde_json::Value>,
    pub tags: Vec<Tag>,
    pub options: CheckOptions,
}

impl AuditSnapshot {
    pub fn for_id(id: ClusterId, options: &CheckOptions) -> Self {
        Self {
            id,
            name: None,
            status: None,
            security_configuration: None,
            security_configuration_details: None,
            tags: Vec::new(),
            options: options.clone(),
        }
    }

    pub fn for_cluster(cluster: &ClusterDetail, options: &CheckOptions) -> Self {
        Self {
            id: cluster.id.clone(),
            name: Some(cluster.name.clone()),
            status: Some(cluster.status.clone()),
            security_configuration: cluster.security_configuration.clone(),
            security_configuration_details: None,
            tags: cluster.tags.clone(),
            options: options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub verdict: Verdict,
    pub message: String,
    pub resource_id: ClusterId,
    pub audit: AuditSnapshot,
}

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("invalid exclusion pattern for tag key '{key}': {reason}")]
    InvalidPattern { key: String, reason: String },
    #[error("invalid security configuration document '{name}': {reason}")]
    InvalidSecurityConfiguration { name: String, reason: String },
    #[error("listing clusters failed: {0:#}")]
    Listing(anyhow::Error),
}

/// Read access to EMR clusters and their security configurations.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_clusters(&self) -> anyhow::Result<Vec<ClusterSummary>>;
    async fn describe_cluster(&self, id: &ClusterId) -> anyhow::Result<ClusterDetail>;
    /// Raw security configuration document. The body may be a JSON object
    /// or a string holding serialized JSON.
    async fn describe_security_configuration(&self, name: &str) -> anyhow::Result<serde_json::Value>;
}

pub trait AlertSink {
    fn emit(&mut self, alert: Alert) -> anyhow::Result<()>;
}

impl AlertSink for Vec<Alert> {
    fn emit(&mut self, alert: Alert) -> anyhow::Result<()> {
        self.push(alert);
        Ok(())
    }
}
