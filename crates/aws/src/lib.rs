use anyhow::{Context, Result};
use async_trait::async_trait;
use emrguard_core::{ClusterDetail, ClusterId, ClusterSource, ClusterSummary, Tag};
use serde::{Serialize, Deserialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

// EMR API shapes, as printed by `aws emr ... --output json`.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmrStatus { pub state: String }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmrTag { pub key: String, pub value: String }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmrClusterSummary { pub id: String, pub name: String, pub status: EmrStatus }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmrCluster {
    pub id: String,
    pub name: String,
    pub status: EmrStatus,
    #[serde(default)]
    pub security_configuration: Option<String>,
    #[serde(default)]
    pub tags: Vec<EmrTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListClustersOutput { #[serde(default)] pub clusters: Vec<EmrClusterSummary> }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeClusterOutput { pub cluster: EmrCluster }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeSecurityConfigurationOutput {
    pub name: String,
    /// Serialized JSON in API responses; snapshots may inline the object.
    pub security_configuration: Json,
}

impl From<EmrClusterSummary> for ClusterSummary {
    fn from(c: EmrClusterSummary) -> Self {
        ClusterSummary { id: ClusterId(c.id), name: c.name, state: c.status.state }
    }
}

impl From<EmrCluster> for ClusterDetail {
    fn from(c: EmrCluster) -> Self {
        ClusterDetail {
            id: ClusterId(c.id),
            name: c.name,
            status: c.status.state,
            security_configuration: c.security_configuration,
            tags: c.tags.into_iter().map(|t| Tag { key: t.key, value: t.value }).collect(),
        }
    }
}

/// Reads clusters through the AWS CLI, which takes care of credentials and
/// pagination.
#[derive(Debug, Clone)]
pub struct AwsCliSource { aws: PathBuf, region: Option<String>, profile: Option<String> }

impl AwsCliSource {
    pub fn new(region: Option<String>, profile: Option<String>) -> Result<Self> {
        let aws = which::which("aws").context("'aws' CLI not found in PATH. Install AWS CLI v2.")?;
        Ok(Self { aws, region, profile })
    }

    async fn emr<T: serde::de::DeserializeOwned>(&self, subcommand: &str, args: &[&str]) -> Result<T> {
        let mut cmd = Command::new(&self.aws);
        cmd.arg("emr").arg(subcommand).args(args).arg("--output").arg("json");
        if let Some(r) = &self.region { cmd.arg("--region").arg(r); }
        if let Some(p) = &self.profile { cmd.arg("--profile").arg(p); }
        tracing::debug!(subcommand, ?args, "aws emr");
        let out = cmd.output().await.with_context(|| format!("spawn aws emr {}", subcommand))?;
        if !out.status.success() {
            anyhow::bail!("aws emr {} failed: {}", subcommand, String::from_utf8_lossy(&out.stderr).trim());
        }
        serde_json::from_slice(&out.stdout).with_context(|| format!("parse aws emr {} output", subcommand))
    }
}

#[async_trait]
impl ClusterSource for AwsCliSource {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        let out: ListClustersOutput = self.emr("list-clusters", &[]).await?;
        Ok(out.clusters.into_iter().map(Into::into).collect())
    }

    async fn describe_cluster(&self, id: &ClusterId) -> Result<ClusterDetail> {
        let out: DescribeClusterOutput = self.emr("describe-cluster", &["--cluster-id", &id.0]).await?;
        Ok(out.cluster.into())
    }

    async fn describe_security_configuration(&self, name: &str) -> Result<Json> {
        let out: DescribeSecurityConfigurationOutput =
            self.emr("describe-security-configuration", &["--name", name]).await?;
        Ok(out.security_configuration)
    }
}

/// Offline inventory: describe-cluster and describe-security-configuration
/// results captured into one document.
///
/// `Clusters` is required and unknown keys are rejected, so a mistyped file
/// cannot pass as an empty account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Snapshot {
    pub clusters: Vec<EmrCluster>,
    #[serde(default)]
    pub security_configurations: Vec<DescribeSecurityConfigurationOutput>,
}

#[derive(Debug, Clone)]
pub struct SnapshotSource { clusters: Vec<EmrCluster>, configs: BTreeMap<String, Json> }

impl SnapshotSource {
    pub fn from_snapshot(s: Snapshot) -> Self {
        let configs = s.security_configurations.into_iter().map(|c| (c.name, c.security_configuration)).collect();
        Self { clusters: s.clusters, configs }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(Self::from_snapshot(serde_json::from_str(s).context("parse snapshot")?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
        Self::from_json_str(&s).with_context(|| format!("load snapshot {}", path.display()))
    }
}

#[async_trait]
impl ClusterSource for SnapshotSource {
    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        Ok(self.clusters.iter().map(|c| ClusterSummary {
            id: ClusterId(c.id.clone()), name: c.name.clone(), state: c.status.state.clone(),
        }).collect())
    }

    async fn describe_cluster(&self, id: &ClusterId) -> Result<ClusterDetail> {
        let c = self.clusters.iter().find(|c| c.id == id.0)
            .with_context(|| format!("cluster {id} not in snapshot"))?;
        Ok(c.clone().into())
    }

    async fn describe_security_configuration(&self, name: &str) -> Result<Json> {
        self.configs.get(name).cloned()
            .with_context(|| format!("security configuration '{name}' not in snapshot"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emrguard_core::SecurityConfiguration;

    const SNAPSHOT: &str = r#"{
      "Clusters": [
        {"Id": "j-1", "Name": "etl", "Status": {"State": "WAITING"},
         "SecurityConfiguration": "enc", "Tags": [{"Key": "environment", "Value": "prod"}]},
        {"Id": "j-2", "Name": "adhoc", "Status": {"State": "TERMINATED"}}
      ],
      "SecurityConfigurations": [
        {"Name": "enc", "SecurityConfiguration": "{\"EncryptionConfiguration\":{\"EnableInTransitEncryption\":true,\"EnableAtRestEncryption\":false}}"}
      ]
    }"#;

    #[test]
    fn cli_output_shapes_decode() {
        let list: ListClustersOutput = serde_json::from_str(
            r#"{"Clusters":[{"Id":"j-1","Name":"etl","Status":{"State":"RUNNING","StateChangeReason":{}},"NormalizedInstanceHours":0}]}"#,
        ).unwrap();
        let s: ClusterSummary = list.clusters[0].clone().into();
        assert_eq!((s.id.0.as_str(), s.state.as_str()), ("j-1", "RUNNING"));

        let d: DescribeClusterOutput = serde_json::from_str(
            r#"{"Cluster":{"Id":"j-1","Name":"etl","Status":{"State":"WAITING"},"Tags":[{"Key":"team","Value":"data"}]}}"#,
        ).unwrap();
        let d: ClusterDetail = d.cluster.into();
        assert_eq!(d.security_configuration_name(), None);
        assert_eq!(d.tags, vec![Tag::new("team", "data")]);
    }

    #[test]
    fn tag_without_value_is_rejected() {
        let r = serde_json::from_str::<EmrCluster>(r#"{"Id":"j","Name":"n","Status":{"State":"RUNNING"},"Tags":[{"Key":"a"}]}"#);
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn snapshot_source_serves_clusters_and_configs() {
        let src = SnapshotSource::from_json_str(SNAPSHOT).unwrap();
        let list = src.list_clusters().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[1].is_terminated());

        let detail = src.describe_cluster(&ClusterId("j-1".into())).await.unwrap();
        assert_eq!(detail.security_configuration_name(), Some("enc"));

        let raw = src.describe_security_configuration("enc").await.unwrap();
        let (_, flags) = SecurityConfiguration::from_document("enc", raw).unwrap();
        assert_eq!(flags, SecurityConfiguration::new(true, false));
    }

    #[tokio::test]
    async fn snapshot_misses_are_errors() {
        let src = SnapshotSource::from_json_str(SNAPSHOT).unwrap();
        let err = src.describe_cluster(&ClusterId("j-9".into())).await.unwrap_err();
        assert!(err.to_string().contains("j-9"));
        assert!(src.describe_security_configuration("other").await.is_err());
    }

    #[test]
    fn malformed_snapshot_is_rejected() {
        for doc in [
            "[]",
            "{}",
            r#"{"SecurityConfigurations": []}"#,
            r#"{"clusters": [{"Id": "j-1", "Name": "etl", "Status": {"State": "RUNNING"}}]}"#,
            r#"{"Clusters": [], "Extra": 1}"#,
        ] {
            assert!(SnapshotSource::from_json_str(doc).is_err(), "doc: {doc}");
        }
    }

    #[tokio::test]
    async fn cli_errors_name_the_subcommand() {
        let src = AwsCliSource { aws: PathBuf::from("/nonexistent/aws"), region: None, profile: None };
        let err = src.list_clusters().await.unwrap_err();
        assert!(err.to_string().contains("spawn aws emr list-clusters"), "{err:#}");
        let err = src.describe_cluster(&ClusterId("j-1".into())).await.unwrap_err();
        assert!(err.to_string().contains("describe-cluster"), "{err:#}");
    }

    #[tokio::test]
    async fn empty_account_snapshot_loads() {
        let src = SnapshotSource::from_json_str(r#"{"Clusters": []}"#).unwrap();
        assert!(src.list_clusters().await.unwrap().is_empty());
    }
}
