use emrguard_core::{
    Alert, AlertSink, AuditSnapshot, CheckError, CheckOptions, ClusterSource, ClusterSummary,
    SecurityConfiguration, Verdict,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::encryption::{evaluate, EncryptionRequirements, Finding};
use crate::tags::TagMatcher;

/// Counters for one pass over the account's clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub inspected: usize,
    pub skipped_terminated: usize,
    pub passed: usize,
    pub failed: usize,
    pub excluded: usize,
    pub errors: usize,
}

enum Outcome { Excluded, Evaluated(Finding) }

/// The EMR encryption check with its options compiled.
#[derive(Debug, Clone)]
pub struct EncryptionCheck {
    options: CheckOptions,
    exclusions: TagMatcher,
    requirements: EncryptionRequirements,
}

impl EncryptionCheck {
    pub fn new(options: CheckOptions) -> Result<Self, CheckError> {
        let exclusions = TagMatcher::new(&options.exclude_on_tag, options.case_insensitive)?;
        let requirements = EncryptionRequirements::from(&options);
        Ok(Self { options, exclusions, requirements })
    }

    pub fn options(&self) -> &CheckOptions { &self.options }

    /// Inspect every non-terminated cluster and emit exactly one alert for each.
    ///
    /// A cluster that cannot be described or whose configuration cannot be
    /// decoded yields a FAIL alert; only a failed listing aborts the scan.
    pub async fn run(&self, source: &dyn ClusterSource, sink: &mut dyn AlertSink) -> anyhow::Result<ScanSummary> {
        let clusters = source.list_clusters().await.map_err(CheckError::Listing)?;
        let mut summary = ScanSummary::default();
        for cluster in clusters {
            if cluster.is_terminated() {
                debug!(cluster = %cluster.id, state = %cluster.state, "skipping terminated cluster");
                summary.skipped_terminated += 1;
                continue;
            }
            summary.inspected += 1;
            let alert = match self.inspect(source, &cluster).await {
                Ok((alert, Outcome::Excluded)) => { summary.excluded += 1; alert }
                Ok((alert, Outcome::Evaluated(finding))) => {
                    debug!(cluster = %cluster.id, ?finding, "evaluated");
                    alert
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(cluster = %cluster.id, error = %reason, "cluster could not be inspected");
                    summary.errors += 1;
                    Alert {
                        verdict: Verdict::Fail,
                        message: format!("EMR cluster {} could not be inspected: {reason}", cluster.name),
                        resource_id: cluster.id.clone(),
                        audit: AuditSnapshot::for_id(cluster.id.clone(), &self.options),
                    }
                }
            };
            match alert.verdict {
                Verdict::Pass => summary.passed += 1,
                Verdict::Fail => summary.failed += 1,
            }
            sink.emit(alert)?;
        }
        info!(inspected = summary.inspected, passed = summary.passed, failed = summary.failed,
            excluded = summary.excluded, skipped = summary.skipped_terminated, "scan finished");
        Ok(summary)
    }

    async fn inspect(&self, source: &dyn ClusterSource, cluster: &ClusterSummary) -> anyhow::Result<(Alert, Outcome)> {
        let detail = source.describe_cluster(&cluster.id).await?;
        let mut audit = AuditSnapshot::for_cluster(&detail, &self.options);
        let alert = |verdict: Verdict, message: String, audit: AuditSnapshot| Alert {
            verdict, message, resource_id: detail.id.clone(), audit,
        };

        if self.exclusions.is_excluded(&detail.tags) {
            let msg = format!("EMR cluster {} is excluded due to the tag", detail.name);
            return Ok((alert(Verdict::Pass, msg, audit), Outcome::Excluded));
        }

        let config = match detail.security_configuration_name() {
            None => {
                audit.security_configuration = None;
                None
            }
            Some(name) => {
                let raw = source.describe_security_configuration(name).await?;
                let (doc, flags) = SecurityConfiguration::from_document(name, raw)?;
                audit.security_configuration_details = Some(doc);
                Some(flags)
            }
        };
        let finding = evaluate(config.as_ref(), self.requirements);
        let msg = format!("EMR cluster {} {}", detail.name, finding.phrase());
        Ok((alert(finding.verdict(), msg, audit), Outcome::Evaluated(finding)))
    }
}
