use anyhow::{Result, Context};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use emrguard_aws::{AwsCliSource, SnapshotSource};
use emrguard_core::{Alert, AlertSink, CheckOptions, ClusterSource, Verdict};
use emrguard_policy::{EncryptionCheck, ScanSummary};

const REMEDIATION: &str = "A security configuration can only be set when a cluster is launched; \
re-launch the cluster with a security configuration enabling the required encryption.";

#[derive(Parser, Debug)]
#[command(author, version, about="emrguard — EMR in-transit / at-rest encryption check")]
struct Cli {
    /// Options file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read clusters from an inventory snapshot instead of the AWS CLI
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    profile: Option<String>,

    /// Compare exclusion tags case-insensitively
    #[arg(long, default_value_t=false)]
    case_insensitive: bool,

    /// Do not fail clusters for missing at-rest encryption
    #[arg(long, default_value_t=false)]
    allow_missing_at_rest: bool,

    /// Do not fail clusters for missing in-transit encryption
    #[arg(long, default_value_t=false)]
    allow_missing_in_transit: bool,

    #[arg(long, value_enum, default_value_t=Format::Json)]
    format: Format,

    /// Exit with status 1 when any cluster fails, 2 when no cluster was inspected
    #[arg(long, default_value_t=false)]
    strict: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Format { Json, Text }

struct StdoutSink<W: Write> { out: W, format: Format }

impl<W: Write> AlertSink for StdoutSink<W> {
    fn emit(&mut self, alert: Alert) -> Result<()> {
        match self.format {
            Format::Json => writeln!(self.out, "{}", serde_json::to_string(&alert)?)?,
            Format::Text => {
                writeln!(self.out, "{}\t{}\t{}", alert.verdict.as_str(), alert.resource_id, alert.message)?;
                if alert.verdict == Verdict::Fail {
                    writeln!(self.out, "\tremediation: {REMEDIATION}")?;
                }
            }
        }
        Ok(())
    }
}

fn load_options(path: Option<&Path>) -> Result<CheckOptions> {
    match path {
        Some(p) => {
            let raw = std::fs::read(p).with_context(|| format!("read options {}", p.display()))?;
            serde_yaml::from_slice(&raw).with_context(|| format!("parse options {}", p.display()))
        }
        None => Ok(CheckOptions::default()),
    }
}

/// Process exit status for a finished scan. Under `--strict` a scan that
/// inspected nothing is not a clean result.
fn exit_code(summary: &ScanSummary, strict: bool) -> i32 {
    if !strict { 0 }
    else if summary.failed > 0 { 1 }
    else if summary.inspected == 0 { 2 }
    else { 0 }
}

/// Command-line switches only ever tighten case handling and relax requirements.
fn apply_flags(mut options: CheckOptions, cli: &Cli) -> CheckOptions {
    if cli.case_insensitive { options.case_insensitive = true; }
    if cli.allow_missing_at_rest { options.require_at_rest_encryption = false; }
    if cli.allow_missing_in_transit { options.require_in_transit_encryption = false; }
    options
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let options = apply_flags(load_options(cli.config.as_deref())?, &cli);
    let check = EncryptionCheck::new(options)?;

    tracing::info!(options = %serde_json::to_string(check.options())?, snapshot = ?cli.snapshot, "starting EMR encryption scan");
    let source: Box<dyn ClusterSource> = match &cli.snapshot {
        Some(p) => Box::new(SnapshotSource::load(p)?),
        None => Box::new(AwsCliSource::new(cli.region.clone(), cli.profile.clone())?),
    };

    let mut sink = StdoutSink { out: std::io::stdout().lock(), format: cli.format };
    let summary = check.run(source.as_ref(), &mut sink).await?;
    sink.out.flush()?;

    let code = exit_code(&summary, cli.strict);
    if code == 2 {
        tracing::warn!("no live clusters were inspected");
    }
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
