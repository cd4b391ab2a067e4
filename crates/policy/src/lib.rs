//! Encryption posture check for EMR clusters.
//!
//! - [`tags`]: exclusion rules matched against cluster tags.
//! - [`encryption`]: verdict for a cluster's security configuration.
//! - [`check`]: the scan driver tying both to a [`ClusterSource`](emrguard_core::ClusterSource).

pub mod check;
pub mod encryption;
pub mod tags;

pub use check::{EncryptionCheck, ScanSummary};
pub use encryption::{evaluate, EncryptionRequirements, Finding};
pub use tags::{match_tags, TagMatcher};
