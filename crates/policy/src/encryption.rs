use emrguard_core::{CheckOptions, SecurityConfiguration, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionRequirements { pub in_transit: bool, pub at_rest: bool }

impl Default for EncryptionRequirements {
    fn default() -> Self { Self { in_transit: true, at_rest: true } }
}

impl From<&CheckOptions> for EncryptionRequirements {
    fn from(o: &CheckOptions) -> Self {
        Self { in_transit: o.require_in_transit_encryption, at_rest: o.require_at_rest_encryption }
    }
}

/// Outcome of evaluating one security configuration against the requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finding {
    NoConfiguration,
    BothEnabled,
    AtRestDisabled,
    InTransitDisabled,
    /// Not both enabled, yet no required flag is off. Only reachable when a
    /// requirement has been switched off.
    Unexpected,
}

impl Finding {
    pub fn verdict(self) -> Verdict {
        match self {
            Finding::BothEnabled => Verdict::Pass,
            _ => Verdict::Fail,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Finding::NoConfiguration => "no security configuration set",
            Finding::BothEnabled => "both in-transit and at-rest encryption enabled",
            Finding::AtRestDisabled => "at-rest encryption not enabled",
            Finding::InTransitDisabled => "in-transit encryption not enabled",
            Finding::Unexpected => "neither required encryption enabled",
        }
    }

    /// Reason phrased to follow a cluster name in an alert message.
    pub fn phrase(self) -> &'static str {
        match self {
            Finding::NoConfiguration => "has no security configuration set",
            Finding::BothEnabled => "has both in-transit and at-rest encryption enabled",
            Finding::AtRestDisabled => "does not have at-rest encryption enabled",
            Finding::InTransitDisabled => "does not have in-transit encryption enabled",
            Finding::Unexpected => "does not have in-transit or at-rest encryption enabled",
        }
    }
}

/// Evaluate a cluster's security configuration. `None` means the cluster has
/// no configuration attached.
///
/// At-rest is checked before in-transit, so a cluster missing both reports
/// the at-rest finding.
pub fn evaluate(config: Option<&SecurityConfiguration>, req: EncryptionRequirements) -> Finding {
    let Some(c) = config else { return Finding::NoConfiguration };
    if c.in_transit && c.at_rest {
        Finding::BothEnabled
    } else if req.at_rest && !c.at_rest {
        Finding::AtRestDisabled
    } else if req.in_transit && !c.in_transit {
        Finding::InTransitDisabled
    } else {
        tracing::warn!(in_transit = c.in_transit, at_rest = c.at_rest, require_in_transit = req.in_transit,
            require_at_rest = req.at_rest, "unexpected encryption flag combination");
        Finding::Unexpected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(in_transit: bool, at_rest: bool) -> EncryptionRequirements { EncryptionRequirements { in_transit, at_rest } }
    fn cfg(in_transit: bool, at_rest: bool) -> SecurityConfiguration { SecurityConfiguration::new(in_transit, at_rest) }

    #[test]
    fn no_configuration_fails_regardless_of_requirements() {
        for (a, b) in [(true, true), (false, false), (true, false), (false, true)] {
            let f = evaluate(None, req(a, b));
            assert_eq!(f, Finding::NoConfiguration);
            assert_eq!((f.verdict(), f.reason()), (Verdict::Fail, "no security configuration set"));
        }
    }

    #[test]
    fn both_enabled_passes_regardless_of_requirements() {
        for (a, b) in [(true, true), (false, false)] {
            let f = evaluate(Some(&cfg(true, true)), req(a, b));
            assert_eq!((f.verdict(), f.reason()), (Verdict::Pass, "both in-transit and at-rest encryption enabled"));
        }
    }

    #[test]
    fn at_rest_reported_before_in_transit() {
        assert_eq!(evaluate(Some(&cfg(false, false)), req(true, true)), Finding::AtRestDisabled);
        assert_eq!(evaluate(Some(&cfg(true, false)), req(true, true)), Finding::AtRestDisabled);
    }

    #[test]
    fn in_transit_missing() {
        let f = evaluate(Some(&cfg(false, true)), req(true, true));
        assert_eq!((f.verdict(), f.reason()), (Verdict::Fail, "in-transit encryption not enabled"));
        assert_eq!(evaluate(Some(&cfg(false, false)), req(true, false)), Finding::InTransitDisabled);
    }

    #[test]
    fn fallback_when_missing_flags_not_required() {
        let f = evaluate(Some(&cfg(false, false)), req(false, false));
        assert_eq!((f.verdict(), f.reason()), (Verdict::Fail, "neither required encryption enabled"));
        assert_eq!(evaluate(Some(&cfg(true, false)), req(true, false)), Finding::Unexpected);
        assert_eq!(evaluate(Some(&cfg(false, true)), req(false, true)), Finding::Unexpected);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let c = cfg(true, false);
        assert_eq!(evaluate(Some(&c), req(true, true)), evaluate(Some(&c), req(true, true)));
    }

    #[test]
    fn requirements_follow_options() {
        let mut o = CheckOptions::default();
        assert_eq!(EncryptionRequirements::from(&o), EncryptionRequirements::default());
        o.require_at_rest_encryption = false;
        assert_eq!(EncryptionRequirements::from(&o), req(true, false));
    }
}
