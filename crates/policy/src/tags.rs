use emrguard_core::{CheckError, ExclusionRule, RuleValue, Tag};
use regex::{Regex, RegexBuilder};

/// Key and value tests of one rule. Keys, patterns and list members are all
/// compiled to anchored regexes so case-insensitive matching uses the same
/// Unicode simple case folding for every form.
#[derive(Debug, Clone)]
struct CompiledRule {
    key: Regex,
    /// `None` for an empty list, which matches nothing.
    value: Option<Regex>,
}

impl CompiledRule {
    fn accepts(&self, tag: &Tag) -> bool {
        self.key.is_match(&tag.key) && self.value.as_ref().is_some_and(|v| v.is_match(&tag.value))
    }
}

/// Exclusion rules compiled once and matched against any number of tag sets.
#[derive(Debug, Clone)]
pub struct TagMatcher { rules: Vec<CompiledRule> }

/// Anchored alternation of `alternatives`, each already escaped.
fn anchored(key: &str, alternatives: &[String], case_insensitive: bool) -> Result<Regex, CheckError> {
    RegexBuilder::new(&format!("^(?:{})$", alternatives.join("|")))
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| CheckError::InvalidPattern { key: key.to_string(), reason: e.to_string() })
}

/// Literal text between wildcards is escaped, so `.` or `+` in a rule value
/// only ever match themselves.
fn wildcard(value: &str) -> String {
    value.split('*').map(regex::escape).collect::<Vec<_>>().join(".*")
}

impl TagMatcher {
    pub fn new(rules: &[ExclusionRule], case_insensitive: bool) -> Result<Self, CheckError> {
        let rules = rules.iter().map(|rule| {
            let value = match &rule.value {
                RuleValue::Pattern(p) => Some(anchored(&rule.key, &[wildcard(p)], case_insensitive)?),
                RuleValue::OneOf(vs) if vs.is_empty() => None,
                RuleValue::OneOf(vs) => {
                    let literals: Vec<String> = vs.iter().map(|v| regex::escape(v)).collect();
                    Some(anchored(&rule.key, &literals, case_insensitive)?)
                }
            };
            let key = anchored(&rule.key, &[regex::escape(&rule.key)], case_insensitive)?;
            Ok(CompiledRule { key, value })
        }).collect::<Result<Vec<_>, CheckError>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool { self.rules.is_empty() }

    /// Every tag satisfying at least one rule. A tag matched by several rules
    /// appears once per rule.
    pub fn matches<'a>(&self, tags: &'a [Tag]) -> Vec<&'a Tag> {
        let mut out = Vec::new();
        for rule in &self.rules {
            for tag in tags {
                if rule.accepts(tag) { out.push(tag); }
            }
        }
        out
    }

    pub fn is_excluded(&self, tags: &[Tag]) -> bool {
        self.rules.iter().any(|rule| tags.iter().any(|tag| rule.accepts(tag)))
    }

}

/// One-shot form of [`TagMatcher::matches`].
pub fn match_tags<'a>(rules: &[ExclusionRule], tags: &'a [Tag], case_insensitive: bool) -> Result<Vec<&'a Tag>, CheckError> {
    Ok(TagMatcher::new(rules, case_insensitive)?.matches(tags))
}
