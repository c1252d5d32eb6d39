//! Known-issue identifiers, the compiled catalog, and candidate scoring.
//!
//! Identifiers are plain serde data. They are compiled once into
//! [`CompiledIdentifier`]s when the catalog is built; a malformed pattern is a
//! build-time error and never surfaces while matching.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::context::TestInfo;
use crate::core::status::Status;

/// Who owns the defect behind a known issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownIssueType {
    #[default]
    Automation,
    Application,
    External,
}

/// Declarative match rule for one known issue, as written in a catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KnownIssueIdentifier {
    /// Pattern the whole failure message must match. Mandatory.
    pub assertion_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_pattern: Option<String>,
    /// Runtime data name -> pattern its current value must match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_patterns: BTreeMap<String, String>,
    /// Configuration property -> pattern; entries that do not match are dropped at load.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_patterns: BTreeMap<String, String>,
    #[serde(rename = "type", default)]
    pub kind: KnownIssueType,
    /// Issue tracker the id belongs to, used to look up fixed/open state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<String>,
    #[serde(default)]
    pub fail_case_fast: bool,
    #[serde(default)]
    pub fail_suite_fast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A regex that must match the entire input.
#[derive(Debug, Clone)]
pub struct FullMatch {
    source: String,
    regex: Regex,
}

impl FullMatch {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, "")
    }

    /// Full match where `.` also matches line breaks (for multi-line failure messages).
    pub fn dot_all(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, "(?s)")
    }

    fn build(pattern: &str, flags: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(r"{flags}\A(?:{pattern})\z"))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Identifier with every pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledIdentifier {
    pub definition: KnownIssueIdentifier,
    assertion: FullMatch,
    suite: Option<FullMatch>,
    case: Option<FullMatch>,
    step: Option<FullMatch>,
    data: Vec<(String, FullMatch)>,
}

impl CompiledIdentifier {
    /// Compile all patterns, collecting one message per invalid pattern.
    pub fn compile(id: &str, definition: KnownIssueIdentifier) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        if definition.assertion_pattern.is_empty() {
            errors.push(format!("{id}: field 'assertionPattern' must not be empty"));
        }
        let assertion = collect(
            FullMatch::dot_all(&definition.assertion_pattern),
            id,
            "assertionPattern",
            &mut errors,
        );
        let suite = compile_optional(&definition.suite_pattern, id, "suitePattern", &mut errors);
        let case = compile_optional(&definition.case_pattern, id, "casePattern", &mut errors);
        let step = compile_optional(&definition.step_pattern, id, "stepPattern", &mut errors);
        let mut data = Vec::new();
        for (name, pattern) in &definition.data_patterns {
            let field = format!("dataPatterns.{name}");
            if let Some(compiled) = collect(FullMatch::new(pattern), id, &field, &mut errors) {
                data.push((name.clone(), compiled));
            }
        }

        match assertion {
            Some(assertion) if errors.is_empty() => Ok(Self {
                definition,
                assertion,
                suite,
                case,
                step,
                data,
            }),
            _ => Err(errors),
        }
    }

    pub fn has_context_patterns(&self) -> bool {
        self.suite.is_some() || self.case.is_some() || self.step.is_some()
    }

    fn context_patterns<'a>(
        &'a self,
        info: &'a TestInfo,
    ) -> [(Option<&'a FullMatch>, Option<&'a str>); 3] {
        [
            (self.suite.as_ref(), info.suite.as_deref()),
            (self.case.as_ref(), info.case.as_deref()),
            (self.step.as_ref(), info.step.as_deref()),
        ]
    }

    /// True if the failure message matches the assertion pattern.
    pub fn matches_assertion(&self, failure: &str) -> bool {
        self.assertion.is_match(failure)
    }

    /// True if every data pattern has a value and that value matches.
    pub fn matches_data(&self, data: &dyn RuntimeData) -> bool {
        self.data.iter().all(|(name, pattern)| {
            data.value(name)
                .is_some_and(|value| pattern.is_match(&value))
        })
    }

    /// A test is potentially known when a configured context pattern does not
    /// match a field that is present.
    pub fn is_potentially_known(&self, info: Option<&TestInfo>) -> bool {
        let Some(info) = info else {
            return false;
        };
        self.has_context_patterns()
            && self.context_patterns(info).iter().any(|(pattern, value)| {
                matches!((pattern, value), (Some(pattern), Some(value)) if !pattern.is_match(value))
            })
    }

    /// Number of context patterns (0..=3) that matched their field.
    pub fn matched_context_patterns(&self, info: Option<&TestInfo>) -> usize {
        let Some(info) = info else {
            return 0;
        };
        self.context_patterns(info)
            .iter()
            .filter(|(pattern, value)| {
                matches!((pattern, value), (Some(pattern), Some(value)) if pattern.is_match(value))
            })
            .count()
    }
}

fn collect(
    compiled: Result<FullMatch, regex::Error>,
    id: &str,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<FullMatch> {
    match compiled {
        Ok(compiled) => Some(compiled),
        Err(err) => {
            errors.push(format!("{id}: invalid pattern in '{field}': {err}"));
            None
        }
    }
}

fn compile_optional(
    pattern: &Option<String>,
    id: &str,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<FullMatch> {
    pattern
        .as_deref()
        .and_then(|pattern| collect(FullMatch::new(pattern), id, field, errors))
}

/// Source of named runtime values consulted by data patterns.
pub trait RuntimeData {
    fn value(&self, name: &str) -> Option<String>;
}

impl RuntimeData for BTreeMap<String, String> {
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl RuntimeData for HashMap<String, String> {
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Process-wide, immutable catalog of known issues in catalog order.
#[derive(Debug, Clone, Default)]
pub struct KnownIssueCatalog {
    entries: IndexMap<String, CompiledIdentifier>,
}

impl KnownIssueCatalog {
    /// Compile every identifier; all errors across all entries are reported together.
    pub fn compile(identifiers: IndexMap<String, KnownIssueIdentifier>) -> Result<Self> {
        let mut entries = IndexMap::new();
        let mut errors = Vec::new();
        for (id, definition) in identifiers {
            match CompiledIdentifier::compile(&id, definition) {
                Ok(compiled) => {
                    entries.insert(id, compiled);
                }
                Err(mut entry_errors) => errors.append(&mut entry_errors),
            }
        }
        if !errors.is_empty() {
            bail!("invalid known issues:\n- {}", errors.join("\n- "));
        }
        Ok(Self { entries })
    }

    /// Wrap identifiers that were already compiled (e.g. by a loader that
    /// collects errors across several files).
    pub fn from_compiled(entries: IndexMap<String, CompiledIdentifier>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CompiledIdentifier> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CompiledIdentifier)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }
}

/// Highest score a candidate can reach (suite, case and step all matched).
pub const MAX_SCORE: usize = 3;

/// A catalog entry that survived filtering for one failure.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub identifier: &'a CompiledIdentifier,
    pub potentially_known: bool,
    pub score: usize,
}

/// Pick the best catalog entry for `failure`.
///
/// Entries must fully match the assertion and every data pattern. Potentially
/// known entries score 0 and are rejected outright when `keep_potentially_known`
/// is false. Ties go to the entry that comes first in catalog order.
pub fn best_candidate<'a>(
    catalog: &'a KnownIssueCatalog,
    failure: &str,
    info: Option<&TestInfo>,
    data: &dyn RuntimeData,
    keep_potentially_known: bool,
) -> Option<Candidate<'a>> {
    let mut best: Option<Candidate<'a>> = None;
    for (id, identifier) in catalog.iter() {
        if !identifier.matches_assertion(failure) || !identifier.matches_data(data) {
            continue;
        }
        let potentially_known = identifier.is_potentially_known(info);
        if potentially_known && !keep_potentially_known {
            continue;
        }
        let score = if potentially_known {
            0
        } else {
            identifier.matched_context_patterns(info)
        };
        if best.is_none_or(|current| score > current.score) {
            best = Some(Candidate {
                id,
                identifier,
                potentially_known,
                score,
            });
            if score == MAX_SCORE {
                break;
            }
        }
    }
    best
}

/// Resolution a tracker reports for a fixed defect.
pub const FIXED_RESOLUTION: &str = "Fixed";

/// Fixed/open state of an issue as reported by its tracker.
///
/// `fixed` forces the issue to count as fixed whatever its tracker details say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueState {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub fixed: bool,
}

impl IssueState {
    /// Fixed when pinned as such or resolved as `Fixed` by the tracker.
    pub fn is_fixed(&self) -> bool {
        self.fixed
            || self
                .resolution
                .as_deref()
                .is_some_and(|resolution| resolution.trim().eq_ignore_ascii_case(FIXED_RESOLUTION))
    }
}

/// Verdict for one failure that matched a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownIssue {
    pub id: String,
    pub identifier: KnownIssueIdentifier,
    pub potentially_known: bool,
    pub fixed: bool,
    pub details: Option<IssueState>,
}

impl KnownIssue {
    /// An open issue matched with full confidence.
    pub fn is_open_known_issue(&self) -> bool {
        !self.fixed && !self.potentially_known
    }

    pub fn status(&self) -> Status {
        if self.is_open_known_issue() {
            Status::KnownIssuesOnly
        } else {
            Status::Failed
        }
    }
}

/// One failed assertion and its known-issue verdict, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionFailure {
    pub message: String,
    #[serde(default)]
    pub known_issue: Option<KnownIssue>,
}

impl AssertionFailure {
    /// Open known issues are tolerated; everything else is a failure.
    pub fn status(&self) -> Status {
        self.known_issue
            .as_ref()
            .map_or(Status::Failed, KnownIssue::status)
    }
}

/// Status of a step that failed verification with the given assertion failures.
///
/// Only a step whose every failure is an open known issue counts as known issues only.
pub fn verification_status(failures: &[AssertionFailure]) -> Status {
    if !failures.is_empty()
        && failures
            .iter()
            .all(|failure| failure.status() == Status::KnownIssuesOnly)
    {
        Status::KnownIssuesOnly
    } else {
        Status::Failed
    }
}
