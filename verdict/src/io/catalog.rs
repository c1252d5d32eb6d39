//! Known-issue catalog loading with schema and pattern validation.
//!
//! Catalog files are JSON objects keyed by issue id. Every problem found in
//! every file (schema violations, bad patterns, duplicate ids) is collected
//! and reported as a single error so a broken catalog can be fixed in one pass.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::known_issue::{
    CompiledIdentifier, FullMatch, KnownIssueCatalog, KnownIssueIdentifier,
};

const IDENTIFIER_SCHEMA: &str = include_str!("../../schemas/known_issue.schema.json");

/// Default catalog file name.
pub const CATALOG_FILE: &str = "known-issues.json";

/// Load and merge catalog files in order.
///
/// Missing files are skipped with a warning. `properties` feeds the
/// `propertyPatterns` load-time filter.
pub fn load_catalog(
    paths: &[PathBuf],
    properties: &BTreeMap<String, String>,
) -> Result<KnownIssueCatalog> {
    let mut loader = CatalogLoader::new(properties)?;
    for path in paths {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "known issue functionality is not available: catalog file not found"
            );
            continue;
        }
        debug!(path = %path.display(), "loading known issue identifiers");
        let contents =
            fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
        loader.add_source(&path.display().to_string(), &contents);
    }
    loader.finish()
}

/// Parse a single catalog document (mostly useful for tests and tooling).
pub fn parse_catalog(
    source: &str,
    contents: &str,
    properties: &BTreeMap<String, String>,
) -> Result<KnownIssueCatalog> {
    let mut loader = CatalogLoader::new(properties)?;
    loader.add_source(source, contents);
    loader.finish()
}

struct CatalogLoader<'a> {
    validator: Validator,
    properties: &'a BTreeMap<String, String>,
    entries: IndexMap<String, CompiledIdentifier>,
    /// Ids seen so far, including ones dropped by property filters.
    seen: BTreeMap<String, String>,
    errors: Vec<String>,
}

impl<'a> CatalogLoader<'a> {
    fn new(properties: &'a BTreeMap<String, String>) -> Result<Self> {
        let schema: Value =
            serde_json::from_str(IDENTIFIER_SCHEMA).context("parse known issue schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid known issue schema: {}", err))?;
        Ok(Self {
            validator,
            properties,
            entries: IndexMap::new(),
            seen: BTreeMap::new(),
            errors: Vec::new(),
        })
    }

    fn add_source(&mut self, source: &str, contents: &str) {
        let document: Value = match serde_json::from_str(contents) {
            Ok(document) => document,
            Err(err) => {
                self.errors.push(format!("{source}: invalid JSON: {err}"));
                return;
            }
        };
        let Value::Object(map) = document else {
            self.errors
                .push(format!("{source}: catalog must be an object keyed by issue id"));
            return;
        };

        for (id, entry) in map {
            self.add_entry(source, id, entry);
        }
    }

    fn add_entry(&mut self, source: &str, id: String, entry: Value) {
        if let Some(previous) = self.seen.get(&id) {
            self.errors.push(format!(
                "{source}: duplicate known issue '{id}' (first defined in {previous})"
            ));
            return;
        }
        self.seen.insert(id.clone(), source.to_string());

        let violations: Vec<String> = self
            .validator
            .iter_errors(&entry)
            .map(|err| format!("{source}: {id}: {err}"))
            .collect();
        if !violations.is_empty() {
            self.errors.extend(violations);
            return;
        }

        let definition: KnownIssueIdentifier = match serde_json::from_value(entry) {
            Ok(definition) => definition,
            Err(err) => {
                self.errors.push(format!("{source}: {id}: {err}"));
                return;
            }
        };

        if self.passes_property_filters(source, &id, &definition) != Some(true) {
            return;
        }

        match CompiledIdentifier::compile(&id, definition) {
            Ok(compiled) => {
                self.entries.insert(id, compiled);
            }
            Err(entry_errors) => self.errors.extend(
                entry_errors
                    .into_iter()
                    .map(|message| format!("{source}: {message}")),
            ),
        }
    }

    /// `Some(true)` keeps the entry, `Some(false)` filters it out, `None` means
    /// a pattern was invalid (already recorded as an error).
    fn passes_property_filters(
        &mut self,
        source: &str,
        id: &str,
        definition: &KnownIssueIdentifier,
    ) -> Option<bool> {
        let mut keep = true;
        let mut valid = true;
        for (property, pattern) in &definition.property_patterns {
            let compiled = match FullMatch::new(pattern) {
                Ok(compiled) => compiled,
                Err(err) => {
                    self.errors.push(format!(
                        "{source}: {id}: invalid pattern in 'propertyPatterns.{property}': {err}"
                    ));
                    valid = false;
                    continue;
                }
            };
            let value = self.properties.get(property);
            if !value.is_some_and(|value| compiled.is_match(value)) {
                info!(
                    id,
                    property = property.as_str(),
                    pattern = pattern.as_str(),
                    value = ?value,
                    "known issue filtered out by property pattern"
                );
                keep = false;
            }
        }
        valid.then_some(keep)
    }

    fn finish(self) -> Result<KnownIssueCatalog> {
        if !self.errors.is_empty() {
            bail!("invalid known issues:\n- {}", self.errors.join("\n- "));
        }
        debug!(entries = self.entries.len(), "known issue catalog loaded");
        Ok(KnownIssueCatalog::from_compiled(self.entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_properties() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn parses_entries_in_file_order() {
        let contents = r#"{
            "ZED-1": { "assertionPattern": "first .*" },
            "ABC-2": {
                "assertionPattern": "second .*",
                "suitePattern": "Story.*",
                "casePattern": "Scenario 1.*",
                "stepPattern": "Given.*",
                "dataPatterns": { "currentPageUrl": ".*example.com" },
                "type": "application",
                "tracker": "JIRA",
                "failCaseFast": true,
                "description": "flaky login"
            }
        }"#;
        let catalog = parse_catalog("known-issues.json", contents, &no_properties()).expect("parse");

        let ids: Vec<&str> = catalog.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["ZED-1", "ABC-2"]);
        let entry = catalog.get("ABC-2").expect("entry");
        assert_eq!(entry.definition.tracker.as_deref(), Some("JIRA"));
        assert!(entry.definition.fail_case_fast);
        assert!(!entry.definition.fail_suite_fast);
    }

    /// All problems across all entries are reported together.
    #[test]
    fn aggregates_every_error_into_one() {
        let contents = r#"{
            "MISSING-1": { "stepPattern": "Given.*" },
            "BAD-REGEX": { "assertionPattern": "(unclosed" },
            "MISSING-2": { "description": "no pattern" },
            "GOOD": { "assertionPattern": "fine" }
        }"#;
        let err = parse_catalog("known-issues.json", contents, &no_properties())
            .expect_err("expected error");
        let message = err.to_string();

        assert!(message.starts_with("invalid known issues:"));
        assert!(message.contains("MISSING-1"));
        assert!(message.contains("MISSING-2"));
        assert!(message.contains("BAD-REGEX: invalid pattern in 'assertionPattern'"));
        assert!(!message.contains("GOOD"));
    }

    #[test]
    fn rejects_unknown_fields_and_non_object_documents() {
        let err = parse_catalog(
            "a.json",
            r#"{ "X-1": { "assertionPattern": "x", "storyPatern": "typo" } }"#,
            &no_properties(),
        )
        .expect_err("unknown field");
        assert!(err.to_string().contains("X-1"));

        let err = parse_catalog("b.json", "[]", &no_properties()).expect_err("array");
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn property_patterns_filter_entries_at_load() {
        let contents = r#"{
            "KEEP": {
                "assertionPattern": "x",
                "propertyPatterns": { "mainPageUrl": ".*examples.com" }
            },
            "DROP": {
                "assertionPattern": "y",
                "propertyPatterns": { "mainPageUrl": ".*other.com" }
            },
            "DROP-MISSING": {
                "assertionPattern": "z",
                "propertyPatterns": { "environment": "prod" }
            }
        }"#;
        let mut properties = BTreeMap::new();
        properties.insert("mainPageUrl".to_string(), "http://examples.com".to_string());

        let catalog = parse_catalog("known-issues.json", contents, &properties).expect("parse");
        let ids: Vec<&str> = catalog.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["KEEP"]);
    }

    #[test]
    fn load_skips_missing_files_and_rejects_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = temp.path().join("first.json");
        let second = temp.path().join("second.json");
        fs::write(&first, r#"{ "ISSUE-1": { "assertionPattern": "a" } }"#).expect("write first");
        fs::write(&second, r#"{ "ISSUE-2": { "assertionPattern": "b" } }"#).expect("write second");

        let catalog = load_catalog(
            &[first.clone(), temp.path().join("missing.json"), second],
            &no_properties(),
        )
        .expect("load");
        assert_eq!(catalog.len(), 2);

        let err = load_catalog(&[first.clone(), first], &no_properties()).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate known issue 'ISSUE-1'"));
    }

    #[test]
    fn no_files_yields_empty_catalog() {
        let temp = tempfile::tempdir().expect("tempdir");
        let catalog = load_catalog(&[temp.path().join(CATALOG_FILE)], &no_properties())
            .expect("load");
        assert!(catalog.is_empty());
    }
}
