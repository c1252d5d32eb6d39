//! CLI tests for `verdict replay`, `verdict classify` and `verdict catalog`.
//!
//! Spawns the verdict binary and verifies exit codes and printed output for
//! passing, known-issue, failing and invalid runs.

use std::process::{Command, Output};

use verdict::aggregator::Phase;
use verdict::events::LifecycleEvent;
use verdict::exit_codes;
use verdict::test_support::{TestProject, single_step_story};

const CATALOG: &str = r#"{
  "ISSUE-1": { "assertionPattern": "Expected .* but got .*", "tracker": "JIRA" }
}"#;

fn verdict(project: &TestProject, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_verdict"))
        .current_dir(project.root())
        .args(args)
        .output()
        .expect("run verdict")
}

fn wrapped(mut events: Vec<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut all = vec![
        LifecycleEvent::BeforeStoriesSteps {
            phase: Phase::Before,
        },
        LifecycleEvent::AfterStoriesSteps {
            phase: Phase::Before,
        },
    ];
    all.append(&mut events);
    all.push(LifecycleEvent::BeforeStoriesSteps {
        phase: Phase::After,
    });
    all.push(LifecycleEvent::AfterStoriesSteps {
        phase: Phase::After,
    });
    all
}

fn verification_failed(step: &str) -> LifecycleEvent {
    LifecycleEvent::Failed {
        step: step.to_string(),
        error: None,
    }
}

#[test]
fn passing_run_exits_ok_and_writes_statistics() {
    let project = TestProject::new();
    let events = project.write_events(
        "events.jsonl",
        &wrapped(single_step_story(
            "Story",
            "Scenario",
            "Then ok",
            &[],
            LifecycleEvent::Successful {
                step: "Then ok".to_string(),
            },
        )),
    );

    let output = verdict(&project, &["replay", events.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let statistics = project.root().join("output/statistics/statistics.json");
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(statistics).expect("read statistics"))
            .expect("parse statistics");
    assert_eq!(written["STEP"]["passed"], 1);
    assert_eq!(written["SCENARIO"]["total"], 1);
}

#[test]
fn open_known_issue_exits_with_known_issues_code() {
    let project = TestProject::new();
    project.write_catalog(CATALOG);
    project.write_events(
        "events.jsonl",
        &wrapped(single_step_story(
            "Story",
            "Scenario",
            "Then status is 200",
            &["Expected 200 but got 404"],
            verification_failed("Then status is 200"),
        )),
    );

    let output = verdict(&project, &["replay", "events.jsonl"]);
    assert_eq!(output.status.code(), Some(exit_codes::KNOWN_ISSUES));
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["status"], "KNOWN_ISSUES_ONLY");
    assert_eq!(summary["exitCode"], "KNOWN_ISSUES");
}

#[test]
fn fixed_known_issue_exits_with_failure() {
    let project = TestProject::new();
    project.write_catalog(CATALOG);
    project.write_config(
        r#"
[issue_states."JIRA/ISSUE-1"]
status = "Closed"
fixed = true
"#,
    );
    project.write_events(
        "events.jsonl",
        &single_step_story(
            "Story",
            "Scenario",
            "Then status is 200",
            &["Expected 200 but got 404"],
            verification_failed("Then status is 200"),
        ),
    );

    let output = verdict(&project, &["replay", "events.jsonl"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
}

#[test]
fn tracker_resolved_issue_exits_with_failure() {
    let project = TestProject::new();
    project.write_catalog(CATALOG);
    project.write_config(
        r#"
[issue_states."JIRA/ISSUE-1"]
status = "Closed"
resolution = "Fixed"
"#,
    );
    project.write_events(
        "events.jsonl",
        &wrapped(single_step_story(
            "Story",
            "Scenario",
            "Then status is 200",
            &["Expected 200 but got 404"],
            verification_failed("Then status is 200"),
        )),
    );

    let output = verdict(&project, &["replay", "events.jsonl"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["status"], "FAILED");
}

#[test]
fn run_without_any_status_fails() {
    let project = TestProject::new();
    project.write_events("events.jsonl", &[]);
    let output = verdict(&project, &["replay", "events.jsonl"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
}

#[test]
fn invalid_catalog_reports_every_entry() {
    let project = TestProject::new();
    project.write_catalog(
        r#"{
  "BAD-1": { "assertionPattern": "(" },
  "BAD-2": { "stepPattern": "Given .*" }
}"#,
    );

    let output = verdict(&project, &["catalog"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid known issues"));
    assert!(stderr.contains("BAD-1"));
    assert!(stderr.contains("BAD-2"));
}

#[test]
fn catalog_lists_entries() {
    let project = TestProject::new();
    project.write_catalog(CATALOG);
    let output = verdict(&project, &["catalog"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ISSUE-1"));
    assert!(stdout.contains("1 known issues"));
}

#[test]
fn classify_prints_verdict() {
    let project = TestProject::new();
    project.write_catalog(CATALOG);

    let output = verdict(
        &project,
        &["classify", "--message", "Expected 200 but got 404"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(parsed["status"], "KNOWN_ISSUES_ONLY");
    assert_eq!(parsed["knownIssue"]["id"], "ISSUE-1");
    assert_eq!(parsed["knownIssue"]["potentiallyKnown"], false);

    let output = verdict(&project, &["classify", "--message", "unrelated"]);
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(parsed["status"], "FAILED");
    assert!(parsed["knownIssue"].is_null());
}
