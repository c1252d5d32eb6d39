//! `statistics.json` persistence.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::statistic::Statistics;

pub const STATISTICS_FILE: &str = "statistics.json";

/// Location of the statistics file inside `dir`.
pub fn statistics_path(dir: &Path) -> PathBuf {
    dir.join(STATISTICS_FILE)
}

/// Load statistics previously written by [`write_statistics`].
pub fn load_statistics(path: &Path) -> Result<Statistics> {
    debug!(path = %path.display(), "loading statistics");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read statistics {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse statistics {}", path.display()))
}

/// Write pretty-printed statistics into `dir`, creating it if needed.
///
/// Returns the path of the written file.
pub fn write_statistics(dir: &Path, statistics: &Statistics) -> Result<PathBuf> {
    let path = statistics_path(dir);
    debug!(path = %path.display(), "writing statistics");
    let mut buf = serde_json::to_string_pretty(statistics).context("serialize statistics")?;
    buf.push('\n');
    write_atomic(&path, &buf)?;
    Ok(path)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("statistics path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp statistics {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace statistics {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::statistic::{Entity, empty_statistics};
    use crate::core::status::Status;

    /// Verifies write then load reproduces identical counters.
    #[test]
    fn statistics_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut statistics = empty_statistics();
        let story = statistics.entry(Entity::Story).or_default();
        story.record(Status::Passed);
        story.record(Status::KnownIssuesOnly);
        let step = statistics.entry(Entity::Step).or_default();
        step.record(Status::Broken);
        step.record(Status::Pending);
        step.record(Status::Skipped);

        let path = write_statistics(&temp.path().join("nested/out"), &statistics).expect("write");
        assert!(path.ends_with("nested/out/statistics.json"));
        let loaded = load_statistics(&path).expect("load");
        assert_eq!(loaded, statistics);
    }

    /// Guards the persisted layout: entity order and counter field names.
    #[test]
    fn empty_statistics_format_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_statistics(temp.path(), &empty_statistics()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");

        let counters = "{\n    \"total\": 0,\n    \"passed\": 0,\n    \"failed\": 0,\n    \"broken\": 0,\n    \"skipped\": 0,\n    \"pending\": 0,\n    \"knownIssue\": 0\n  }";
        let expected = format!(
            "{{\n  \"STORY\": {counters},\n  \"SCENARIO\": {counters},\n  \"STEP\": {counters},\n  \"GIVEN_STORY\": {counters}\n}}\n"
        );
        assert_eq!(contents, expected);
    }

    #[test]
    fn overwrites_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut statistics = empty_statistics();
        write_statistics(temp.path(), &statistics).expect("first write");
        statistics
            .entry(Entity::Scenario)
            .or_default()
            .record(Status::Failed);
        let path = write_statistics(temp.path(), &statistics).expect("second write");
        let loaded = load_statistics(&path).expect("load");
        assert_eq!(loaded[&Entity::Scenario].failed, 1);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
