//! Verdict configuration stored in `verdict.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::known_issue::IssueState;
use crate::io::catalog::CATALOG_FILE;

pub const CONFIG_FILE: &str = "verdict.toml";

/// Verdict configuration (TOML).
///
/// Missing fields take defaults, so an absent file is a valid configuration.
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerdictConfig {
    /// Directory receiving `statistics.json` at the end of a run.
    pub statistics_dir: PathBuf,

    /// Keep one failure entry per failed assertion and broken step.
    pub collect_failures: bool,

    /// Report loosely matched known issues as potentially known instead of
    /// discarding them.
    pub detect_potentially_known: bool,

    /// Known-issue catalog files, merged in order.
    pub catalog_paths: Vec<PathBuf>,

    /// Properties consulted by catalog `propertyPatterns`.
    pub properties: BTreeMap<String, String>,

    /// Pinned issue states keyed by `issue-id` or `tracker/issue-id`.
    pub issue_states: BTreeMap<String, IssueState>,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            statistics_dir: PathBuf::from("output/statistics"),
            collect_failures: false,
            detect_potentially_known: true,
            catalog_paths: vec![PathBuf::from(CATALOG_FILE)],
            properties: BTreeMap::new(),
            issue_states: BTreeMap::new(),
        }
    }
}

impl VerdictConfig {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.statistics_dir.as_os_str().is_empty() {
            errors.push("statistics_dir must not be empty".to_string());
        }
        for (index, path) in self.catalog_paths.iter().enumerate() {
            if path.as_os_str().is_empty() {
                errors.push(format!("catalog_paths[{index}] must not be empty"));
            }
        }
        for key in self.properties.keys() {
            if key.trim().is_empty() {
                errors.push("properties keys must not be blank".to_string());
            }
        }
        for key in self.issue_states.keys() {
            if key.trim().is_empty() || key.ends_with('/') {
                errors.push(format!("issue_states key '{key}' must name an issue"));
            }
        }
        if !errors.is_empty() {
            bail!("invalid config:\n- {}", errors.join("\n- "));
        }
        Ok(())
    }

    /// Join relative paths onto `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        self.statistics_dir = resolve(self.statistics_dir);
        self.catalog_paths = self.catalog_paths.into_iter().map(resolve).collect();
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `VerdictConfig::default()`. Paths in the
/// result are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<VerdictConfig> {
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if !path.exists() {
        let cfg = VerdictConfig::default();
        cfg.validate()?;
        return Ok(cfg.resolve_paths(&base));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: VerdictConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg.resolve_paths(&base))
}
