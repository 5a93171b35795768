//! Configuration parser with validation
//!
//! Parses YAML and validates the config version, target uniqueness, and each
//! target's own settings

use scdx_core::errors::ExError;
use scdx_core::SnapshotConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::errors::{config_invalid, io_error, Result};

/// The only configuration format understood by this build
pub const CONFIG_VERSION: u32 = 1;

/// Every snapshot target of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotProject {
    pub config_version: u32,
    pub snapshots: Vec<SnapshotConfig>,
}

impl SnapshotProject {
    /// Configuration of one target
    pub fn get(&self, target: &str) -> Option<&SnapshotConfig> {
        self.snapshots.iter().find(|s| s.target == target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.snapshots.iter().map(|s| s.target.as_str())
    }
}

/// Parse a configuration file from a path
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, otherwise as [`parse_config_str`].
pub fn parse_config_file(path: &Path) -> Result<SnapshotProject> {
    let content = fs::read_to_string(path).map_err(|e| io_error("config_read", e))?;
    parse_config_str(&content)
}

/// Parse a configuration from a string
///
/// # Errors
///
/// Returns `InvalidConfig` for YAML errors, unknown fields, an unsupported
/// `config_version`, duplicate targets, or any invalid target.
pub fn parse_config_str(content: &str) -> Result<SnapshotProject> {
    let project: SnapshotProject = serde_yaml::from_str(content)
        .map_err(|e| config_invalid(&format!("YAML parse error: {}", e)))?;

    validate_project(&project)?;

    tracing::debug!(targets = project.snapshots.len(), "Parsed snapshot config");
    Ok(project)
}

fn validate_project(project: &SnapshotProject) -> Result<()> {
    if project.config_version != CONFIG_VERSION {
        return Err(config_invalid(&format!(
            "Unsupported config_version: {}. Expected {}",
            project.config_version, CONFIG_VERSION
        )));
    }

    if project.snapshots.is_empty() {
        return Err(config_invalid("snapshots must list at least one target"));
    }

    let mut targets = HashSet::new();
    for snapshot in &project.snapshots {
        if !targets.insert(snapshot.target.as_str()) {
            return Err(config_invalid(&format!(
                "Duplicate target {}",
                snapshot.target
            )));
        }
        snapshot
            .validate()
            .map_err(|e| ExError::from(e).with_op("config_parse"))?;
    }

    Ok(())
}
