//! Project discovery
//!
//! Walks the search paths given on the command line and records every folder
//! holding a `project.json` descriptor. The walk skips version-control
//! metadata and does not descend into a project once found.

use super::error::DiscoveryError;
use super::model::ProjectFolder;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Descriptor file that marks a project folder.
pub const PROJECT_DESCRIPTOR: &str = "project.json";

const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg", "CVS"];

/// Flag names a user might have typed without dashes.
const FLAG_NAMES: &[&str] = &[
    "build",
    "shutdown",
    "delete-live-activity",
    "delete-activity",
    "upload",
    "create",
    "upgrade",
    "deploy",
    "config",
    "group-remove",
    "group-delete",
    "group-create",
    "group-add",
    "activate",
    "reactivate",
    "list",
    "all",
];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    identifying_name: String,
    #[serde(default)]
    version: Option<String>,
}

/// Discover project folders under every search path, sorted by path.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<ProjectFolder>, DiscoveryError> {
    let mut folders = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(DiscoveryError::MissingPath {
                path: path.clone(),
                hint: flag_hint(path),
            });
        }
        walk(path, &mut folders)?;
    }

    folders.sort();
    folders.dedup();
    debug!(count = folders.len(), "discovered project folders");
    Ok(folders)
}

fn walk(dir: &Path, folders: &mut Vec<ProjectFolder>) -> Result<(), DiscoveryError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let descriptor = dir.join(PROJECT_DESCRIPTOR);
    if descriptor.is_file() {
        folders.push(read_descriptor(dir, &descriptor)?);
        return Ok(());
    }

    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if SKIPPED_DIRS.iter().any(|skip| name == *skip) {
            continue;
        }
        children.push(entry.path());
    }
    children.sort();

    for child in children {
        walk(&child, folders)?;
    }
    Ok(())
}

fn read_descriptor(dir: &Path, descriptor: &Path) -> Result<ProjectFolder, DiscoveryError> {
    let data = fs::read(descriptor)?;
    let parsed: Descriptor =
        serde_json::from_slice(&data).map_err(|err| DiscoveryError::InvalidDescriptor {
            path: descriptor.to_path_buf(),
            detail: err.to_string(),
        })?;

    Ok(ProjectFolder {
        path: dir.to_path_buf(),
        activity_name: parsed.identifying_name,
        version: parsed.version,
    })
}

fn flag_hint(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    let bare = text.trim_start_matches('-');
    if FLAG_NAMES.contains(&bare) {
        return Some(format!("did you mean --{bare}?"));
    }
    if text.starts_with('-') {
        return Some(format!("{text} looks like a flag; flags must come before search paths"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_project(root: &Path, rel: &str, name: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(PROJECT_DESCRIPTOR),
            format!(r#"{{"identifyingName": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
    }

    #[test]
    fn test_discovers_nested_projects() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), "a/display", "com.example.display");
        write_project(temp.path(), "b/kiosk", "com.example.kiosk");
        write_project(temp.path(), "b/kiosk/inner", "com.example.ignored");

        let folders = discover(&[temp.path().to_path_buf()]).unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.activity_name.as_str()).collect();
        assert_eq!(names, vec!["com.example.display", "com.example.kiosk"]);
        assert_eq!(folders[0].version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_skips_version_control_dirs() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), ".git/hooks", "com.example.hidden");
        write_project(temp.path(), "real", "com.example.real");

        let folders = discover(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].activity_name, "com.example.real");
    }

    #[test]
    fn test_missing_path_with_flag_hint() {
        let err = discover(&[PathBuf::from("deploy")]).unwrap_err();
        match err {
            DiscoveryError::MissingPath { hint, .. } => {
                assert_eq!(hint.as_deref(), Some("did you mean --deploy?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_plain_path_has_no_hint() {
        let temp = TempDir::new().unwrap();
        let err = discover(&[temp.path().join("nowhere")]).unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingPath { hint: None, .. }));
    }

    #[test]
    fn test_invalid_descriptor() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PROJECT_DESCRIPTOR), "{not json").unwrap();
        let err = discover(&[temp.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidDescriptor { .. }));
    }
}
