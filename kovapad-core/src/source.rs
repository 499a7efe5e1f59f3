//! Submitted sources and their staging into a workspace.
//!
//! A compilation request is an ordered list of [`SourceFile`]s held entirely
//! in memory. Staging writes each one under the workspace input directory
//! using its submitted name, so toolchain diagnostics point back at the
//! names the caller knows.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One submitted source file: a name and its full text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> SourceFile {
        SourceFile {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Check that a submitted name stays inside the staging area.
///
/// Accepts plain and nested relative names (`Main.kv`, `util/Text.kv`).
/// Rejects anything empty, absolute, or containing `.`/`..` steps, with a
/// reason suitable for a diagnostic message.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    let path = Path::new(name);
    if path.is_absolute() {
        return Err("name must be relative".to_string());
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err("name must not leave the staging directory".to_string()),
        }
    }
    Ok(())
}

/// Write every file under `input_dir`, preserving request order, and return
/// the staged paths. Names are assumed validated; I/O failures here are
/// pipeline faults, not diagnostics.
pub fn stage_sources(
    files: &[SourceFile],
    input_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        let path = input_dir.join(&file.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PipelineError::Staging {
                name: file.name.clone(),
                source,
            })?;
        }
        fs::write(&path, &file.content).map_err(|source| PipelineError::Staging {
            name: file.name.clone(),
            source,
        })?;
        staged.push(path);
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert_eq!(validate_name("Main.kv"), Ok(()));
        assert_eq!(validate_name("util/Text.kv"), Ok(()));
    }

    #[test]
    fn rejects_escaping_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("/etc/passwd").is_err());
        assert!(validate_name("../escape.kv").is_err());
        assert!(validate_name("a/../../b.kv").is_err());
        assert!(validate_name("./Main.kv").is_err());
    }

    #[test]
    fn stages_files_in_request_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = vec![
            SourceFile::new("Main.kv", "fun main() {}\n"),
            SourceFile::new("util/Text.kv", "fun shout(s: Str): Str = s\n"),
        ];
        let staged = stage_sources(&files, dir.path()).expect("staging succeeds");
        assert_eq!(
            staged,
            vec![
                dir.path().join("Main.kv"),
                dir.path().join("util/Text.kv"),
            ]
        );
        let text = fs::read_to_string(&staged[1]).expect("read staged file");
        assert_eq!(text, "fun shout(s: Str): Str = s\n");
    }
}
