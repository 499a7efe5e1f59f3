//! Per-attempt filesystem scopes.
//!
//! Every compilation attempt runs inside a freshly created scratch scope
//! that is removed on every exit path: normal return, diagnostic failure,
//! and unwinds (removal is backed by [`tempfile::TempDir`]'s drop). Scope
//! names are randomized, so concurrent attempts never observe each other.

use std::path::Path;

use tracing::warn;

use crate::error::PipelineError;

/// Staging scope for one compilation attempt. Sources are written under
/// [`Workspace::input_dir`]; each stage collects its outputs under a
/// subdirectory of [`Workspace::output_dir`]. Both are destroyed when the
/// attempt ends.
#[derive(Debug)]
pub struct Workspace<'a> {
    input_dir: &'a Path,
    output_dir: &'a Path,
}

impl Workspace<'_> {
    pub fn input_dir(&self) -> &Path {
        self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir
    }
}

/// Run `body` inside a fresh scratch directory, removing the directory on
/// all exit paths. Creation failure is a pipeline fault, never a
/// diagnostic. Scopes nest freely.
pub fn with_scratch_dir<R>(
    prefix: &str,
    body: impl FnOnce(&Path) -> Result<R, PipelineError>,
) -> Result<R, PipelineError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(PipelineError::WorkspaceCreate)?;
    let result = body(dir.path());
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => result,
        // The attempt's own error stays primary. A failed removal after a
        // successful body breaks the teardown guarantee and must surface.
        Err(source) => match result {
            Ok(_) => Err(PipelineError::WorkspaceTeardown { path, source }),
            Err(primary) => {
                warn!(path = %path.display(), error = %source, "workspace teardown failed");
                Err(primary)
            }
        },
    }
}

/// Run one attempt inside a fresh [`Workspace`].
pub fn with_workspace<R>(
    body: impl FnOnce(&Workspace<'_>) -> Result<R, PipelineError>,
) -> Result<R, PipelineError> {
    with_scratch_dir("kovapad-src-", |input_dir| {
        with_scratch_dir("kovapad-out-", |output_dir| {
            body(&Workspace {
                input_dir,
                output_dir,
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[test]
    fn removes_scope_after_success() {
        let mut seen = PathBuf::new();
        with_scratch_dir("kovapad-test-", |dir| {
            seen = dir.to_path_buf();
            fs::write(dir.join("scratch.txt"), "x").expect("write inside scope");
            Ok(())
        })
        .expect("body succeeds");
        assert!(!seen.exists());
    }

    #[test]
    fn removes_scope_after_failure_and_keeps_the_error() {
        let mut seen = PathBuf::new();
        let result: Result<(), PipelineError> = with_scratch_dir("kovapad-test-", |dir| {
            seen = dir.to_path_buf();
            Err(PipelineError::UnexpectedCodeShape("boom".to_string()))
        });
        assert!(matches!(result, Err(PipelineError::UnexpectedCodeShape(_))));
        assert!(!seen.exists());
    }

    #[test]
    fn removes_scope_after_panic() {
        let seen = Mutex::new(PathBuf::new());
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), PipelineError> = with_scratch_dir("kovapad-test-", |dir| {
                *seen.lock().expect("lock") = dir.to_path_buf();
                panic!("attempt blew up");
            });
        }));
        assert!(panicked.is_err());
        assert!(!seen.lock().expect("lock").exists());
    }

    #[test]
    fn workspace_has_distinct_input_and_output_scopes() {
        with_workspace(|workspace| {
            assert_ne!(workspace.input_dir(), workspace.output_dir());
            assert!(workspace.input_dir().is_dir());
            assert!(workspace.output_dir().is_dir());
            Ok(())
        })
        .expect("body succeeds");
    }

    #[test]
    fn concurrent_scopes_never_collide() {
        let paths = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    with_workspace(|workspace| {
                        paths
                            .lock()
                            .expect("lock")
                            .push(workspace.input_dir().to_path_buf());
                        Ok(())
                    })
                    .expect("body succeeds");
                });
            }
        });
        let mut paths = paths.into_inner().expect("lock");
        assert_eq!(paths.len(), 8);
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8, "scopes must be unique per attempt");
        assert!(paths.iter().all(|p| !p.exists()));
    }
}
