use std::path::PathBuf;

use thiserror::Error;

use crate::toolchain::ToolchainFault;

/// Unexpected failures of the pipeline itself.
///
/// Values of this type are never caused by the submitted program: compiler
/// findings travel as [`Diagnostic`](crate::diagnostics::Diagnostic) lists
/// inside a [`CompilationOutcome`](crate::diagnostics::CompilationOutcome)
/// instead. The service boundary translates a `PipelineError` into an
/// [`ExceptionDescriptor`](crate::diagnostics::ExceptionDescriptor) before
/// it reaches a caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to create a workspace scope: {0}")]
    WorkspaceCreate(std::io::Error),
    #[error("failed to remove workspace scope {}: {source}", .path.display())]
    WorkspaceTeardown {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to stage source file {name}: {source}")]
    Staging {
        name: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Toolchain(#[from] ToolchainFault),
    #[error("expected output {} is missing after a successful stage", .0.display())]
    MissingArtifact(PathBuf),
    #[error("failed to read artifact {}: {source}", .path.display())]
    ArtifactRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("generated code does not match the expected shape: {0}")]
    UnexpectedCodeShape(String),
}
