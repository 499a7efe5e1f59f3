//! Uniform result model shared by every pipeline stage.
//!
//! A [`Diagnostic`] is one message the compiler reported about the submitted
//! program. A [`CompilationOutcome`] is the single success/failure shape
//! that stages and whole pipelines return. Both are ordinary data; faults of
//! the service itself travel as [`PipelineError`](crate::error::PipelineError)
//! and become an [`ExceptionDescriptor`] at the boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of one compiler message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Parse the lowercase label used in toolchain output.
    pub fn from_label(label: &str) -> Option<Severity> {
        match label {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Position of a message in one of the submitted source files.
///
/// `file` is the name the caller submitted, not the staged path on disk.
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// One compiler-reported message, optionally tied to a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            message: message.into(),
            position: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Warning, message)
    }

    /// Attach a source position.
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32, column: u32) -> Diagnostic {
        self.position = Some(SourcePosition {
            file: file.into(),
            line,
            column,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Returns true if any diagnostic in the slice is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Result of one compilation stage, or of a whole pipeline, generic over the
/// artifact produced on success.
///
/// `NotCompiled` always carries at least one error diagnostic; `Compiled`
/// may still carry warnings. [`CompilationOutcome::not_compiled`] upholds
/// the invariant when the toolchain under-reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationOutcome<T> {
    Compiled {
        artifact: T,
        diagnostics: Vec<Diagnostic>,
    },
    NotCompiled {
        diagnostics: Vec<Diagnostic>,
    },
}

impl<T> CompilationOutcome<T> {
    /// Failure outcome. Synthesizes an error from `fallback` when
    /// `diagnostics` contains none, so callers can always explain a failure.
    pub fn not_compiled(
        mut diagnostics: Vec<Diagnostic>,
        fallback: impl FnOnce() -> String,
    ) -> CompilationOutcome<T> {
        if !has_errors(&diagnostics) {
            diagnostics.push(Diagnostic::error(fallback()));
        }
        CompilationOutcome::NotCompiled { diagnostics }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, CompilationOutcome::Compiled { .. })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompilationOutcome::Compiled { diagnostics, .. } => diagnostics,
            CompilationOutcome::NotCompiled { diagnostics } => diagnostics,
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            CompilationOutcome::Compiled { diagnostics, .. } => diagnostics,
            CompilationOutcome::NotCompiled { diagnostics } => diagnostics,
        }
    }

    /// Transform the artifact, keeping diagnostics untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CompilationOutcome<U> {
        match self {
            CompilationOutcome::Compiled {
                artifact,
                diagnostics,
            } => CompilationOutcome::Compiled {
                artifact: f(artifact),
                diagnostics,
            },
            CompilationOutcome::NotCompiled { diagnostics } => {
                CompilationOutcome::NotCompiled { diagnostics }
            }
        }
    }

    /// Transform the artifact through a fallible step. An `Err` here is an
    /// unexpected failure of the pipeline, never a diagnostic.
    pub fn try_map<U, E>(
        self,
        f: impl FnOnce(T) -> Result<U, E>,
    ) -> Result<CompilationOutcome<U>, E> {
        match self {
            CompilationOutcome::Compiled {
                artifact,
                diagnostics,
            } => Ok(CompilationOutcome::Compiled {
                artifact: f(artifact)?,
                diagnostics,
            }),
            CompilationOutcome::NotCompiled { diagnostics } => {
                Ok(CompilationOutcome::NotCompiled { diagnostics })
            }
        }
    }

    /// Chain the next stage. `NotCompiled` short-circuits with its own
    /// diagnostics and the follow-on stage never runs; on success the next
    /// stage's outcome replaces this one wholesale, since it recompiles the
    /// same sources and re-reports their findings.
    pub fn and_then<U, E>(
        self,
        f: impl FnOnce(T) -> Result<CompilationOutcome<U>, E>,
    ) -> Result<CompilationOutcome<U>, E> {
        match self {
            CompilationOutcome::Compiled { artifact, .. } => f(artifact),
            CompilationOutcome::NotCompiled { diagnostics } => {
                Ok(CompilationOutcome::NotCompiled { diagnostics })
            }
        }
    }
}

/// Boundary description of an unexpected failure.
///
/// Reaching a caller as an `ExceptionDescriptor` means the service broke,
/// not the submitted program. The message is the primary error; `detail`
/// carries the flattened cause chain when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDescriptor {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExceptionDescriptor {
    pub fn new(message: impl Into<String>) -> ExceptionDescriptor {
        ExceptionDescriptor {
            message: message.into(),
            detail: None,
        }
    }

    /// Capture an error together with its source chain.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> ExceptionDescriptor {
        let mut causes = Vec::new();
        let mut cursor = error.source();
        while let Some(cause) = cursor {
            causes.push(cause.to_string());
            cursor = cause.source();
        }
        ExceptionDescriptor {
            message: error.to_string(),
            detail: if causes.is_empty() {
                None
            } else {
                Some(causes.join(": "))
            },
        }
    }
}
