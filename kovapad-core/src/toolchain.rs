//! The external `kovac` batch compiler, wrapped behind a capability trait.
//!
//! The pipeline never knows how compilation happens: it hands a [`Toolchain`]
//! the staged source paths plus one immutable argument list and gets back
//! "the toolchain said yes/no, and here is everything it reported". Expected
//! compile errors are data in that answer; a [`ToolchainFault`] means the
//! invocation itself broke. [`KovacToolchain`] is the subprocess adapter for
//! the compiler's command-line contract, and a toolchain release that
//! changes its output format gets a new adapter rather than pipeline edits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::diagnostics::{has_errors, CompilationOutcome, Diagnostic, Severity};
use crate::error::PipelineError;

/// Separator for library path lists passed to the toolchain.
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: &str = ":";

/// Ordered flag tokens for one toolchain invocation. Built once per stage
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerArguments {
    tokens: Vec<String>,
}

impl CompilerArguments {
    pub fn new(tokens: Vec<String>) -> CompilerArguments {
        CompilerArguments { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Value of a `--flag=value` token, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{flag}=");
        self.tokens
            .iter()
            .find_map(|token| token.strip_prefix(&prefix))
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.tokens.iter().any(|token| token == flag)
    }
}

impl fmt::Display for CompilerArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Raw answer of one toolchain run: whether the toolchain declared success,
/// plus every diagnostic it reported along the way.
#[derive(Debug, Clone)]
pub struct ToolchainRun {
    pub succeeded: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The invocation itself failed. Nothing here is the submitted program's
/// fault; callers translate these into exception descriptors.
#[derive(Debug, Error)]
pub enum ToolchainFault {
    #[error("failed to launch toolchain {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("toolchain was terminated by a signal")]
    Interrupted,
    #[error("toolchain internal failure (exit code {code}): {stderr_tail}")]
    Internal { code: i32, stderr_tail: String },
}

/// Opaque external-compiler capability. One call is one batch compilation
/// over the staged sources; implementations are shared across concurrent
/// attempts and must not keep per-call state.
pub trait Toolchain: Send + Sync {
    fn run(
        &self,
        sources: &[PathBuf],
        arguments: &CompilerArguments,
        input_root: &Path,
    ) -> Result<ToolchainRun, ToolchainFault>;
}

/// Wrap exactly one toolchain run as a [`CompilationOutcome`].
///
/// A run that failed, or that reported error diagnostics despite claiming
/// success, becomes `NotCompiled`; a failure without any reported error gets
/// a synthesized one. Faults propagate unchanged.
pub fn try_compilation(
    toolchain: &dyn Toolchain,
    sources: &[PathBuf],
    arguments: &CompilerArguments,
    input_root: &Path,
) -> Result<CompilationOutcome<()>, PipelineError> {
    debug!(arguments = %arguments, "invoking toolchain");
    let run = toolchain.run(sources, arguments, input_root)?;
    if run.succeeded && !has_errors(&run.diagnostics) {
        Ok(CompilationOutcome::Compiled {
            artifact: (),
            diagnostics: run.diagnostics,
        })
    } else {
        Ok(CompilationOutcome::not_compiled(run.diagnostics, || {
            "toolchain reported failure without diagnostics".to_string()
        }))
    }
}

/// Subprocess adapter for the `kovac` batch compiler.
///
/// Exit code 0 means the toolchain succeeded, 1 means it found compile
/// errors, anything else is an internal fault. Diagnostics are read from
/// stderr, one per line.
pub struct KovacToolchain {
    program: PathBuf,
}

impl KovacToolchain {
    pub fn new(program: impl Into<PathBuf>) -> KovacToolchain {
        KovacToolchain {
            program: program.into(),
        }
    }

    /// Resolve the compiler binary from `$KOVAC`, falling back to `kovac`
    /// on the search path.
    pub fn from_env() -> KovacToolchain {
        let program = std::env::var_os("KOVAC")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("kovac"));
        KovacToolchain { program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Toolchain for KovacToolchain {
    fn run(
        &self,
        sources: &[PathBuf],
        arguments: &CompilerArguments,
        input_root: &Path,
    ) -> Result<ToolchainRun, ToolchainFault> {
        let output = Command::new(&self.program)
            .args(arguments.tokens())
            .args(sources)
            .current_dir(input_root)
            .output()
            .map_err(|source| ToolchainFault::Launch {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = parse_diagnostics(&stderr, input_root);

        match output.status.code() {
            Some(0) => Ok(ToolchainRun {
                succeeded: true,
                diagnostics,
            }),
            Some(1) => Ok(ToolchainRun {
                succeeded: false,
                diagnostics,
            }),
            Some(code) => Err(ToolchainFault::Internal {
                code,
                stderr_tail: stderr_tail(&stderr),
            }),
            None => Err(ToolchainFault::Interrupted),
        }
    }
}

/// Parse the line-oriented stderr stream of the compiler.
///
/// Recognized shapes are `path:line:col: severity: message` and the bare
/// `severity: message`; anything else is launcher noise and is skipped.
/// Absolute paths are rewritten relative to `input_root` so positions refer
/// to submitted names.
pub fn parse_diagnostics(stderr: &str, input_root: &Path) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter_map(|line| parse_diagnostic_line(line, input_root))
        .collect()
}

fn parse_diagnostic_line(line: &str, input_root: &Path) -> Option<Diagnostic> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    if let Some((label, message)) = line.split_once(": ") {
        if let Some(severity) = Severity::from_label(label) {
            return Some(Diagnostic::new(severity, message.trim()));
        }
    }

    let mut parts = line.splitn(4, ':');
    let path = parts.next()?;
    let row = parts.next()?.parse::<u32>().ok()?;
    let column = parts.next()?.parse::<u32>().ok()?;
    let rest = parts.next()?.trim_start();
    let (label, message) = rest.split_once(": ")?;
    let severity = Severity::from_label(label)?;

    let file = Path::new(path)
        .strip_prefix(input_root)
        .unwrap_or_else(|_| Path::new(path));
    Some(Diagnostic::new(severity, message.trim()).at(
        file.to_string_lossy(),
        row,
        column,
    ))
}

fn stderr_tail(stderr: &str) -> String {
    const MAX_TAIL_LINES: usize = 5;
    let mut tail: Vec<&str> = stderr.lines().rev().take(MAX_TAIL_LINES).collect();
    tail.reverse();
    tail.join("\n")
}
