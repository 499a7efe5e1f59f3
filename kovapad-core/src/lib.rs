//! Core pipeline of the kovapad compile service.
//!
//! kovapad turns in-memory Kova sources into runnable artifacts by driving
//! the external `kovac` batch compiler. The pipeline is roughly:
//!
//!   sources
//!     -> workspace   (staged files in a per-attempt scratch scope)
//!     -> kovac       (JVM: one pass; JS/wasm: klib pass + final pass)
//!     -> read-back   (class files / JS text / wasm module and loaders)
//!     -> postprocess (JS only: argument injection, output capture)
//!
//! Every attempt terminates in one uniform shape: an artifact with
//! warnings, compiler diagnostics, or an exception descriptor for failures
//! that are not the submitted program's fault. Higher-level shells (CLI,
//! web transport, etc.) should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Diagnostics model and error taxonomy
// ---------------------------------------------------------------------

pub mod diagnostics;
pub mod error;

// ---------------------------------------------------------------------
// Compilation inputs: sources, environment, staging scopes
// ---------------------------------------------------------------------

pub mod environment;
pub mod source;
pub mod workspace;

// ---------------------------------------------------------------------
// Toolchain boundary, orchestration and output patching
// ---------------------------------------------------------------------

pub mod pipeline;
pub mod postprocess;
pub mod toolchain;

// ---------------------------------------------------------------------
// Service boundary
// ---------------------------------------------------------------------

pub mod service;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use diagnostics::{
    CompilationOutcome, Diagnostic, ExceptionDescriptor, Severity, SourcePosition,
};
pub use environment::Environment;
pub use error::PipelineError;
pub use service::{
    CompileService, JsArtifact, JvmArtifact, ServiceResult, WasmArtifact, WasmTarget,
};
pub use source::SourceFile;
pub use toolchain::{CompilerArguments, KovacToolchain, Toolchain};
