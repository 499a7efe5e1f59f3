//! Caller-facing boundary of the compile service.
//!
//! [`CompileService`] owns the toolchain capability and the process-wide
//! [`Environment`] and exposes one method per target family. Every method
//! returns a terminal [`ServiceResult`]: compiler findings are data, and an
//! unexpected failure is translated into an [`ExceptionDescriptor`] here, so
//! callers never see a raw pipeline error.

use serde::Serialize;
use tracing::{error, info_span};

use crate::diagnostics::{has_errors, CompilationOutcome, Diagnostic, ExceptionDescriptor};
use crate::environment::Environment;
use crate::error::PipelineError;
use crate::pipeline::{self, ClassFiles, WasmStageOutput};
use crate::source::SourceFile;
use crate::toolchain::Toolchain;

/// Which wasm configuration to compile against: the plain standard library,
/// or the UI framework's libraries plus its compiler plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmTarget {
    Standard,
    Ui,
}

/// JVM bytecode, keyed by relative class-file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JvmArtifact {
    pub class_files: ClassFiles,
}

/// Browser-ready JavaScript with arguments injected and output captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsArtifact {
    pub js_code: String,
}

/// Wasm module plus the JavaScript that loads and starts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WasmArtifact {
    pub loader_js: String,
    pub instantiated_js: String,
    pub wasm: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wat: Option<String>,
}

/// Terminal result of one service call.
///
/// Exactly one of three states: an artifact (possibly with warnings), error
/// diagnostics without an artifact, or an exception descriptor when the
/// service itself failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResult<A> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<A>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionDescriptor>,
}

impl<A> ServiceResult<A> {
    pub fn is_compiled(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }

    fn from_pipeline(result: Result<CompilationOutcome<A>, PipelineError>) -> ServiceResult<A> {
        match result {
            Ok(CompilationOutcome::Compiled {
                artifact,
                diagnostics,
            }) => ServiceResult {
                artifact: Some(artifact),
                diagnostics,
                exception: None,
            },
            Ok(CompilationOutcome::NotCompiled { diagnostics }) => ServiceResult {
                artifact: None,
                diagnostics,
                exception: None,
            },
            Err(failure) => {
                error!(error = %failure, "compilation attempt failed unexpectedly");
                ServiceResult {
                    artifact: None,
                    diagnostics: Vec::new(),
                    exception: Some(ExceptionDescriptor::from_error(&failure)),
                }
            }
        }
    }
}

/// The compile service: a shared toolchain plus the environment it runs in.
/// Methods take `&self` and are safe to call from concurrent requests.
pub struct CompileService<T> {
    toolchain: T,
    environment: Environment,
}

impl<T: Toolchain> CompileService<T> {
    pub fn new(toolchain: T, environment: Environment) -> CompileService<T> {
        CompileService {
            toolchain,
            environment,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Compile for the JVM and return the class files.
    pub fn compile_jvm(&self, files: &[SourceFile]) -> ServiceResult<JvmArtifact> {
        let _span = info_span!("compile_jvm", files = files.len()).entered();
        ServiceResult::from_pipeline(
            pipeline::compile_jvm(&self.toolchain, &self.environment, files)
                .map(|outcome| outcome.map(|class_files| JvmArtifact { class_files })),
        )
    }

    /// Compile to JavaScript, injecting `program_arguments` into the entry
    /// point of the generated module.
    pub fn translate_js(
        &self,
        files: &[SourceFile],
        program_arguments: &[String],
    ) -> ServiceResult<JsArtifact> {
        let _span = info_span!("translate_js", files = files.len()).entered();
        ServiceResult::from_pipeline(
            pipeline::translate_js(&self.toolchain, &self.environment, files, program_arguments)
                .map(|outcome| outcome.map(|js_code| JsArtifact { js_code })),
        )
    }

    /// Compile to wasm. `debug_info` additionally requests the textual
    /// disassembly of the produced module.
    pub fn translate_wasm(
        &self,
        files: &[SourceFile],
        target: WasmTarget,
        debug_info: bool,
    ) -> ServiceResult<WasmArtifact> {
        let _span =
            info_span!("translate_wasm", files = files.len(), ui = matches!(target, WasmTarget::Ui))
                .entered();
        let (libraries, plugins, plugin_options): (&[_], &[_], &[String]) = match target {
            WasmTarget::Standard => (&self.environment.wasm_libraries, &[], &[]),
            WasmTarget::Ui => (
                &self.environment.wasm_ui_libraries,
                &self.environment.wasm_ui_plugins,
                &self.environment.wasm_ui_plugin_options,
            ),
        };
        ServiceResult::from_pipeline(
            pipeline::translate_wasm(
                &self.toolchain,
                libraries,
                plugins,
                plugin_options,
                files,
                debug_info,
            )
            .map(|outcome| {
                outcome.map(|output: WasmStageOutput| WasmArtifact {
                    loader_js: output.loader_js,
                    instantiated_js: output.instantiated_js,
                    wasm: output.wasm,
                    wat: output.wat,
                })
            }),
        )
    }
}
