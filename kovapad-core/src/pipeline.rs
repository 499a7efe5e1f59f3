//! Per-target orchestration of toolchain passes.
//!
//! One attempt stages the submitted sources into a fresh workspace, runs the
//! stage sequence for the requested target, reads the declared artifacts
//! back into memory and lets the workspace tear itself down. JVM needs a
//! single pass; JS and wasm chain a klib emission pass into a final emission
//! pass, sharing [`MODULE_NAME`] so the second pass can locate the first
//! pass's output.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::diagnostics::{CompilationOutcome, Diagnostic};
use crate::environment::Environment;
use crate::error::PipelineError;
use crate::postprocess;
use crate::source::{stage_sources, validate_name, SourceFile};
use crate::toolchain::{try_compilation, CompilerArguments, Toolchain, PATH_LIST_SEPARATOR};
use crate::workspace::with_workspace;

/// Module name shared by both passes of the JS and wasm pipelines. The
/// final pass locates the klib under it and names every artifact after it.
pub const MODULE_NAME: &str = "playground";

/// In-memory JVM bytecode: relative class-file path to class bytes.
pub type ClassFiles = BTreeMap<String, Vec<u8>>;

/// Everything the final wasm pass leaves behind, read back into memory
/// before the workspace is destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmStageOutput {
    /// ES module that compiles and instantiates the wasm binary.
    pub loader_js: String,
    /// ES module that imports the loader and starts the program.
    pub instantiated_js: String,
    pub wasm: Vec<u8>,
    /// Textual disassembly, present only when debug info was requested.
    pub wat: Option<String>,
}

/// Compile for the JVM: one pass, bytecode read back from the class
/// directory.
pub fn compile_jvm(
    toolchain: &dyn Toolchain,
    environment: &Environment,
    files: &[SourceFile],
) -> Result<CompilationOutcome<ClassFiles>, PipelineError> {
    if let Some(rejected) = reject_invalid_request(files) {
        return Ok(rejected);
    }
    debug!(files = files.len(), "starting jvm pipeline");
    with_workspace(|workspace| {
        let staged = stage_sources(files, workspace.input_dir())?;
        let classes_dir = workspace.output_dir().join("classes");
        let arguments = jvm_stage_args(&environment.jvm_classpath, &classes_dir);
        try_compilation(toolchain, &staged, &arguments, workspace.input_dir())?
            .try_map(|()| collect_class_files(&classes_dir))
    })
}

/// Compile to browser-ready JavaScript: klib pass, final JS pass with dead
/// code elimination, then the two textual patches over the emitted module.
pub fn translate_js(
    toolchain: &dyn Toolchain,
    environment: &Environment,
    files: &[SourceFile],
    program_arguments: &[String],
) -> Result<CompilationOutcome<String>, PipelineError> {
    if let Some(rejected) = reject_invalid_request(files) {
        return Ok(rejected);
    }
    debug!(files = files.len(), "starting js pipeline");
    with_workspace(|workspace| {
        let staged = stage_sources(files, workspace.input_dir())?;
        let klib_dir = workspace.output_dir().join("klib");
        let js_dir = workspace.output_dir().join("js");

        let klib_pass = klib_stage_args("js", &environment.js_libraries, &[], &[], &klib_dir);
        let final_pass = js_final_stage_args(&environment.js_libraries, &klib_dir, &js_dir);

        try_compilation(toolchain, &staged, &klib_pass, workspace.input_dir())?
            .and_then(|()| try_compilation(toolchain, &staged, &final_pass, workspace.input_dir()))?
            .try_map(|()| read_text_artifact(&js_dir.join(format!("{MODULE_NAME}.js"))))?
            .map(|code| postprocess::inject_main_arguments(&code, program_arguments, MODULE_NAME))
            .try_map(|code| postprocess::redirect_output(&code, MODULE_NAME))
    })
}

/// Compile to a wasm module plus its JavaScript loaders: klib pass, then the
/// final wasm pass. Library and plugin selection is the caller's, so the
/// plain and UI-framework flavors share this one pipeline.
pub fn translate_wasm(
    toolchain: &dyn Toolchain,
    libraries: &[PathBuf],
    plugins: &[PathBuf],
    plugin_options: &[String],
    files: &[SourceFile],
    debug_info: bool,
) -> Result<CompilationOutcome<WasmStageOutput>, PipelineError> {
    if let Some(rejected) = reject_invalid_request(files) {
        return Ok(rejected);
    }
    debug!(files = files.len(), debug_info, "starting wasm pipeline");
    with_workspace(|workspace| {
        let staged = stage_sources(files, workspace.input_dir())?;
        let klib_dir = workspace.output_dir().join("klib");
        let wasm_dir = workspace.output_dir().join("wasm");

        let klib_pass = klib_stage_args("wasm", libraries, plugins, plugin_options, &klib_dir);
        let final_pass = wasm_final_stage_args(
            libraries,
            plugins,
            plugin_options,
            &klib_dir,
            &wasm_dir,
            debug_info,
        );

        try_compilation(toolchain, &staged, &klib_pass, workspace.input_dir())?
            .and_then(|()| try_compilation(toolchain, &staged, &final_pass, workspace.input_dir()))?
            .try_map(|()| read_wasm_outputs(&wasm_dir, debug_info))
    })
}

/// Requests with no sources or with names that would escape the staging
/// area never reach the toolchain; they fail with a regular diagnostic.
fn reject_invalid_request<T>(files: &[SourceFile]) -> Option<CompilationOutcome<T>> {
    if files.is_empty() {
        return Some(CompilationOutcome::NotCompiled {
            diagnostics: vec![Diagnostic::error("no source files provided")],
        });
    }
    for file in files {
        if let Err(reason) = validate_name(&file.name) {
            return Some(CompilationOutcome::NotCompiled {
                diagnostics: vec![Diagnostic::error(format!(
                    "invalid source file name {:?}: {reason}",
                    file.name
                ))],
            });
        }
    }
    None
}

fn jvm_stage_args(classpath: &[PathBuf], classes_dir: &Path) -> CompilerArguments {
    let mut tokens = vec![
        "--target=jvm".to_string(),
        "--emit=classes".to_string(),
        format!("--out-dir={}", classes_dir.display()),
    ];
    if !classpath.is_empty() {
        tokens.push(format!("--classpath={}", join_paths(classpath)));
    }
    CompilerArguments::new(tokens)
}

fn klib_stage_args(
    target: &str,
    libraries: &[PathBuf],
    plugins: &[PathBuf],
    plugin_options: &[String],
    klib_dir: &Path,
) -> CompilerArguments {
    let mut tokens = vec![
        format!("--target={target}"),
        "--emit=klib".to_string(),
        format!("--module-name={MODULE_NAME}"),
        format!("--out-dir={}", klib_dir.display()),
    ];
    if !libraries.is_empty() {
        tokens.push(format!("--libraries={}", join_paths(libraries)));
    }
    tokens.extend(plugin_args(plugins, plugin_options));
    CompilerArguments::new(tokens)
}

fn js_final_stage_args(
    libraries: &[PathBuf],
    klib_dir: &Path,
    js_dir: &Path,
) -> CompilerArguments {
    let mut tokens = vec![
        "--target=js".to_string(),
        "--emit=js".to_string(),
        "--dce".to_string(),
        format!("--include-klib={}", klib_dir.display()),
        format!("--module-name={MODULE_NAME}"),
        format!("--out-dir={}", js_dir.display()),
    ];
    if !libraries.is_empty() {
        tokens.push(format!("--libraries={}", join_paths(libraries)));
    }
    CompilerArguments::new(tokens)
}

fn wasm_final_stage_args(
    libraries: &[PathBuf],
    plugins: &[PathBuf],
    plugin_options: &[String],
    klib_dir: &Path,
    wasm_dir: &Path,
    debug_info: bool,
) -> CompilerArguments {
    let mut tokens = vec![
        "--target=wasm".to_string(),
        "--emit=wasm".to_string(),
        format!("--include-klib={}", klib_dir.display()),
        format!("--module-name={MODULE_NAME}"),
        format!("--out-dir={}", wasm_dir.display()),
    ];
    if debug_info {
        tokens.push("--wat".to_string());
    }
    if !libraries.is_empty() {
        tokens.push(format!("--libraries={}", join_paths(libraries)));
    }
    tokens.extend(plugin_args(plugins, plugin_options));
    CompilerArguments::new(tokens)
}

/// Plugin options are meaningless without a plugin, so both stay home when
/// the plugin list is empty.
fn plugin_args(plugins: &[PathBuf], options: &[String]) -> Vec<String> {
    if plugins.is_empty() {
        return Vec::new();
    }
    plugins
        .iter()
        .map(|plugin| format!("--plugin={}", plugin.display()))
        .chain(options.iter().map(|option| format!("--plugin-opt={option}")))
        .collect()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(PATH_LIST_SEPARATOR)
}

/// Collect every class file under `classes_dir`, keyed by relative path. A
/// pass that claims success but produced none broke the stage contract.
fn collect_class_files(classes_dir: &Path) -> Result<ClassFiles, PipelineError> {
    let mut classes = ClassFiles::new();
    for entry in WalkDir::new(classes_dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "class") {
            continue;
        }
        let bytes = fs::read(path).map_err(|source| PipelineError::ArtifactRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .strip_prefix(classes_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        classes.insert(name, bytes);
    }
    if classes.is_empty() {
        return Err(PipelineError::MissingArtifact(classes_dir.to_path_buf()));
    }
    Ok(classes)
}

fn read_wasm_outputs(wasm_dir: &Path, debug_info: bool) -> Result<WasmStageOutput, PipelineError> {
    let loader_js =
        read_text_artifact(&wasm_dir.join(format!("{MODULE_NAME}.uninstantiated.mjs")))?;
    let instantiated_js = read_text_artifact(&wasm_dir.join(format!("{MODULE_NAME}.mjs")))?;
    let wasm = read_binary_artifact(&wasm_dir.join(format!("{MODULE_NAME}.wasm")))?;
    let wat = if debug_info {
        Some(read_text_artifact(&wasm_dir.join(format!("{MODULE_NAME}.wat")))?)
    } else {
        None
    };
    Ok(WasmStageOutput {
        loader_js,
        instantiated_js,
        wasm,
        wat,
    })
}

fn read_text_artifact(path: &Path) -> Result<String, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingArtifact(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| PipelineError::ArtifactRead {
        path: path.to_path_buf(),
        source,
    })
}

fn read_binary_artifact(path: &Path) -> Result<Vec<u8>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingArtifact(path.to_path_buf()));
    }
    fs::read(path).map_err(|source| PipelineError::ArtifactRead {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::{ToolchainFault, ToolchainRun};

    /// Any toolchain use in these tests is a bug: they cover the paths that
    /// must settle before an invocation ever happens.
    struct UnreachableToolchain;

    impl Toolchain for UnreachableToolchain {
        fn run(
            &self,
            _sources: &[PathBuf],
            _arguments: &CompilerArguments,
            _input_root: &Path,
        ) -> Result<ToolchainRun, ToolchainFault> {
            panic!("the toolchain must not run for rejected requests");
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn zero_sources_fail_without_invoking_the_toolchain() {
        let outcome = compile_jvm(&UnreachableToolchain, &Environment::default(), &[])
            .expect("rejection is a diagnostic, not an error");
        assert!(!outcome.is_compiled());
        assert_eq!(outcome.diagnostics()[0].message, "no source files provided");
    }

    #[test]
    fn escaping_names_fail_without_invoking_the_toolchain() {
        let files = [SourceFile::new("../escape.kv", "fun main() {}")];
        let outcome = translate_js(&UnreachableToolchain, &Environment::default(), &files, &[])
            .expect("rejection is a diagnostic, not an error");
        assert!(!outcome.is_compiled());
        assert!(outcome.diagnostics()[0].message.contains("../escape.kv"));
    }

    #[test]
    fn jvm_arguments_carry_classpath_and_out_dir() {
        let arguments = jvm_stage_args(
            &paths(&["/libs/kova-stdlib.jar", "/libs/extra.jar"]),
            Path::new("/work/out/classes"),
        );
        assert_eq!(arguments.value_of("--target"), Some("jvm"));
        assert_eq!(arguments.value_of("--emit"), Some("classes"));
        assert_eq!(arguments.value_of("--out-dir"), Some("/work/out/classes"));
        assert_eq!(
            arguments.value_of("--classpath"),
            Some("/libs/kova-stdlib.jar:/libs/extra.jar")
        );
    }

    #[test]
    fn klib_arguments_only_mention_plugins_when_present() {
        let bare = klib_stage_args("wasm", &[], &[], &[], Path::new("/out/klib"));
        assert!(!bare.tokens().iter().any(|t| t.starts_with("--plugin")));
        assert_eq!(bare.value_of("--module-name"), Some(MODULE_NAME));

        let with_plugins = klib_stage_args(
            "wasm",
            &paths(&["/libs/ui.klib"]),
            &paths(&["/plugins/ui.jar"]),
            &["plugin:ui:enabled=true".to_string()],
            Path::new("/out/klib"),
        );
        assert_eq!(with_plugins.value_of("--plugin"), Some("/plugins/ui.jar"));
        assert_eq!(
            with_plugins.value_of("--plugin-opt"),
            Some("plugin:ui:enabled=true")
        );
    }

    #[test]
    fn plugin_options_are_dropped_without_a_plugin() {
        assert!(plugin_args(&[], &["plugin:ui:enabled=true".to_string()]).is_empty());
    }

    #[test]
    fn js_final_arguments_eliminate_dead_code_and_include_the_klib() {
        let arguments =
            js_final_stage_args(&[], Path::new("/out/klib"), Path::new("/out/js"));
        assert!(arguments.has_flag("--dce"));
        assert_eq!(arguments.value_of("--include-klib"), Some("/out/klib"));
        assert_eq!(arguments.value_of("--emit"), Some("js"));
    }

    #[test]
    fn wat_is_requested_only_with_debug_info() {
        let plain = wasm_final_stage_args(
            &[],
            &[],
            &[],
            Path::new("/out/klib"),
            Path::new("/out/wasm"),
            false,
        );
        assert!(!plain.has_flag("--wat"));

        let debug = wasm_final_stage_args(
            &[],
            &[],
            &[],
            Path::new("/out/klib"),
            Path::new("/out/wasm"),
            true,
        );
        assert!(debug.has_flag("--wat"));
    }

    #[test]
    fn class_files_are_collected_by_relative_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("demo");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("MainKt.class"), b"\xca\xfe\xba\xbe").expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let classes = collect_class_files(dir.path()).expect("classes present");
        assert_eq!(classes.len(), 1);
        assert_eq!(
            classes["demo/MainKt.class"],
            b"\xca\xfe\xba\xbe".to_vec()
        );
    }

    #[test]
    fn an_empty_class_directory_is_a_missing_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = collect_class_files(dir.path());
        assert!(matches!(result, Err(PipelineError::MissingArtifact(_))));
    }

    #[test]
    fn missing_text_artifacts_are_reported_by_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wanted = dir.path().join("playground.js");
        let result = read_text_artifact(&wanted);
        assert!(matches!(
            result,
            Err(PipelineError::MissingArtifact(path)) if path == wanted
        ));
    }
}
