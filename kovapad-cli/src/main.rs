use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use kovapad_core::pipeline::MODULE_NAME;
use kovapad_core::{
    CompileService, Environment, JsArtifact, JvmArtifact, KovacToolchain, ServiceResult,
    SourceFile, WasmArtifact, WasmTarget,
};
use serde::Serialize;

/// Compile Kova sources for one target and write the artifacts to disk.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source files to compile (*.kv).
    #[arg(required = true, value_name = "SOURCES")]
    sources: Vec<PathBuf>,

    #[arg(
        short,
        long,
        default_value = "jvm",
        help = "Target: jvm, js, wasm, wasm-ui"
    )]
    target: String,

    #[arg(
        short,
        long,
        default_value = "out",
        help = "Directory the produced artifacts are written to"
    )]
    output: PathBuf,

    #[arg(
        long = "arg",
        value_name = "VALUE",
        help = "Program argument injected into the generated entry point (repeatable, js only)"
    )]
    program_args: Vec<String>,

    #[arg(long, help = "Also emit the textual wasm disassembly (wasm targets)")]
    debug_info: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the kovac compiler (defaults to $KOVAC, then `kovac` on PATH)"
    )]
    kovac: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Libraries root scanned for per-target dependencies and plugins"
    )]
    libraries: Option<PathBuf>,

    #[arg(long, help = "Print the full result as JSON instead of writing artifacts")]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let environment = match &cli.libraries {
        Some(root) => Environment::discover(root),
        None => Environment::default(),
    };
    let toolchain = match &cli.kovac {
        Some(program) => KovacToolchain::new(program),
        None => KovacToolchain::from_env(),
    };
    let service = CompileService::new(toolchain, environment);
    let files = read_sources(&cli.sources)?;

    match cli.target.as_str() {
        "jvm" => report(&cli, service.compile_jvm(&files), write_jvm_artifact),
        "js" => report(
            &cli,
            service.translate_js(&files, &cli.program_args),
            write_js_artifact,
        ),
        "wasm" => report(
            &cli,
            service.translate_wasm(&files, WasmTarget::Standard, cli.debug_info),
            write_wasm_artifact,
        ),
        "wasm-ui" => report(
            &cli,
            service.translate_wasm(&files, WasmTarget::Ui, cli.debug_info),
            write_wasm_artifact,
        ),
        other => bail!("unsupported target: {other}"),
    }
}

fn read_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read source file {}", path.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("source path {} has no file name", path.display()))?;
            Ok(SourceFile::new(name.to_string_lossy(), content))
        })
        .collect()
}

/// Print diagnostics, then either write the artifact or fail: an exception
/// descriptor means the service broke, error diagnostics mean the program
/// did not compile.
fn report<A: Serialize>(
    cli: &Cli,
    result: ServiceResult<A>,
    write_artifact: fn(&Path, &A) -> Result<()>,
) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    }
    for diagnostic in &result.diagnostics {
        match &diagnostic.position {
            Some(position) => eprintln!(
                "{}: {}:{}:{}: {}",
                diagnostic.severity, position.file, position.line, position.column,
                diagnostic.message
            ),
            None => eprintln!("{}: {}", diagnostic.severity, diagnostic.message),
        }
    }
    if let Some(exception) = &result.exception {
        bail!("compilation service failed: {}", exception.message);
    }
    match &result.artifact {
        Some(artifact) => {
            if !cli.json {
                write_artifact(&cli.output, artifact)?;
            }
            Ok(())
        }
        None => bail!("compilation failed"),
    }
}

fn write_jvm_artifact(output: &Path, artifact: &JvmArtifact) -> Result<()> {
    for (name, bytes) in &artifact.class_files {
        write_output(&output.join("classes").join(name), bytes)?;
    }
    Ok(())
}

fn write_js_artifact(output: &Path, artifact: &JsArtifact) -> Result<()> {
    write_output(
        &output.join(format!("{MODULE_NAME}.js")),
        artifact.js_code.as_bytes(),
    )
}

fn write_wasm_artifact(output: &Path, artifact: &WasmArtifact) -> Result<()> {
    write_output(
        &output.join(format!("{MODULE_NAME}.uninstantiated.mjs")),
        artifact.loader_js.as_bytes(),
    )?;
    write_output(
        &output.join(format!("{MODULE_NAME}.mjs")),
        artifact.instantiated_js.as_bytes(),
    )?;
    write_output(&output.join(format!("{MODULE_NAME}.wasm")), &artifact.wasm)?;
    if let Some(wat) = &artifact.wat {
        write_output(&output.join(format!("{MODULE_NAME}.wat")), wat.as_bytes())?;
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
