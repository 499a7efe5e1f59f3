//! Process-wide compilation environment.
//!
//! Resolved once at startup and shared read-only by every attempt: the
//! library search paths per target plus the compiler plugins applied to the
//! UI-framework wasm target. The pipeline never goes looking for these on
//! its own; the embedding layer hands them in, typically via
//! [`Environment::discover`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

/// Immutable per-target library and plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Jars put on the classpath of JVM compilations.
    pub jvm_classpath: Vec<PathBuf>,
    /// Klibs linked into JS compilations.
    pub js_libraries: Vec<PathBuf>,
    /// Klibs linked into plain wasm compilations.
    pub wasm_libraries: Vec<PathBuf>,
    /// Klibs linked into UI-framework wasm compilations.
    pub wasm_ui_libraries: Vec<PathBuf>,
    /// Compiler plugin jars applied to UI-framework wasm compilations.
    pub wasm_ui_plugins: Vec<PathBuf>,
    /// `key=value` options forwarded to those plugins.
    pub wasm_ui_plugin_options: Vec<String>,
}

impl Environment {
    /// Scan the conventional libraries layout:
    ///
    /// ```text
    /// <root>/jvm/*.jar        jvm_classpath
    /// <root>/js/*.klib        js_libraries
    /// <root>/wasm/*.klib      wasm_libraries
    /// <root>/wasm-ui/*.klib   wasm_ui_libraries
    /// <root>/plugins/*.jar    wasm_ui_plugins
    /// ```
    ///
    /// Missing subdirectories yield empty lists. Paths are sorted so
    /// argument lists stay deterministic across attempts.
    pub fn discover(root: impl AsRef<Path>) -> Environment {
        let root = root.as_ref();
        Environment {
            jvm_classpath: collect_libraries(&root.join("jvm"), "jar"),
            js_libraries: collect_libraries(&root.join("js"), "klib"),
            wasm_libraries: collect_libraries(&root.join("wasm"), "klib"),
            wasm_ui_libraries: collect_libraries(&root.join("wasm-ui"), "klib"),
            wasm_ui_plugins: collect_libraries(&root.join("plugins"), "jar"),
            wasm_ui_plugin_options: Vec::new(),
        }
    }
}

fn collect_libraries(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.path().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|found| found == extension)
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}
