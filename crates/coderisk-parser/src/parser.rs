use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use coderisk_core::{CodeRiskError, Language, Result};

use crate::entities::ParsedFile;
use crate::language::LanguageRegistry;
use crate::visitor::EntityVisitor;

const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
];

pub struct ParsingStatistics {
    pub total_files: usize,
    pub parsed_files: usize,
    pub failed_files: usize,
    pub total_lines: usize,
    pub duration: Duration,
}

/// Parses source files into entity records.
///
/// One Tree-sitter parse per file, files fanned out over a bounded worker
/// pool. A file that fails to parse is still reported (with its error
/// marker) so the graph keeps a File node for it; only its in-file entities
/// are dropped.
pub struct SourceParser {
    registry: Arc<LanguageRegistry>,
    max_concurrent_files: usize,
}

impl Default for SourceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceParser {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(LanguageRegistry::new()),
            max_concurrent_files: num_cpus::get(),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_files: usize) -> Self {
        self.max_concurrent_files = max_concurrent_files.max(1);
        self
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Parses every recognized source file under `root`.
    pub async fn parse_directory(&self, root: &Path) -> Result<(Vec<ParsedFile>, ParsingStatistics)> {
        let start = Instant::now();
        let files = {
            let scan_root = root.to_path_buf();
            let registry = self.registry.clone();
            tokio::task::spawn_blocking(move || collect_source_files(&scan_root, &registry))
                .await
                .map_err(|e| CodeRiskError::Parse {
                    file: root.display().to_string(),
                    message: e.to_string(),
                })??
        };
        let total_files = files.len();
        info!(root = %root.display(), total_files, "parsing source tree");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_files));
        let mut parsed = Vec::with_capacity(total_files);
        let mut failed_files = 0usize;
        let mut total_lines = 0usize;

        let mut results = stream::iter(files.into_iter().map(|path| {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let display = path.display().to_string();
                tokio::task::spawn_blocking(move || parse_one(&registry, &path))
                    .await
                    .unwrap_or_else(|e| {
                        ParsedFile::failed(display, Language::Other("unknown".into()), e.to_string())
                    })
            }
        }))
        .buffer_unordered(self.max_concurrent_files);

        while let Some(file) = results.next().await {
            if file.parse_error.is_some() {
                failed_files += 1;
            }
            total_lines += file.source_lines;
            parsed.push(file);
        }
        drop(results);

        let duration = start.elapsed();
        let stats = ParsingStatistics {
            total_files,
            parsed_files: total_files - failed_files,
            failed_files,
            total_lines,
            duration,
        };
        info!(
            parsed = stats.parsed_files,
            failed = stats.failed_files,
            lines = stats.total_lines,
            secs = duration.as_secs_f64(),
            "parsing complete"
        );
        Ok((parsed, stats))
    }

    /// Parses a single file; the path is stored as given (callers pass
    /// absolute canonicalized paths).
    pub fn parse_file(&self, path: &Path) -> ParsedFile {
        parse_one(&self.registry, path)
    }

    /// Parses source text directly, for callers that already hold content.
    pub fn parse_source(&self, absolute_path: &str, language: Language, source: &str) -> ParsedFile {
        parse_source(&self.registry, absolute_path, language, source)
    }
}

fn parse_one(registry: &LanguageRegistry, path: &Path) -> ParsedFile {
    let display = path.display().to_string();
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            return ParsedFile::failed(display, Language::Other("unknown".into()), e.to_string())
        }
    };
    let Some(language) = registry.detect_language_with_content(&display, &source) else {
        return ParsedFile::failed(display, Language::Other("unknown".into()), "unrecognized language");
    };
    parse_source(registry, &display, language, &source)
}

fn parse_source(
    registry: &LanguageRegistry,
    absolute_path: &str,
    language: Language,
    source: &str,
) -> ParsedFile {
    let Some(mut parser) = registry.create_parser(&language) else {
        return ParsedFile::failed(absolute_path, language, "no parser for language");
    };
    match parser.parse(source, None) {
        Some(tree) => {
            let root = tree.root_node();
            if root.has_error() {
                warn!(file = absolute_path, "syntax errors in parse tree, extracting partial entities");
            }
            EntityVisitor::new(language, absolute_path, source).visit(root)
        }
        None => ParsedFile::failed(absolute_path, language, "tree-sitter returned no tree"),
    }
}

fn collect_source_files(root: &Path, registry: &LanguageRegistry) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if !SKIP_DIRS.contains(&name.as_ref()) && !name.starts_with('.') {
                    stack.push(path);
                }
            } else if registry.detect_language(&path.to_string_lossy()).is_some() {
                out.push(path);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_SOURCE: &str = r#"package main

import (
    "fmt"
    "os"
)

type Server struct {
    addr string
}

func NewServer(addr string) *Server {
    return &Server{addr: addr}
}

func (s *Server) Run() error {
    fmt.Println(s.addr)
    return launch(s)
}
"#;

    const PY_SOURCE: &str = r#"import os
from flask import request

class SessionStore:
    def load(self, key):
        return self.backend.get(key)

def new_login(user):
    store = SessionStore()
    return store.load(user.key)
"#;

    #[test]
    fn go_entities_are_extracted() {
        let parser = SourceParser::new();
        let file = parser.parse_source("/r/src/server.go", Language::Go, GO_SOURCE);

        assert!(file.parse_error.is_none());
        let names: Vec<_> = file.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"NewServer"));
        assert!(names.contains(&"Run"));
        assert_eq!(file.classes.len(), 1);
        assert_eq!(file.classes[0].name, "Server");

        let modules: Vec<_> = file.imports.iter().map(|i| i.module_name.as_str()).collect();
        assert!(modules.contains(&"fmt"));
        assert!(modules.contains(&"os"));

        // the call inside Run is attributed to it
        let launch = file.calls.iter().find(|c| c.callee == "launch").unwrap();
        assert_eq!(launch.caller, "Run");
    }

    #[test]
    fn python_entities_are_extracted() {
        let parser = SourceParser::new();
        let file = parser.parse_source("/r/app/session.py", Language::Python, PY_SOURCE);

        assert!(file.parse_error.is_none());
        let names: Vec<_> = file.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"load"));
        assert!(names.contains(&"new_login"));
        assert_eq!(file.classes[0].name, "SessionStore");

        let modules: Vec<_> = file.imports.iter().map(|i| i.module_name.as_str()).collect();
        assert!(modules.contains(&"os"));
        assert!(modules.contains(&"flask"));

        // line identities are 1-based
        assert!(file.functions.iter().all(|f| f.start_line >= 1));
    }

    #[test]
    fn broken_source_keeps_file_record() {
        let parser = SourceParser::new();
        let file = parser.parse_source("/r/bad.py", Language::Python, "def broken(:::\n");
        // tree-sitter produces a tree with errors; the file survives with
        // whatever entities were recoverable
        assert_eq!(file.absolute_path, "/r/bad.py");
    }

    #[tokio::test]
    async fn directory_parse_skips_non_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.go"), GO_SOURCE).unwrap();
        std::fs::write(dir.path().join("README.md"), "# docs\n").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/x.js"), "function f(){}").unwrap();

        let parser = SourceParser::new().with_concurrency(2);
        let (files, stats) = parser.parse_directory(dir.path()).await.unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(files.len(), 1);
        assert!(files[0].absolute_path.ends_with("main.go"));
    }
}
