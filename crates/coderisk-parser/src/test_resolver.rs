//! Per-language test-file conventions.
//!
//! One conservative convention set per language; ambiguous layouts are
//! declared in repo configuration rather than guessed. Patterns use
//! `{stem}` for the source file stem and resolve relative to the source
//! file's directory.

use coderisk_core::Language;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct TestFileResolver {
    /// Extra patterns merged over the built-ins, keyed by language name.
    extra: HashMap<String, Vec<String>>,
}

impl Default for TestFileResolver {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl TestFileResolver {
    pub fn new(extra: HashMap<String, Vec<String>>) -> Self {
        Self { extra }
    }

    fn builtin_patterns(language: &Language) -> &'static [&'static str] {
        match language {
            Language::Go => &["{stem}_test.go"],
            Language::Python => &["test_{stem}.py", "{stem}_test.py"],
            Language::JavaScript => &["{stem}.test.js", "{stem}.spec.js"],
            Language::TypeScript => &["{stem}.test.ts", "{stem}.spec.ts"],
            Language::Java => &["{stem}Test.java"],
            Language::Other(_) => &[],
        }
    }

    /// Candidate test files for a source file, in preference order.
    pub fn test_candidates(&self, source_path: &Path, language: &Language) -> Vec<PathBuf> {
        let Some(stem) = source_path.file_stem().and_then(|s| s.to_str()) else {
            return Vec::new();
        };
        let dir = source_path.parent().unwrap_or_else(|| Path::new(""));

        let mut patterns: Vec<String> = Self::builtin_patterns(language)
            .iter()
            .map(|p| p.to_string())
            .collect();
        if let Some(extra) = self.extra.get(&language.to_string()) {
            patterns.extend(extra.iter().cloned());
        }

        patterns
            .iter()
            .map(|p| dir.join(p.replace("{stem}", stem)))
            .collect()
    }

    /// Whether `path` is a test file by naming convention.
    pub fn is_test_file(&self, path: &Path, language: &Language) -> bool {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return false;
        };
        match language {
            Language::Go => name.ends_with("_test.go"),
            Language::Python => {
                (name.starts_with("test_") || name.ends_with("_test.py")) && name.ends_with(".py")
            }
            Language::JavaScript => name.ends_with(".test.js") || name.ends_with(".spec.js"),
            Language::TypeScript => name.ends_with(".test.ts") || name.ends_with(".spec.ts"),
            Language::Java => name.ends_with("Test.java"),
            Language::Other(_) => false,
        }
    }

    /// Reverse mapping: the source file a test file covers, if the name
    /// encodes one.
    pub fn tested_source(&self, test_path: &Path, language: &Language) -> Option<PathBuf> {
        let name = test_path.file_name()?.to_str()?;
        let dir = test_path.parent().unwrap_or_else(|| Path::new(""));
        let source_name = match language {
            Language::Go => name.strip_suffix("_test.go").map(|s| format!("{}.go", s)),
            Language::Python => name
                .strip_prefix("test_")
                .map(|s| s.to_string())
                .or_else(|| {
                    name.strip_suffix("_test.py").map(|s| format!("{}.py", s))
                }),
            Language::JavaScript => name
                .strip_suffix(".test.js")
                .or_else(|| name.strip_suffix(".spec.js"))
                .map(|s| format!("{}.js", s)),
            Language::TypeScript => name
                .strip_suffix(".test.ts")
                .or_else(|| name.strip_suffix(".spec.ts"))
                .map(|s| format!("{}.ts", s)),
            Language::Java => name
                .strip_suffix("Test.java")
                .map(|s| format!("{}.java", s)),
            Language::Other(_) => None,
        }?;
        Some(dir.join(source_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_convention_round_trips() {
        let r = TestFileResolver::default();
        let candidates = r.test_candidates(Path::new("pkg/server.go"), &Language::Go);
        assert_eq!(candidates, vec![PathBuf::from("pkg/server_test.go")]);
        assert_eq!(
            r.tested_source(Path::new("pkg/server_test.go"), &Language::Go),
            Some(PathBuf::from("pkg/server.go"))
        );
        assert!(r.is_test_file(Path::new("pkg/server_test.go"), &Language::Go));
        assert!(!r.is_test_file(Path::new("pkg/server.go"), &Language::Go));
    }

    #[test]
    fn python_accepts_both_conventions() {
        let r = TestFileResolver::default();
        let candidates = r.test_candidates(Path::new("app/views.py"), &Language::Python);
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("app/test_views.py"),
                PathBuf::from("app/views_test.py"),
            ]
        );
        assert_eq!(
            r.tested_source(Path::new("app/test_views.py"), &Language::Python),
            Some(PathBuf::from("app/views.py"))
        );
    }

    #[test]
    fn configured_patterns_are_appended() {
        let mut extra = HashMap::new();
        extra.insert("python".to_string(), vec!["tests/test_{stem}.py".to_string()]);
        let r = TestFileResolver::new(extra);
        let candidates = r.test_candidates(Path::new("app/views.py"), &Language::Python);
        assert!(candidates.contains(&PathBuf::from("app/tests/test_views.py")));
    }
}
