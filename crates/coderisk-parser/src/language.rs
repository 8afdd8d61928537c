//! Maps files to Tree-sitter grammars.
//!
//! Extension matching comes first; files without a recognized extension
//! fall back to shebang sniffing.

use coderisk_core::Language;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Parser;

pub struct LanguageConfig {
    pub language: tree_sitter::Language,
    pub file_extensions: Vec<&'static str>,
}

pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        configs.insert(
            Language::Go,
            LanguageConfig {
                language: tree_sitter_go::LANGUAGE.into(),
                file_extensions: vec!["go"],
            },
        );

        configs.insert(
            Language::Python,
            LanguageConfig {
                language: tree_sitter_python::LANGUAGE.into(),
                file_extensions: vec!["py", "pyi"],
            },
        );

        configs.insert(
            Language::JavaScript,
            LanguageConfig {
                language: tree_sitter_javascript::LANGUAGE.into(),
                file_extensions: vec!["js", "jsx", "mjs", "cjs"],
            },
        );

        configs.insert(
            Language::TypeScript,
            LanguageConfig {
                language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                file_extensions: vec!["ts", "tsx"],
            },
        );

        configs.insert(
            Language::Java,
            LanguageConfig {
                language: tree_sitter_java::LANGUAGE.into(),
                file_extensions: vec!["java"],
            },
        );

        Self { configs }
    }

    pub fn detect_language(&self, file_path: &str) -> Option<Language> {
        let extension = Path::new(file_path).extension()?.to_str()?;
        for (lang, config) in &self.configs {
            if config.file_extensions.contains(&extension) {
                return Some(lang.clone());
            }
        }
        None
    }

    /// Extension match first, shebang sniff second.
    pub fn detect_language_with_content(&self, file_path: &str, content: &str) -> Option<Language> {
        if let Some(lang) = self.detect_language(file_path) {
            return Some(lang);
        }
        let first_line = content.lines().next()?;
        if !first_line.starts_with("#!") {
            return None;
        }
        if first_line.contains("python") {
            Some(Language::Python)
        } else if first_line.contains("node") {
            Some(Language::JavaScript)
        } else {
            None
        }
    }

    pub fn get_config(&self, language: &Language) -> Option<&LanguageConfig> {
        self.configs.get(language)
    }

    pub fn create_parser(&self, language: &Language) -> Option<Parser> {
        let config = self.get_config(language)?;
        let mut parser = Parser::new();
        parser.set_language(&config.language).ok()?;
        Some(parser)
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        self.configs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension() {
        let registry = LanguageRegistry::new();
        assert_eq!(registry.detect_language("src/main.go"), Some(Language::Go));
        assert_eq!(registry.detect_language("app/views.py"), Some(Language::Python));
        assert_eq!(
            registry.detect_language("web/index.tsx"),
            Some(Language::TypeScript)
        );
        assert_eq!(registry.detect_language("README.md"), None);
    }

    #[test]
    fn shebang_fallback_kicks_in() {
        let registry = LanguageRegistry::new();
        let detected = registry
            .detect_language_with_content("scripts/deploy", "#!/usr/bin/env python3\nprint('x')\n");
        assert_eq!(detected, Some(Language::Python));
    }

    #[test]
    fn every_language_builds_a_parser() {
        let registry = LanguageRegistry::new();
        for lang in registry.supported_languages() {
            assert!(registry.create_parser(&lang).is_some(), "no parser for {:?}", lang);
        }
    }
}
