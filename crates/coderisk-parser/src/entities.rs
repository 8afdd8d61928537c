use coderisk_core::Language;
use serde::{Deserialize, Serialize};

/// Everything extracted from one source file.
///
/// Entity identities carry the absolute path and the start line, matching
/// the graph's identity discipline. A file that failed to parse still
/// yields a `ParsedFile` with `parse_error` set and no in-file entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub absolute_path: String,
    pub language: Language,
    pub source_lines: usize,
    pub functions: Vec<FunctionEntity>,
    pub classes: Vec<ClassEntity>,
    pub imports: Vec<ImportRecord>,
    pub calls: Vec<CallRecord>,
    pub parse_error: Option<String>,
}

impl ParsedFile {
    pub fn empty(absolute_path: impl Into<String>, language: Language) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            language,
            source_lines: 0,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            calls: Vec::new(),
            parse_error: None,
        }
    }

    pub fn failed(
        absolute_path: impl Into<String>,
        language: Language,
        error: impl Into<String>,
    ) -> Self {
        let mut file = Self::empty(absolute_path, language);
        file.parse_error = Some(error.into());
        file
    }

    pub fn entity_count(&self) -> usize {
        self.functions.len() + self.classes.len() + self.imports.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    /// First line of the declaration, trimmed.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntity {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Imported module as written ("os/path", "flask.views", "./util").
    pub module_name: String,
    pub line: u32,
}

/// A call site, by qualified names. Callee resolution against the file's
/// imports is best-effort and happens in the graph builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Enclosing function name, empty at file scope.
    pub caller: String,
    /// Start line of the enclosing function.
    pub caller_line: u32,
    /// Dotted callee name as written at the call site.
    pub callee: String,
    pub line: u32,
}
