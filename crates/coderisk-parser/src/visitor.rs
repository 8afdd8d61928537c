//! AST walk that turns a Tree-sitter parse into entity records.

use coderisk_core::Language;
use tree_sitter::{Node, TreeCursor};

use crate::entities::{CallRecord, ClassEntity, FunctionEntity, ImportRecord, ParsedFile};

pub struct EntityVisitor<'a> {
    language: Language,
    source: &'a str,
    out: ParsedFile,
    /// Enclosing functions, innermost last.
    function_stack: Vec<(String, u32)>,
}

impl<'a> EntityVisitor<'a> {
    pub fn new(language: Language, absolute_path: &str, source: &'a str) -> Self {
        let mut out = ParsedFile::empty(absolute_path, language.clone());
        out.source_lines = source.lines().count();
        Self {
            language,
            source,
            out,
            function_stack: Vec::new(),
        }
    }

    pub fn visit(mut self, root: Node) -> ParsedFile {
        let mut cursor = root.walk();
        self.visit_node(&mut cursor);
        self.out
    }

    fn visit_node(&mut self, cursor: &mut TreeCursor) {
        let node = cursor.node();
        let entered_function = self.collect(&node);

        if cursor.goto_first_child() {
            loop {
                self.visit_node(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }

        if entered_function {
            self.function_stack.pop();
        }
    }

    /// Records whatever `node` is; returns true when a function scope was
    /// pushed (the caller pops it after the subtree).
    fn collect(&mut self, node: &Node) -> bool {
        let kind = node.kind();

        if self.is_function_kind(kind) {
            if let Some(name) = self.node_name(node) {
                let start_line = line_of(node);
                self.out.functions.push(FunctionEntity {
                    name: name.clone(),
                    start_line,
                    end_line: node.end_position().row as u32 + 1,
                    signature: self.signature_of(node),
                });
                self.function_stack.push((name, start_line));
                return true;
            }
            return false;
        }

        if self.is_class_kind(kind) {
            if let Some(name) = self.class_name(node) {
                self.out.classes.push(ClassEntity {
                    name,
                    start_line: line_of(node),
                    end_line: node.end_position().row as u32 + 1,
                });
            }
            return false;
        }

        if let Some(module) = self.import_module(node) {
            self.out.imports.push(ImportRecord {
                module_name: module,
                line: line_of(node),
            });
            return false;
        }

        if let Some(callee) = self.callee_name(node) {
            let (caller, caller_line) = self
                .function_stack
                .last()
                .cloned()
                .unwrap_or((String::new(), 0));
            self.out.calls.push(CallRecord {
                caller,
                caller_line,
                callee,
                line: line_of(node),
            });
        }
        false
    }

    fn is_function_kind(&self, kind: &str) -> bool {
        match self.language {
            Language::Go => matches!(kind, "function_declaration" | "method_declaration"),
            Language::Python => kind == "function_definition",
            Language::JavaScript | Language::TypeScript => matches!(
                kind,
                "function_declaration" | "generator_function_declaration" | "method_definition"
            ),
            Language::Java => matches!(kind, "method_declaration" | "constructor_declaration"),
            Language::Other(_) => false,
        }
    }

    fn is_class_kind(&self, kind: &str) -> bool {
        match self.language {
            Language::Go => kind == "type_declaration",
            Language::Python => kind == "class_definition",
            Language::JavaScript | Language::TypeScript => kind == "class_declaration",
            Language::Java => matches!(kind, "class_declaration" | "interface_declaration"),
            Language::Other(_) => false,
        }
    }

    fn import_module(&self, node: &Node) -> Option<String> {
        let text = |n: Node| self.text(&n);
        match (&self.language, node.kind()) {
            (Language::Go, "import_spec") => node
                .child_by_field_name("path")
                .or_else(|| find_child(node, "interpreted_string_literal"))
                .map(|n| strip_quotes(&text(n))),
            (Language::Python, "import_statement") => {
                find_child(node, "dotted_name").map(|n| text(n))
            }
            (Language::Python, "import_from_statement") => node
                .child_by_field_name("module_name")
                .map(|n| text(n)),
            (Language::JavaScript | Language::TypeScript, "import_statement") => node
                .child_by_field_name("source")
                .map(|n| strip_quotes(&text(n))),
            (Language::Java, "import_declaration") => {
                find_child(node, "scoped_identifier").map(|n| text(n))
            }
            _ => None,
        }
    }

    fn callee_name(&self, node: &Node) -> Option<String> {
        let callee = match (&self.language, node.kind()) {
            (Language::Go, "call_expression")
            | (Language::JavaScript | Language::TypeScript, "call_expression") => {
                node.child_by_field_name("function")
            }
            (Language::Python, "call") => node.child_by_field_name("function"),
            (Language::Java, "method_invocation") => {
                // object.method -> keep the dotted form for resolution
                return match node.child_by_field_name("object") {
                    Some(obj) => {
                        let name = node.child_by_field_name("name")?;
                        Some(format!("{}.{}", self.text(&obj), self.text(&name)))
                    }
                    None => node.child_by_field_name("name").map(|n| self.text(&n)),
                };
            }
            _ => None,
        }?;
        let text = self.text(&callee);
        // skip pathological callees (lambdas, long chains with newlines)
        if text.is_empty() || text.contains('\n') || text.len() > 200 {
            return None;
        }
        Some(text)
    }

    fn node_name(&self, node: &Node) -> Option<String> {
        if let Some(name) = node.child_by_field_name("name") {
            return Some(self.text(&name));
        }
        let mut walk = node.walk();
        for child in node.children(&mut walk) {
            if matches!(
                child.kind(),
                "identifier" | "field_identifier" | "type_identifier" | "property_identifier"
            ) {
                return Some(self.text(&child));
            }
        }
        None
    }

    fn class_name(&self, node: &Node) -> Option<String> {
        if self.language == Language::Go {
            // type_declaration wraps one or more type_specs
            let spec = find_child(node, "type_spec")?;
            return spec
                .child_by_field_name("name")
                .map(|n| self.text(&n));
        }
        self.node_name(node)
    }

    fn signature_of(&self, node: &Node) -> String {
        let text = node.utf8_text(self.source.as_bytes()).unwrap_or("");
        let first = text.lines().next().unwrap_or("");
        first.trim_end_matches('{').trim().to_string()
    }

    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.source.as_bytes())
            .unwrap_or("")
            .to_string()
    }
}

fn line_of(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn find_child<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut walk = node.walk();
    let result = node.children(&mut walk).find(|c| c.kind() == kind);
    result
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}
