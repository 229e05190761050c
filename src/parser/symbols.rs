// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function and class extraction from AST using tree-sitter node traversal
//!
//! Each extracted unit carries its source text, 1-based line range and a
//! decision-point complexity estimate (1 + branches, clamped to [1, 100]).

use tree_sitter::Node;

use crate::errors::{CodevecError, Result};
use crate::parser::languages::LANGUAGES;
use crate::units::{UnitType, MAX_COMPLEXITY};

/// Extracted function-like or class-like unit
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub unit_type: UnitType,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub complexity: u32,
}

/// Result of parsing one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSymbols {
    pub functions: Vec<ExtractedSymbol>,
    pub classes: Vec<ExtractedSymbol>,
    /// Complexity of the whole file
    pub complexity: u32,
}

/// Symbol extractor using tree-sitter node traversal
#[derive(Debug, Default)]
pub struct SymbolExtractor;

impl SymbolExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract functions and classes from source code
    pub fn extract(&self, source: &str, language: &str) -> Result<FileSymbols> {
        let language = language.to_lowercase();
        let mut parser = LANGUAGES.parser(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| CodevecError::validation("failed to parse source"))?;

        let source_bytes = source.as_bytes();
        let root = tree.root_node();
        let mut symbols = FileSymbols {
            complexity: complexity_of(root, source_bytes),
            ..Default::default()
        };
        self.traverse_node(root, source_bytes, &language, &mut symbols);
        Ok(symbols)
    }

    fn traverse_node(&self, node: Node, source: &[u8], lang: &str, symbols: &mut FileSymbols) {
        if let Some(symbol) = self.extract_symbol_from_node(node, source, lang) {
            match symbol.unit_type {
                UnitType::Class => symbols.classes.push(symbol),
                _ => symbols.functions.push(symbol),
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.traverse_node(child, source, lang, symbols);
        }
    }

    fn extract_symbol_from_node(
        &self,
        node: Node,
        source: &[u8],
        lang: &str,
    ) -> Option<ExtractedSymbol> {
        let kind = node.kind();

        let (unit_type, name_field) = match lang {
            "typescript" | "tsx" | "javascript" => match_typescript_node(kind),
            "python" => match_python_node(kind),
            "rust" => match_rust_node(kind),
            "go" => match_go_node(kind),
            "c" => match_c_node(kind),
            "cpp" => match_cpp_node(kind),
            "java" => match_java_node(kind),
            "ruby" => match_ruby_node(kind),
            _ => return None,
        }?;

        // `struct Foo x;` references a type without defining it
        if matches!(kind, "struct_specifier" | "class_specifier")
            && node.child_by_field_name("body").is_none()
        {
            return None;
        }

        let name = symbol_name(node.child_by_field_name(name_field)?, source)?;
        let content = node.utf8_text(source).ok()?.to_string();

        Some(ExtractedSymbol {
            name,
            unit_type,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            content,
            complexity: complexity_of(node, source),
        })
    }
}

/// Follows C-style declarator chains down to the identifier.
fn symbol_name(mut node: Node, source: &[u8]) -> Option<String> {
    while let Some(inner) = node.child_by_field_name("declarator") {
        node = inner;
    }
    let name = node.utf8_text(source).ok()?.trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn match_typescript_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            Some((UnitType::Function, "name"))
        }
        "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
            Some((UnitType::Class, "name"))
        }
        _ => None,
    }
}

fn match_python_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_definition" => Some((UnitType::Function, "name")),
        "class_definition" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

fn match_rust_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_item" => Some((UnitType::Function, "name")),
        "struct_item" | "enum_item" | "trait_item" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

fn match_go_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_declaration" | "method_declaration" => Some((UnitType::Function, "name")),
        "type_spec" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

fn match_c_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_definition" => Some((UnitType::Function, "declarator")),
        "struct_specifier" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

fn match_cpp_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "function_definition" => Some((UnitType::Function, "declarator")),
        "class_specifier" | "struct_specifier" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

fn match_java_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "method_declaration" | "constructor_declaration" => Some((UnitType::Function, "name")),
        "class_declaration" | "interface_declaration" | "enum_declaration" => {
            Some((UnitType::Class, "name"))
        }
        _ => None,
    }
}

fn match_ruby_node(kind: &str) -> Option<(UnitType, &'static str)> {
    match kind {
        "method" | "singleton_method" => Some((UnitType::Function, "name")),
        "class" | "module" => Some((UnitType::Class, "name")),
        _ => None,
    }
}

/// Node kinds that open an extra execution path.
const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "if_expression",
    "if_let_expression",
    "elif_clause",
    "else_if_clause",
    "for_statement",
    "for_in_statement",
    "enhanced_for_statement",
    "for_expression",
    "while_statement",
    "while_expression",
    "loop_expression",
    "do_statement",
    "switch_case",
    "case_statement",
    "switch_label",
    "expression_case",
    "type_case",
    "communication_case",
    "match_arm",
    "catch_clause",
    "except_clause",
    "conditional_expression",
    "ternary_expression",
    "if",
    "unless",
    "while",
    "until",
    "when",
    "rescue",
    "if_modifier",
    "unless_modifier",
];

const LOGICAL_OPERATORS: &[&str] = &["&&", "||", "and", "or"];

/// `1 + decision points` in the subtree, clamped to [1, 100].
pub fn complexity_of(node: Node, source: &[u8]) -> u32 {
    let mut branches: u32 = 0;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let kind = current.kind();
        if DECISION_KINDS.contains(&kind) {
            branches = branches.saturating_add(1);
        } else if kind == "binary_expression" || kind == "boolean_operator" {
            let is_logical = current
                .child_by_field_name("operator")
                .and_then(|op| op.utf8_text(source).ok())
                .is_some_and(|op| LOGICAL_OPERATORS.contains(&op));
            if is_logical {
                branches = branches.saturating_add(1);
            }
        }

        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
    branches.saturating_add(1).clamp(1, MAX_COMPLEXITY)
}
