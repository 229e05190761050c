// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language registry for tree-sitter parsers

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tree_sitter::{Language, Parser};

use crate::errors::{CodevecError, Result};

/// Supported languages with their tree-sitter grammars
pub struct LanguageRegistry {
    languages: HashMap<&'static str, Language>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut languages = HashMap::new();

        languages.insert(
            "typescript",
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        );
        languages.insert("tsx", tree_sitter_typescript::LANGUAGE_TSX.into());
        languages.insert("javascript", tree_sitter_javascript::LANGUAGE.into());
        languages.insert("python", tree_sitter_python::LANGUAGE.into());
        languages.insert("rust", tree_sitter_rust::LANGUAGE.into());
        languages.insert("go", tree_sitter_go::LANGUAGE.into());
        languages.insert("c", tree_sitter_c::LANGUAGE.into());
        languages.insert("cpp", tree_sitter_cpp::LANGUAGE.into());
        languages.insert("java", tree_sitter_java::LANGUAGE.into());
        languages.insert("ruby", tree_sitter_ruby::LANGUAGE.into());

        Self { languages }
    }

    /// Get grammar by language name
    pub fn get(&self, name: &str) -> Option<&Language> {
        self.languages.get(name.to_lowercase().as_str())
    }

    pub fn supports(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parser configured for `name`
    pub fn parser(&self, name: &str) -> Result<Parser> {
        let language = self
            .get(name)
            .ok_or_else(|| CodevecError::validation(format!("unsupported language: {}", name)))?;
        let mut parser = Parser::new();
        parser
            .set_language(language)
            .map_err(|e| CodevecError::validation(format!("grammar for {}: {}", name, e)))?;
        Ok(parser)
    }
}

/// Global language registry
pub static LANGUAGES: Lazy<LanguageRegistry> = Lazy::new(LanguageRegistry::new);
