// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code units: the atomic indexed entities (files, functions, classes).
//!
//! This module also holds the index-trigger input shapes accepted at the
//! boundary and their flattening into [`PendingUnit`]s for the indexer.

use serde::{Deserialize, Serialize};

use crate::errors::{CodevecError, Result};

/// Upper bound of the complexity scale.
pub const MAX_COMPLEXITY: u32 = 100;

/// Kind of code unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    File,
    Function,
    Class,
}

impl UnitType {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitType::File => "file",
            UnitType::Function => "function",
            UnitType::Class => "class",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitType {
    type Err = CodevecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(UnitType::File),
            "function" => Ok(UnitType::Function),
            "class" => Ok(UnitType::Class),
            other => Err(CodevecError::validation(format!(
                "unknown unit type '{}', expected file, function or class",
                other
            ))),
        }
    }
}

/// A unit ready to be written: everything but the store-assigned identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCodeUnit {
    pub repository_id: String,
    pub file_path: String,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub unit_type: UnitType,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub complexity: Option<u32>,
    pub language: String,
}

impl NewCodeUnit {
    /// Checks the field-level invariants of a unit.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("repositoryId", &self.repository_id)?;
        require_non_empty("filePath", &self.file_path)?;
        require_non_empty("language", &self.language)?;
        require_non_empty("content", &self.content)?;
        if self.embedding.is_empty() {
            return Err(CodevecError::validation("embedding must be non-empty"));
        }
        if self.embedding.iter().any(|v| !v.is_finite()) {
            return Err(CodevecError::validation(
                "embedding must contain only finite numbers",
            ));
        }

        let has_fn = self.function_name.as_deref().is_some_and(|n| !n.is_empty());
        let has_cls = self.class_name.as_deref().is_some_and(|n| !n.is_empty());
        match self.unit_type {
            UnitType::File if has_fn || has_cls => {
                return Err(CodevecError::validation(
                    "file units carry neither functionName nor className",
                ))
            }
            UnitType::Function if !has_fn || has_cls => {
                return Err(CodevecError::validation(
                    "function units require functionName and no className",
                ))
            }
            UnitType::Class if !has_cls || has_fn => {
                return Err(CodevecError::validation(
                    "class units require className and no functionName",
                ))
            }
            _ => {}
        }

        match (self.start_line, self.end_line) {
            (Some(start), Some(end)) => {
                if start == 0 || end < start {
                    return Err(CodevecError::validation(format!(
                        "invalid line range {}-{}",
                        start, end
                    )));
                }
            }
            (None, None) if self.unit_type == UnitType::File => {}
            _ => {
                return Err(CodevecError::validation(format!(
                    "{} units require startLine and endLine",
                    self.unit_type
                )))
            }
        }

        if let Some(c) = self.complexity {
            if !(1..=MAX_COMPLEXITY).contains(&c) {
                return Err(CodevecError::validation(format!(
                    "complexity {} outside [1, {}]",
                    c, MAX_COMPLEXITY
                )));
            }
        }

        Ok(())
    }
}

/// A stored code unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeUnit {
    pub id: i64,
    pub repository_id: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub unit_type: UnitType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    pub language: String,
    /// Unix timestamp (seconds) assigned at insert
    pub created_at: i64,
}

impl CodeUnit {
    /// Human-readable identity, e.g. `src/lib.rs::parse`.
    pub fn label(&self) -> String {
        unit_label(
            &self.file_path,
            self.function_name.as_deref().or(self.class_name.as_deref()),
        )
    }
}

/// Compound lookup key for `find_one`.
///
/// When `unit_type` is set, absent name fields must also be absent on the
/// stored unit. Without it, absent fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitKey {
    pub repository_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub unit_type: Option<UnitType>,
}

impl UnitKey {
    pub fn repository(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            ..Default::default()
        }
    }

    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn class(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn of_type(mut self, unit_type: UnitType) -> Self {
        self.unit_type = Some(unit_type);
        self
    }

    /// Exact key of an existing unit.
    pub fn for_unit(unit: &CodeUnit) -> Self {
        Self {
            repository_id: unit.repository_id.clone(),
            file_path: Some(unit.file_path.clone()),
            function_name: unit.function_name.clone(),
            class_name: unit.class_name.clone(),
            unit_type: Some(unit.unit_type),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("repositoryId", &self.repository_id)
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repository_id)?;
        if let Some(path) = &self.file_path {
            write!(f, ":{}", path)?;
        }
        if let Some(name) = self.function_name.as_ref().or(self.class_name.as_ref()) {
            write!(f, "::{}", name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Index-trigger input
// ---------------------------------------------------------------------------

/// `{repositoryId, units: [...]}` index trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    pub repository_id: String,
    #[serde(default)]
    pub units: Vec<FileInput>,
}

/// One decomposed source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInput {
    pub path: String,
    pub content: String,
    pub language: String,
    #[serde(default)]
    pub complexity: Option<u32>,
    #[serde(default)]
    pub functions: Vec<SymbolInput>,
    #[serde(default)]
    pub classes: Vec<SymbolInput>,
}

/// A function or class inside a [`FileInput`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInput {
    pub name: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub complexity: Option<u32>,
}

/// A unit awaiting embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUnit {
    pub file_path: String,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub unit_type: UnitType,
    pub content: String,
    pub language: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub complexity: Option<u32>,
}

impl PendingUnit {
    pub fn label(&self) -> String {
        unit_label(
            &self.file_path,
            self.function_name.as_deref().or(self.class_name.as_deref()),
        )
    }

    pub fn into_new_unit(self, repository_id: &str, embedding: Vec<f32>) -> NewCodeUnit {
        NewCodeUnit {
            repository_id: repository_id.to_string(),
            file_path: self.file_path,
            function_name: self.function_name,
            class_name: self.class_name,
            content: self.content,
            embedding,
            unit_type: self.unit_type,
            start_line: self.start_line,
            end_line: self.end_line,
            complexity: self.complexity,
            language: self.language,
        }
    }
}

impl IndexRequest {
    /// Rejects structurally invalid requests.
    ///
    /// Field-level problems of individual units (e.g. complexity out of range)
    /// are left to the store so they surface as per-unit failures.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("repositoryId", &self.repository_id)?;
        for file in &self.units {
            validate_file_path(&file.path)?;
            require_non_empty("language", &file.language)
                .map_err(|e| CodevecError::validation(format!("{}: {}", file.path, e)))?;
            for symbol in file.functions.iter().chain(file.classes.iter()) {
                if symbol.name.trim().is_empty() {
                    return Err(CodevecError::validation(format!(
                        "{}: symbol name must be non-empty",
                        file.path
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flattens files into units: each file first, then its functions, then its classes.
    pub fn into_pending_units(self) -> Vec<PendingUnit> {
        let mut units = Vec::new();
        for file in self.units {
            let language = file.language.trim().to_lowercase();
            units.push(PendingUnit {
                file_path: file.path.clone(),
                function_name: None,
                class_name: None,
                unit_type: UnitType::File,
                content: file.content,
                language: language.clone(),
                start_line: None,
                end_line: None,
                complexity: file.complexity,
            });
            for func in file.functions {
                units.push(PendingUnit {
                    file_path: file.path.clone(),
                    function_name: Some(func.name),
                    class_name: None,
                    unit_type: UnitType::Function,
                    content: func.content,
                    language: language.clone(),
                    start_line: Some(func.start_line),
                    end_line: Some(func.end_line),
                    complexity: func.complexity,
                });
            }
            for cls in file.classes {
                units.push(PendingUnit {
                    file_path: file.path.clone(),
                    function_name: None,
                    class_name: Some(cls.name),
                    unit_type: UnitType::Class,
                    content: cls.content,
                    language: language.clone(),
                    start_line: Some(cls.start_line),
                    end_line: Some(cls.end_line),
                    complexity: cls.complexity,
                });
            }
        }
        units
    }
}

/// Repository-relative path check: no traversal, no absolute paths.
pub fn validate_file_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(CodevecError::validation("file path is required"));
    }
    if path.contains("..") || path.contains("//") || path.starts_with('/') {
        return Err(CodevecError::validation(format!(
            "invalid file path '{}'",
            path
        )));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CodevecError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn unit_label(path: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{}::{}", path, name),
        None => path.to_string(),
    }
}
