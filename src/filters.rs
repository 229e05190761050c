// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering utilities for the store and the repository scanner
//!
//! - [`MetadataFilter`]: equality/exclusion/range constraints on stored unit
//!   fields, compiled into a SQL `WHERE` fragment by the store.
//! - [`SearchFilters`]: the caller-facing `{language, fileType, complexity,
//!   repository}` shape, lowered into a [`MetadataFilter`].
//! - [`CompiledGlob`]: precompiled exclude patterns for directory walks.

use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CodevecError, Result};
use crate::units::{UnitType, MAX_COMPLEXITY};

/// Stored unit field a filter clause can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    RepositoryId,
    FilePath,
    FunctionName,
    ClassName,
    UnitType,
    Language,
    Complexity,
}

impl Field {
    /// Column name in the `code_units` table.
    pub fn column(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::RepositoryId => "repository_id",
            Field::FilePath => "file_path",
            Field::FunctionName => "function_name",
            Field::ClassName => "class_name",
            Field::UnitType => "unit_type",
            Field::Language => "language",
            Field::Complexity => "complexity",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Field::Id | Field::Complexity)
    }

    /// Accepts wire names, including `metadata.*` paths and `_id`.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.strip_prefix("metadata.").unwrap_or(name);
        let field = match name {
            "_id" | "id" => Field::Id,
            "repositoryId" | "repository_id" | "repository" => Field::RepositoryId,
            "filePath" | "file_path" => Field::FilePath,
            "functionName" | "function_name" => Field::FunctionName,
            "className" | "class_name" => Field::ClassName,
            "type" | "unitType" | "unit_type" => Field::UnitType,
            "language" => Field::Language,
            "complexity" => Field::Complexity,
            other => {
                return Err(CodevecError::validation(format!(
                    "unknown filter field '{}'",
                    other
                )))
            }
        };
        Ok(field)
    }
}

/// Scalar operand of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Text(String),
    Integer(i64),
}

impl FilterValue {
    fn to_sql(&self) -> SqlValue {
        match self {
            FilterValue::Null => SqlValue::Null,
            FilterValue::Text(text) => SqlValue::Text(text.clone()),
            FilterValue::Integer(n) => SqlValue::Integer(*n),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<UnitType> for FilterValue {
    fn from(value: UnitType) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

/// Constraint applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(FilterValue),
    Ne(FilterValue),
    In(Vec<FilterValue>),
    NotIn(Vec<FilterValue>),
    Gte(i64),
    Lte(i64),
}

/// A WHERE fragment plus its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Conjunction of field constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    clauses: Vec<(Field, Condition)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(Field, Condition)] {
        &self.clauses
    }

    pub fn eq(self, field: Field, value: impl Into<FilterValue>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    pub fn ne(self, field: Field, value: impl Into<FilterValue>) -> Self {
        self.with(field, Condition::Ne(value.into()))
    }

    pub fn is_in(self, field: Field, values: Vec<FilterValue>) -> Self {
        self.with(field, Condition::In(values))
    }

    pub fn not_in(self, field: Field, values: Vec<FilterValue>) -> Self {
        self.with(field, Condition::NotIn(values))
    }

    pub fn gte(self, field: Field, value: i64) -> Self {
        self.with(field, Condition::Gte(value))
    }

    pub fn lte(self, field: Field, value: i64) -> Self {
        self.with(field, Condition::Lte(value))
    }

    pub fn with(mut self, field: Field, condition: Condition) -> Self {
        self.clauses.push((field, condition));
        self
    }

    /// Appends all clauses of `other`.
    pub fn and(mut self, other: MetadataFilter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    /// Parses a Mongo-style filter document.
    ///
    /// ```text
    /// {"language": "rust", "metadata.type": {"$ne": "file"}, "complexity": {"$gte": 5}}
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            _ => return Err(CodevecError::validation("filter must be a JSON object")),
        };

        let mut filter = Self::default();
        for (key, operand) in object {
            let field = Field::parse(key)?;
            match operand {
                Value::Object(ops) => {
                    for (op, arg) in ops {
                        let condition = match op.as_str() {
                            "$eq" => Condition::Eq(json_scalar(field, arg)?),
                            "$ne" => Condition::Ne(json_scalar(field, arg)?),
                            "$in" => Condition::In(json_array(field, key, arg)?),
                            "$nin" => Condition::NotIn(json_array(field, key, arg)?),
                            "$gte" => Condition::Gte(json_integer(key, arg)?),
                            "$lte" => Condition::Lte(json_integer(key, arg)?),
                            other => {
                                return Err(CodevecError::validation(format!(
                                    "unsupported filter operator '{}'",
                                    other
                                )))
                            }
                        };
                        filter = filter.with(field, condition);
                    }
                }
                scalar => filter = filter.with(field, Condition::Eq(json_scalar(field, scalar)?)),
            }
        }
        filter.validate()?;
        Ok(filter)
    }

    /// Checks operand types against the addressed fields.
    pub fn validate(&self) -> Result<()> {
        for (field, condition) in &self.clauses {
            let values: Vec<&FilterValue> = match condition {
                Condition::Eq(v) | Condition::Ne(v) => vec![v],
                Condition::In(vs) | Condition::NotIn(vs) => vs.iter().collect(),
                Condition::Gte(_) | Condition::Lte(_) => {
                    if !field.is_numeric() {
                        return Err(CodevecError::validation(format!(
                            "range condition on non-numeric field {}",
                            field.column()
                        )));
                    }
                    continue;
                }
            };
            for value in values {
                match (field.is_numeric(), value) {
                    (_, FilterValue::Null) => {}
                    (true, FilterValue::Integer(_)) => {}
                    (false, FilterValue::Text(text)) => {
                        if *field == Field::UnitType {
                            text.parse::<UnitType>()?;
                        }
                    }
                    _ => {
                        return Err(CodevecError::validation(format!(
                            "operand type does not match field {}",
                            field.column()
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Compiles to `AND`-joined SQL. An empty filter yields an empty clause.
    pub fn to_sql(&self) -> SqlClause {
        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut params = Vec::new();

        for (field, condition) in &self.clauses {
            let column = field.column();
            match condition {
                Condition::Eq(FilterValue::Null) => parts.push(format!("{} IS NULL", column)),
                Condition::Ne(FilterValue::Null) => parts.push(format!("{} IS NOT NULL", column)),
                Condition::Eq(value) => {
                    parts.push(format!("{} = ?", column));
                    params.push(value.to_sql());
                }
                Condition::Ne(value) => {
                    parts.push(format!("{} IS NOT ?", column));
                    params.push(value.to_sql());
                }
                Condition::In(values) => {
                    let (has_null, values) = split_nulls(values);
                    let part = match (has_null, values.is_empty()) {
                        (false, true) => "0".to_string(),
                        (true, true) => format!("{} IS NULL", column),
                        (false, false) => format!("{} IN ({})", column, placeholders(values.len())),
                        (true, false) => format!(
                            "({} IS NULL OR {} IN ({}))",
                            column,
                            column,
                            placeholders(values.len())
                        ),
                    };
                    parts.push(part);
                    params.extend(values.into_iter().map(FilterValue::to_sql));
                }
                Condition::NotIn(values) => {
                    // a null operand would make NOT IN match nothing
                    let (has_null, values) = split_nulls(values);
                    let part = match (has_null, values.is_empty()) {
                        (false, true) => continue,
                        (true, true) => format!("{} IS NOT NULL", column),
                        (true, false) => format!(
                            "({} IS NOT NULL AND {} NOT IN ({}))",
                            column,
                            column,
                            placeholders(values.len())
                        ),
                        (false, false) => {
                            format!("{} NOT IN ({})", column, placeholders(values.len()))
                        }
                    };
                    parts.push(part);
                    params.extend(values.into_iter().map(FilterValue::to_sql));
                }
                Condition::Gte(n) => {
                    parts.push(format!("{} >= ?", column));
                    params.push(SqlValue::Integer(*n));
                }
                Condition::Lte(n) => {
                    parts.push(format!("{} <= ?", column));
                    params.push(SqlValue::Integer(*n));
                }
            }
        }

        SqlClause {
            sql: parts.join(" AND "),
            params,
        }
    }
}

fn split_nulls(values: &[FilterValue]) -> (bool, Vec<&FilterValue>) {
    let has_null = values.contains(&FilterValue::Null);
    let rest = values.iter().filter(|v| **v != FilterValue::Null).collect();
    (has_null, rest)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn json_scalar(field: Field, value: &Value) -> Result<FilterValue> {
    match value {
        Value::Null => Ok(FilterValue::Null),
        Value::String(s) if field.is_numeric() => s
            .parse::<i64>()
            .map(FilterValue::Integer)
            .map_err(|_| CodevecError::validation(format!("{} expects an integer", field.column()))),
        Value::String(s) if field == Field::Language => Ok(FilterValue::Text(s.to_lowercase())),
        Value::String(s) => Ok(FilterValue::Text(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(FilterValue::Integer)
            .ok_or_else(|| CodevecError::validation(format!("{} expects an integer", field.column()))),
        _ => Err(CodevecError::validation(format!(
            "unsupported operand for {}",
            field.column()
        ))),
    }
}

fn json_array(field: Field, key: &str, value: &Value) -> Result<Vec<FilterValue>> {
    value
        .as_array()
        .ok_or_else(|| CodevecError::validation(format!("{}: expected an array", key)))?
        .iter()
        .map(|item| json_scalar(field, item))
        .collect()
}

fn json_integer(key: &str, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| CodevecError::validation(format!("{}: range operand must be an integer", key)))
}

/// Named complexity ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityBand {
    Low,
    Medium,
    High,
}

impl ComplexityBand {
    /// Inclusive bounds of the band.
    pub fn range(self) -> (u32, u32) {
        match self {
            ComplexityBand::Low => (1, 5),
            ComplexityBand::Medium => (6, 10),
            ComplexityBand::High => (11, MAX_COMPLEXITY),
        }
    }
}

impl std::str::FromStr for ComplexityBand {
    type Err = CodevecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ComplexityBand::Low),
            "medium" => Ok(ComplexityBand::Medium),
            "high" => Ok(ComplexityBand::High),
            other => Err(CodevecError::validation(format!(
                "unknown complexity '{}', expected low, medium or high",
                other
            ))),
        }
    }
}

/// Caller-facing search filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub language: Option<String>,
    /// Unit type: `file`, `function` or `class`.
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub complexity: Option<ComplexityBand>,
    /// Repository id.
    #[serde(default)]
    pub repository: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.file_type.is_none()
            && self.complexity.is_none()
            && self.repository.is_none()
    }

    pub fn to_metadata_filter(&self) -> Result<MetadataFilter> {
        let mut filter = MetadataFilter::new();
        if let Some(repository) = self.repository.as_deref().filter(|r| !r.is_empty()) {
            filter = filter.eq(Field::RepositoryId, repository);
        }
        if let Some(language) = self.language.as_deref().filter(|l| !l.is_empty()) {
            filter = filter.eq(Field::Language, language.trim().to_lowercase());
        }
        if let Some(file_type) = self.file_type.as_deref().filter(|t| !t.is_empty()) {
            filter = filter.eq(Field::UnitType, file_type.parse::<UnitType>()?);
        }
        if let Some(band) = self.complexity {
            let (low, high) = band.range();
            filter = filter
                .gte(Field::Complexity, i64::from(low))
                .lte(Field::Complexity, i64::from(high));
        }
        Ok(filter)
    }
}

/// A precompiled glob pattern for repeated path matching
#[derive(Debug, Clone)]
pub struct CompiledGlob {
    regex: Regex,
}

impl CompiledGlob {
    /// `**` spans directories, `*` stays within one path segment.
    pub fn new(pattern: &str) -> Option<Self> {
        let regex_pattern = regex::escape(pattern)
            .replace(r"\*\*/", "{{DOUBLESTARSLASH}}")
            .replace(r"/\*\*", "{{SLASHDOUBLESTAR}}")
            .replace(r"\*\*", ".*")
            .replace(r"\*", "[^/]*")
            .replace(r"\?", "[^/]")
            .replace("{{DOUBLESTARSLASH}}", "(.*/)?")
            .replace("{{SLASHDOUBLESTAR}}", "(/.*)?");

        Regex::new(&format!("(?i)^{}$", regex_pattern))
            .ok()
            .map(|regex| Self { regex })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// True when any pattern matches `path`.
pub fn is_excluded(path: &str, patterns: &[CompiledGlob]) -> bool {
    patterns.iter().any(|glob| glob.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_mongo_operators() {
        let filter = MetadataFilter::from_json(&json!({
            "language": "Rust",
            "metadata.type": {"$ne": "file"},
            "metadata.complexity": {"$gte": 5, "$lte": 10},
            "_id": {"$in": [1, 2]}
        }))
        .unwrap();

        assert!(filter
            .clauses()
            .contains(&(Field::Language, Condition::Eq("rust".into()))));
        assert!(filter
            .clauses()
            .contains(&(Field::UnitType, Condition::Ne("file".into()))));
        assert!(filter
            .clauses()
            .contains(&(Field::Complexity, Condition::Gte(5))));
        assert!(filter.clauses().contains(&(
            Field::Id,
            Condition::In(vec![FilterValue::Integer(1), FilterValue::Integer(2)])
        )));
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(MetadataFilter::from_json(&json!(["language"])).is_err());
        assert!(MetadataFilter::from_json(&json!({"owner": "x"})).is_err());
        assert!(MetadataFilter::from_json(&json!({"language": {"$regex": "r.*"}})).is_err());
        assert!(MetadataFilter::from_json(&json!({"language": {"$gte": 3}})).is_err());
        assert!(MetadataFilter::from_json(&json!({"unitType": "module"})).is_err());
        assert!(MetadataFilter::from_json(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_to_sql() {
        let clause = MetadataFilter::new()
            .eq(Field::RepositoryId, "r1")
            .ne(Field::Id, 7i64)
            .eq(Field::FunctionName, FilterValue::Null)
            .is_in(Field::Language, vec!["go".into(), "rust".into()])
            .gte(Field::Complexity, 6)
            .to_sql();

        assert_eq!(
            clause.sql,
            "repository_id = ? AND id IS NOT ? AND function_name IS NULL AND language IN (?, ?) AND complexity >= ?"
        );
        assert_eq!(clause.params.len(), 5);
        assert_eq!(clause.params[1], SqlValue::Integer(7));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let clause = MetadataFilter::new().is_in(Field::Language, vec![]).to_sql();
        assert_eq!(clause.sql, "0");

        let clause = MetadataFilter::new()
            .not_in(Field::Id, vec![])
            .not_in(Field::Id, vec![FilterValue::Integer(3)])
            .to_sql();
        assert_eq!(clause.sql, "id NOT IN (?)");
    }

    #[test]
    fn test_null_operands_in_membership_lists() {
        let filter = MetadataFilter::from_json(&json!({"functionName": {"$nin": [null]}})).unwrap();
        let clause = filter.to_sql();
        assert_eq!(clause.sql, "function_name IS NOT NULL");
        assert!(clause.params.is_empty());

        let filter =
            MetadataFilter::from_json(&json!({"className": {"$nin": [null, "Parser"]}})).unwrap();
        let clause = filter.to_sql();
        assert_eq!(clause.sql, "(class_name IS NOT NULL AND class_name NOT IN (?))");
        assert_eq!(clause.params, vec![SqlValue::Text("Parser".into())]);

        let filter =
            MetadataFilter::from_json(&json!({"functionName": {"$in": [null, "main"]}})).unwrap();
        let clause = filter.to_sql();
        assert_eq!(clause.sql, "(function_name IS NULL OR function_name IN (?))");
        assert_eq!(clause.params.len(), 1);
    }

    #[test]
    fn test_search_filters_lowering() {
        let filters = SearchFilters {
            language: Some("TypeScript".into()),
            file_type: Some("function".into()),
            complexity: Some(ComplexityBand::Medium),
            repository: Some("r1".into()),
        };
        let clause = filters.to_metadata_filter().unwrap().to_sql();
        assert_eq!(
            clause.sql,
            "repository_id = ? AND language = ? AND unit_type = ? AND complexity >= ? AND complexity <= ?"
        );
        assert_eq!(clause.params[1], SqlValue::Text("typescript".into()));
        assert_eq!(clause.params[4], SqlValue::Integer(10));

        let bad = SearchFilters {
            file_type: Some("module".into()),
            ..Default::default()
        };
        assert!(bad.to_metadata_filter().is_err());
    }

    #[test]
    fn test_complexity_bands() {
        assert_eq!(ComplexityBand::Low.range(), (1, 5));
        assert_eq!("HIGH".parse::<ComplexityBand>().unwrap().range(), (11, 100));
        assert!("extreme".parse::<ComplexityBand>().is_err());
    }

    #[test]
    fn test_compiled_glob() {
        let glob = CompiledGlob::new("src/**/*.rs").unwrap();
        assert!(glob.is_match("src/main.rs"));
        assert!(glob.is_match("src/query/search.rs"));
        assert!(!glob.is_match("tests/main.rs"));

        let vendor = CompiledGlob::new("vendor/**").unwrap();
        assert!(vendor.is_match("vendor/lib/a.go"));
        assert!(!vendor.is_match("src/vendor.go"));
        assert!(is_excluded("vendor/x", &[vendor]));
    }
}
