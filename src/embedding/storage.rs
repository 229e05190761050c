// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store for code units.
//!
//! [`EmbeddingStore`] is the capability the indexer and the search router
//! drive: insert, compound-key lookup, nearest-neighbor query with metadata
//! filter / exclusions / threshold, keyword match and per-type statistics.
//! [`SqliteStore`] implements it on SQLite with brute-force cosine scoring.
//!
//! The store's vector dimension is fixed by the first insert and persisted.

use async_trait::async_trait;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::errors::{CodevecError, Result};
use crate::filters::{Condition, Field, FilterValue, MetadataFilter};
use crate::units::{CodeUnit, NewCodeUnit, UnitKey, UnitType};

/// Directory holding the database, relative to the repository root.
pub const INDEX_DIR: &str = ".codevec";

/// Database file name inside [`INDEX_DIR`].
pub const DB_FILE: &str = "embeddings.sqlite";

/// Lower bound of the candidate pool for neighbor queries.
pub const MIN_CANDIDATES: usize = 100;

/// A unit with its similarity (or match) score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredUnit {
    pub unit: CodeUnit,
    pub score: f32,
}

/// Nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
    pub vector: Vec<f32>,
    /// Maximum number of results returned.
    pub limit: usize,
    /// Candidate pool considered before thresholding.
    pub num_candidates: usize,
    /// Results scoring below this are dropped.
    pub threshold: f32,
    pub filter: MetadataFilter,
    pub exclude_ids: Vec<i64>,
}

impl NeighborQuery {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            num_candidates: candidate_pool(limit),
            threshold: 0.0,
            filter: MetadataFilter::default(),
            exclude_ids: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn excluding(mut self, id: i64) -> Self {
        self.exclude_ids.push(id);
        self
    }
}

/// `max(limit * 10, 100)`
pub fn candidate_pool(limit: usize) -> usize {
    limit.saturating_mul(10).max(MIN_CANDIDATES)
}

/// Keyword query over names, paths and content.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactQuery {
    pub text: String,
    pub limit: usize,
    pub filter: MetadataFilter,
}

/// Per-type aggregate of one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTypeStats {
    pub unit_type: UnitType,
    pub count: u64,
    pub avg_complexity: Option<f64>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    pub repository_id: String,
    pub total_embeddings: u64,
    pub breakdown: Vec<UnitTypeStats>,
}

/// Persistence and query capability over code units.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Stores a unit and returns it with its assigned identity.
    ///
    /// Fails with [`CodevecError::DimensionMismatch`] when the vector size
    /// differs from the store's dimension.
    async fn insert(&self, unit: NewCodeUnit) -> Result<CodeUnit>;

    /// Point lookup by compound key.
    async fn find_one(&self, key: &UnitKey) -> Result<Option<CodeUnit>>;

    /// Results ordered by descending score, all `>= query.threshold`.
    async fn nearest_neighbors(&self, query: &NeighborQuery) -> Result<Vec<ScoredUnit>>;

    /// Keyword match, ordered by match tier.
    async fn exact_match(&self, query: &ExactQuery) -> Result<Vec<ScoredUnit>>;

    async fn aggregate_stats(&self, repository_id: &str) -> Result<EmbeddingStats>;

    /// Removes every unit of a repository. Returns the number removed.
    async fn delete_repository(&self, repository_id: &str) -> Result<usize>;
}

const UNIT_COLUMNS: &str = "id, repository_id, file_path, function_name, class_name, unit_type, \
     content, language, start_line, end_line, complexity, embedding, created_at";

struct Inner {
    conn: Connection,
    dimension: Option<usize>,
}

/// SQLite-backed [`EmbeddingStore`].
///
/// Stores units in `.codevec/embeddings.sqlite` by default. Cloning shares
/// the connection.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Inner>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CodevecError::Store(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            CodevecError::Store(format!("failed to open database {}: {}", path.display(), e))
        })?;
        let store = Self::from_connection(conn, Some(path))?;
        debug!(path = ?store.path, dimension = ?store.dimension(), "opened store");
        Ok(store)
    }

    /// Opens the store in the default location for a repository.
    pub fn open_default<P: AsRef<Path>>(repo_root: P) -> Result<Self> {
        Self::open(default_db_path(repo_root))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        init_schema(&conn)?;
        let dimension = get_meta(&conn, "dimension")?
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| CodevecError::Store(format!("corrupt dimension meta '{}'", raw)))
            })
            .transpose()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { conn, dimension })),
            path,
        })
    }

    /// Returns the database path, if on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Vector dimension fixed by the first insert.
    pub fn dimension(&self) -> Option<usize> {
        self.lock().ok().and_then(|inner| inner.dimension)
    }

    /// Counts stored units, optionally for one repository.
    pub async fn count(&self, repository_id: Option<&str>) -> Result<u64> {
        let repository_id = repository_id.map(str::to_string);
        self.run(move |inner| {
            let count: i64 = match repository_id {
                Some(repo) => inner.conn.query_row(
                    "SELECT COUNT(*) FROM code_units WHERE repository_id = ?1",
                    params![repo],
                    |row| row.get(0),
                )?,
                None => inner
                    .conn
                    .query_row("SELECT COUNT(*) FROM code_units", [], |row| row.get(0))?,
            };
            Ok(count as u64)
        })
        .await
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CodevecError::Store("store lock poisoned".to_string()))
    }

    /// Runs blocking SQLite work off the async executor.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Inner) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| CodevecError::Store("store lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CodevecError::Store(format!("store task failed: {}", e)))?
    }
}

/// `<root>/.codevec/embeddings.sqlite`
pub fn default_db_path<P: AsRef<Path>>(repo_root: P) -> PathBuf {
    repo_root.as_ref().join(INDEX_DIR).join(DB_FILE)
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn insert(&self, unit: NewCodeUnit) -> Result<CodeUnit> {
        unit.validate()?;
        self.run(move |inner| inner.insert(unit)).await
    }

    async fn find_one(&self, key: &UnitKey) -> Result<Option<CodeUnit>> {
        key.validate()?;
        let key = key.clone();
        self.run(move |inner| inner.find_one(&key)).await
    }

    async fn nearest_neighbors(&self, query: &NeighborQuery) -> Result<Vec<ScoredUnit>> {
        if query.vector.is_empty() {
            return Err(CodevecError::validation("query vector must be non-empty"));
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        query.filter.validate()?;
        let query = query.clone();
        self.run(move |inner| inner.nearest_neighbors(&query)).await
    }

    async fn exact_match(&self, query: &ExactQuery) -> Result<Vec<ScoredUnit>> {
        if query.text.trim().is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        query.filter.validate()?;
        let query = query.clone();
        self.run(move |inner| inner.exact_match(&query)).await
    }

    async fn aggregate_stats(&self, repository_id: &str) -> Result<EmbeddingStats> {
        let repository_id = repository_id.to_string();
        self.run(move |inner| inner.aggregate_stats(&repository_id)).await
    }

    async fn delete_repository(&self, repository_id: &str) -> Result<usize> {
        let repository_id = repository_id.to_string();
        self.run(move |inner| {
            let removed = inner.conn.execute(
                "DELETE FROM code_units WHERE repository_id = ?1",
                params![repository_id],
            )?;
            info!(repository_id = %repository_id, removed, "deleted repository units");
            Ok(removed)
        })
        .await
    }
}

impl Inner {
    fn insert(&mut self, unit: NewCodeUnit) -> Result<CodeUnit> {
        let actual = unit.embedding.len();
        if let Some(expected) = self.dimension {
            if expected != actual {
                return Err(CodevecError::DimensionMismatch { expected, actual });
            }
        }

        let created_at = unix_now();
        let content_hash = blake3::hash(unit.content.as_bytes()).to_hex().to_string();
        let tx = self.conn.transaction()?;
        if self.dimension.is_none() {
            set_meta(&tx, "dimension", &actual.to_string())?;
        }
        tx.execute(
            r#"
            INSERT INTO code_units (
                repository_id, file_path, function_name, class_name, unit_type, content,
                content_hash, language, start_line, end_line, complexity, embedding,
                dimension, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                unit.repository_id,
                unit.file_path,
                unit.function_name,
                unit.class_name,
                unit.unit_type.as_str(),
                unit.content,
                content_hash,
                unit.language,
                unit.start_line,
                unit.end_line,
                unit.complexity,
                embedding_to_blob(&unit.embedding),
                actual as i64,
                created_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        if self.dimension.is_none() {
            info!(dimension = actual, "store dimension fixed by first insert");
            self.dimension = Some(actual);
        }

        Ok(CodeUnit {
            id,
            repository_id: unit.repository_id,
            file_path: unit.file_path,
            function_name: unit.function_name,
            class_name: unit.class_name,
            content: unit.content,
            embedding: unit.embedding,
            unit_type: unit.unit_type,
            start_line: unit.start_line,
            end_line: unit.end_line,
            complexity: unit.complexity,
            language: unit.language,
            created_at,
        })
    }

    fn find_one(&self, key: &UnitKey) -> Result<Option<CodeUnit>> {
        let clause = key_filter(key).to_sql();
        let sql = format!(
            "SELECT {} FROM code_units WHERE {} \
             ORDER BY CASE unit_type WHEN 'file' THEN 0 WHEN 'class' THEN 1 ELSE 2 END, id \
             LIMIT 1",
            UNIT_COLUMNS, clause.sql
        );
        let unit = self
            .conn
            .query_row(&sql, params_from_iter(clause.params.iter()), unit_from_row)
            .optional()?;
        Ok(unit)
    }

    fn nearest_neighbors(&self, query: &NeighborQuery) -> Result<Vec<ScoredUnit>> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.vector.len() != expected {
            return Err(CodevecError::DimensionMismatch {
                expected,
                actual: query.vector.len(),
            });
        }

        let mut filter = query.filter.clone();
        if !query.exclude_ids.is_empty() {
            let ids = query
                .exclude_ids
                .iter()
                .map(|id| FilterValue::Integer(*id))
                .collect();
            filter = filter.with(Field::Id, Condition::NotIn(ids));
        }
        let clause = filter.to_sql();

        let sql = if clause.sql.is_empty() {
            format!("SELECT {} FROM code_units", UNIT_COLUMNS)
        } else {
            format!("SELECT {} FROM code_units WHERE {}", UNIT_COLUMNS, clause.sql)
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let mut candidates: Vec<ScoredUnit> = stmt
            .query_map(params_from_iter(clause.params.iter()), unit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|unit| {
                let score = similarity_score(&query.vector, &unit.embedding);
                ScoredUnit { unit, score }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.unit.id.cmp(&b.unit.id))
        });
        candidates.truncate(query.num_candidates.max(query.limit));
        candidates.retain(|hit| hit.score >= query.threshold);
        candidates.truncate(query.limit);

        debug!(
            results = candidates.len(),
            limit = query.limit,
            threshold = query.threshold,
            "nearest neighbors"
        );
        Ok(candidates)
    }

    fn exact_match(&self, query: &ExactQuery) -> Result<Vec<ScoredUnit>> {
        let text = query.text.trim();
        let pattern = format!("%{}%", escape_like(text));
        let clause = query.filter.to_sql();

        let mut params: Vec<SqlValue> = vec![
            SqlValue::Text(text.to_string()),
            SqlValue::Text(text.to_string()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern.clone()),
            SqlValue::Text(pattern),
        ];
        params.extend(clause.params);
        params.push(SqlValue::Integer(query.limit as i64));

        let filter_sql = if clause.sql.is_empty() {
            String::new()
        } else {
            format!(" AND ({})", clause.sql)
        };
        let sql = format!(
            r#"
            SELECT {columns},
                CASE
                    WHEN lower(function_name) = lower(?) OR lower(class_name) = lower(?) THEN 1.0
                    WHEN function_name LIKE ? ESCAPE '\' OR class_name LIKE ? ESCAPE '\' THEN 0.9
                    WHEN file_path LIKE ? ESCAPE '\' THEN 0.8
                    ELSE 0.6
                END AS score
            FROM code_units
            WHERE (function_name LIKE ? ESCAPE '\'
                OR class_name LIKE ? ESCAPE '\'
                OR file_path LIKE ? ESCAPE '\'
                OR content LIKE ? ESCAPE '\'){filter}
            ORDER BY score DESC, file_path ASC, COALESCE(start_line, 0) ASC, id ASC
            LIMIT ?
            "#,
            columns = UNIT_COLUMNS,
            filter = filter_sql
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let unit = unit_from_row(row)?;
                let score: f64 = row.get(13)?;
                Ok(ScoredUnit {
                    unit,
                    score: score as f32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    fn aggregate_stats(&self, repository_id: &str) -> Result<EmbeddingStats> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT unit_type, COUNT(*), AVG(complexity), GROUP_CONCAT(DISTINCT language)
            FROM code_units
            WHERE repository_id = ?1
            GROUP BY unit_type
            ORDER BY COUNT(*) DESC, unit_type ASC
            "#,
        )?;

        let breakdown = stmt
            .query_map(params![repository_id], |row| {
                let unit_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let avg_complexity: Option<f64> = row.get(2)?;
                let languages: Option<String> = row.get(3)?;
                Ok((unit_type, count, avg_complexity, languages))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(unit_type, count, avg_complexity, languages)| {
                let mut languages: Vec<String> = languages
                    .unwrap_or_default()
                    .split(',')
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                languages.sort();
                Ok(UnitTypeStats {
                    unit_type: unit_type.parse()?,
                    count: count as u64,
                    avg_complexity,
                    languages,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EmbeddingStats {
            repository_id: repository_id.to_string(),
            total_embeddings: breakdown.iter().map(|b| b.count).sum(),
            breakdown,
        })
    }
}

/// Compiles a [`UnitKey`] into a filter.
fn key_filter(key: &UnitKey) -> MetadataFilter {
    let mut filter = MetadataFilter::new().eq(Field::RepositoryId, key.repository_id.as_str());
    if let Some(path) = &key.file_path {
        filter = filter.eq(Field::FilePath, path.as_str());
    }
    let exact = key.unit_type.is_some();
    for (field, value) in [
        (Field::FunctionName, &key.function_name),
        (Field::ClassName, &key.class_name),
    ] {
        match value {
            Some(name) => filter = filter.eq(field, name.as_str()),
            None if exact => filter = filter.eq(field, FilterValue::Null),
            None => {}
        }
    }
    if let Some(unit_type) = key.unit_type {
        filter = filter.eq(Field::UnitType, unit_type);
    }
    filter
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS code_units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            function_name TEXT,
            class_name TEXT,
            unit_type TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            language TEXT NOT NULL,
            start_line INTEGER,
            end_line INTEGER,
            complexity INTEGER,
            embedding BLOB NOT NULL,
            dimension INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_code_units_key
            ON code_units(repository_id, file_path, function_name, class_name);
        CREATE INDEX IF NOT EXISTS idx_code_units_type
            ON code_units(repository_id, unit_type);
        CREATE INDEX IF NOT EXISTS idx_code_units_language
            ON code_units(language);
        "#,
    )?;
    if get_meta(conn, "schema_version")?.is_none() {
        set_meta(conn, "schema_version", "1")?;
    }
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meta (key, value)
        VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![key, value],
    )?;
    Ok(())
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<CodeUnit> {
    let unit_type: String = row.get(5)?;
    let unit_type = unit_type
        .parse::<UnitType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let embedding_blob: Vec<u8> = row.get(11)?;
    Ok(CodeUnit {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        file_path: row.get(2)?,
        function_name: row.get(3)?,
        class_name: row.get(4)?,
        unit_type,
        content: row.get(6)?,
        language: row.get(7)?,
        start_line: row.get(8)?,
        end_line: row.get(9)?,
        complexity: row.get(10)?,
        embedding: blob_to_embedding(&embedding_blob),
        created_at: row.get(12)?,
    })
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Computes cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Cosine mapped onto [0, 1]: `(1 + cos) / 2`.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    ((1.0 + cosine_similarity(a, b)) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit(repo: &str, path: &str, unit_type: UnitType, name: Option<&str>, embedding: Vec<f32>) -> NewCodeUnit {
        let (function_name, class_name, lines) = match unit_type {
            UnitType::File => (None, None, (None, None)),
            UnitType::Function => (name.map(str::to_string), None, (Some(1), Some(3))),
            UnitType::Class => (None, name.map(str::to_string), (Some(5), Some(9))),
        };
        NewCodeUnit {
            repository_id: repo.into(),
            file_path: path.into(),
            function_name,
            class_name,
            content: format!("content of {} {:?}", path, name),
            embedding,
            unit_type,
            start_line: lines.0,
            end_line: lines.1,
            complexity: Some(3),
            language: "rust".into(),
        }
    }

    #[tokio::test]
    async fn test_open_persists_dimension() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteStore::open_default(dir.path()).unwrap();
            assert_eq!(store.dimension(), None);
            store
                .insert(unit("r1", "a.rs", UnitType::File, None, vec![1.0, 0.0, 0.0]))
                .await
                .unwrap();
        }
        let db_path = default_db_path(dir.path());
        assert!(db_path.exists());
        let reopened = SqliteStore::open(&db_path).unwrap();
        assert_eq!(reopened.dimension(), Some(3));
        assert_eq!(reopened.count(Some("r1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_other_dimensions() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(unit("r1", "a.rs", UnitType::File, None, vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = store
            .insert(unit("r1", "b.rs", UnitType::File, None, vec![1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodevecError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let query = NeighborQuery::new(vec![1.0; 5], 3);
        assert!(matches!(
            store.nearest_neighbors(&query).await,
            Err(CodevecError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_one_compound_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = store
            .insert(unit("r1", "src/p.rs", UnitType::File, None, vec![1.0, 0.0]))
            .await
            .unwrap();
        let func = store
            .insert(unit("r1", "src/p.rs", UnitType::Function, Some("parse"), vec![0.0, 1.0]))
            .await
            .unwrap();

        let by_path = store
            .find_one(&UnitKey::repository("r1").file("src/p.rs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_path.id, file.id);

        let by_fn = store
            .find_one(&UnitKey::repository("r1").file("src/p.rs").function("parse"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_fn.id, func.id);
        assert_eq!(by_fn.embedding, vec![0.0, 1.0]);

        let exact_file = store
            .find_one(&UnitKey::for_unit(&file))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exact_file.id, file.id);

        assert!(store
            .find_one(&UnitKey::repository("r2").file("src/p.rs"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_nearest_neighbors_order_threshold_and_exclusion() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store
            .insert(unit("r1", "a.rs", UnitType::Function, Some("a"), vec![1.0, 0.0]))
            .await
            .unwrap();
        let b = store
            .insert(unit("r1", "b.rs", UnitType::Function, Some("b"), vec![0.8, 0.6]))
            .await
            .unwrap();
        store
            .insert(unit("r1", "c.rs", UnitType::Function, Some("c"), vec![-1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .nearest_neighbors(&NeighborQuery::new(vec![1.0, 0.0], 10).with_threshold(0.7))
            .await
            .unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.unit.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.9).abs() < 1e-6);

        let without_a = store
            .nearest_neighbors(
                &NeighborQuery::new(vec![1.0, 0.0], 10)
                    .with_threshold(0.0)
                    .excluding(a.id),
            )
            .await
            .unwrap();
        assert!(without_a.iter().all(|h| h.unit.id != a.id));
        assert_eq!(without_a.len(), 2);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_applies_filter_in_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(unit("r1", "a.rs", UnitType::File, None, vec![1.0, 0.0]))
            .await
            .unwrap();
        let func = store
            .insert(unit("r1", "a.rs", UnitType::Function, Some("f"), vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .insert(unit("r2", "a.rs", UnitType::Function, Some("f"), vec![1.0, 0.0]))
            .await
            .unwrap();

        let filter = MetadataFilter::new()
            .eq(Field::RepositoryId, "r1")
            .ne(Field::UnitType, UnitType::File);
        let hits = store
            .nearest_neighbors(&NeighborQuery::new(vec![1.0, 0.0], 1).with_filter(filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unit.id, func.id);
    }

    #[tokio::test]
    async fn test_nin_null_keeps_named_units() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(unit("r1", "a.rs", UnitType::File, None, vec![1.0, 0.0]))
            .await
            .unwrap();
        let func = store
            .insert(unit("r1", "a.rs", UnitType::Function, Some("f"), vec![1.0, 0.0]))
            .await
            .unwrap();

        let filter =
            MetadataFilter::from_json(&serde_json::json!({"functionName": {"$nin": [null]}}))
                .unwrap();
        let hits = store
            .nearest_neighbors(&NeighborQuery::new(vec![1.0, 0.0], 10).with_filter(filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unit.id, func.id);
    }

    #[tokio::test]
    async fn test_exact_match_tiers() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(unit("r1", "src/parse_util.rs", UnitType::File, None, vec![1.0]))
            .await
            .unwrap();
        store
            .insert(unit("r1", "src/lib.rs", UnitType::Function, Some("parse"), vec![1.0]))
            .await
            .unwrap();
        store
            .insert(unit("r1", "src/lib.rs", UnitType::Function, Some("parse_all"), vec![1.0]))
            .await
            .unwrap();

        let hits = store
            .exact_match(&ExactQuery {
                text: "PARSE".into(),
                limit: 10,
                filter: MetadataFilter::new(),
            })
            .await
            .unwrap();
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![1.0, 0.9, 0.8]);
        assert_eq!(hits[0].unit.function_name.as_deref(), Some("parse"));

        let none = store
            .exact_match(&ExactQuery {
                text: "100%".into(),
                limit: 10,
                filter: MetadataFilter::new(),
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_stats_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(unit("r1", "a.rs", UnitType::File, None, vec![1.0]))
            .await
            .unwrap();
        let mut go_fn = unit("r1", "b.go", UnitType::Function, Some("f"), vec![1.0]);
        go_fn.language = "go".into();
        go_fn.complexity = Some(7);
        store.insert(go_fn).await.unwrap();
        store
            .insert(unit("r1", "a.rs", UnitType::Function, Some("g"), vec![1.0]))
            .await
            .unwrap();

        let stats = store.aggregate_stats("r1").await.unwrap();
        assert_eq!(stats.total_embeddings, 3);
        assert_eq!(stats.breakdown[0].unit_type, UnitType::Function);
        assert_eq!(stats.breakdown[0].count, 2);
        assert_eq!(stats.breakdown[0].avg_complexity, Some(5.0));
        assert_eq!(stats.breakdown[0].languages, vec!["go", "rust"]);

        assert_eq!(store.delete_repository("r1").await.unwrap(), 3);
        let empty = store.aggregate_stats("r1").await.unwrap();
        assert_eq!(empty.total_embeddings, 0);
        assert!(empty.breakdown.is_empty());
    }

    #[test]
    fn test_similarity_score_range() {
        assert_eq!(similarity_score(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(similarity_score(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(similarity_score(&[1.0, 0.0], &[0.0, 1.0]), 0.5);
        assert_eq!(candidate_pool(5), 100);
        assert_eq!(candidate_pool(50), 500);
    }

    #[test]
    fn test_blob_round_trip_preserves_values() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&v)), v);
    }
}
