//! Dataset ownership model: schema, records, generated artifacts, and the
//! append-only import log.
//!
//! A [`Dataset`] exclusively owns its [`Schema`], its ordered [`Record`]s,
//! and the generated XML/XSD artifacts, each stamped with the artifact
//! generation that produced them. Re-import replaces the record generation
//! atomically and invalidates the artifact pair; regeneration bumps the
//! generation counter so dependent caches can tell fresh from stale.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    schema::{ColumnStats, Schema},
    value::Value,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One append-only import log entry, exposed upward to transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ImportLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            level,
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// A generated document plus the artifact generation that produced it.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub content: String,
    pub generation: u64,
}

/// One row of schema-typed values in schema position order. Created during
/// batch import and never mutated in place; corrections go through
/// re-import.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Option<Value>>,
}

impl Record {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    pub fn value(&self, position: usize) -> Option<&Value> {
        self.values.get(position).and_then(|v| v.as_ref())
    }

    /// Schema-described access by column name; the accessor contract every
    /// component (serializer, query layer, tests) reads records through.
    pub fn field<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Value> {
        schema.column_index(name).and_then(|idx| self.value(idx))
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug)]
pub struct Dataset {
    id: Uuid,
    name: String,
    description: String,
    source_file: Option<PathBuf>,
    status: DatasetStatus,
    created_at: DateTime<Utc>,
    imported_at: Option<DateTime<Utc>>,
    schema: Schema,
    stats: Vec<ColumnStats>,
    records: Vec<Record>,
    generation: u64,
    xml: Option<Artifact>,
    xsd: Option<Artifact>,
    log: Vec<ImportLogEntry>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            source_file: None,
            status: DatasetStatus::Pending,
            created_at: Utc::now(),
            imported_at: None,
            schema: Schema { columns: Vec::new() },
            stats: Vec::new(),
            records: Vec::new(),
            generation: 0,
            xml: None,
            xsd: None,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_source_file(&mut self, path: PathBuf) {
        self.source_file = Some(path);
    }

    pub fn source_file(&self) -> Option<&PathBuf> {
        self.source_file.as_ref()
    }

    pub fn status(&self) -> DatasetStatus {
        self.status
    }

    pub fn mark_processing(&mut self) {
        self.status = DatasetStatus::Processing;
    }

    pub fn mark_failed(&mut self) {
        self.status = DatasetStatus::Failed;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn imported_at(&self) -> Option<DateTime<Utc>> {
        self.imported_at
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn total_rows(&self) -> usize {
        self.records.len()
    }

    pub fn total_columns(&self) -> usize {
        self.schema.columns.len()
    }

    /// Current artifact generation. Bumped by every record replacement and
    /// every artifact regeneration; cache keys include it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn xml_artifact(&self) -> Option<&Artifact> {
        self.xml.as_ref()
    }

    pub fn xsd_artifact(&self) -> Option<&Artifact> {
        self.xsd.as_ref()
    }

    /// Atomically install a new record generation under a new schema
    /// snapshot. The previously generated XML/XSD pair is invalid the
    /// moment the schema changes, so both artifacts are dropped.
    pub fn replace_records(&mut self, schema: Schema, stats: Vec<ColumnStats>, records: Vec<Record>) {
        self.schema = schema;
        self.stats = stats;
        self.records = records;
        self.generation += 1;
        self.xml = None;
        self.xsd = None;
        self.status = DatasetStatus::Completed;
        self.imported_at = Some(Utc::now());
    }

    pub fn set_xml_artifact(&mut self, content: String) -> u64 {
        self.generation += 1;
        self.xml = Some(Artifact {
            content,
            generation: self.generation,
        });
        self.generation
    }

    pub fn set_xsd_artifact(&mut self, content: String) -> u64 {
        self.generation += 1;
        self.xsd = Some(Artifact {
            content,
            generation: self.generation,
        });
        self.generation
    }

    pub fn append_log(&mut self, level: LogLevel, message: impl Into<String>, details: serde_json::Value) {
        self.log.push(ImportLogEntry::new(level, message, details));
    }

    /// Append an entry produced elsewhere, keeping its timestamp.
    pub fn push_log_entry(&mut self, entry: ImportLogEntry) {
        self.log.push(entry);
    }

    pub fn log(&self) -> &[ImportLogEntry] {
        &self.log
    }
}
