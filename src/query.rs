//! Query engine: a cached parse per dataset generation plus the
//! FLWOR/aggregate/group-by layer over path evaluation.
//!
//! Cache discipline (`Uncached → Parsed → Stale`): the first query parses
//! the dataset's XML artifact into a [`Document`] and caches it keyed by
//! (dataset id, artifact generation). Re-serialization bumps the
//! generation and invalidates the entry; a reader that finds a stale entry
//! drops it and re-parses under exclusive access. Concurrent readers of a
//! parsed entry do not block each other.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, RwLock},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use uuid::Uuid;

use crate::{
    dataset::Dataset,
    document::{Document, NodeId},
    error::{CoreError, Result},
    xpath::{self, PathResult},
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Dict,
    Text,
    Count,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Count => "count",
        }
    }
}

impl FromStr for AggregateOp {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateOp::Sum),
            "avg" => Ok(AggregateOp::Avg),
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "count" => Ok(AggregateOp::Count),
            other => Err(CoreError::invalid_query(
                other,
                "unknown aggregate operation (expected sum, avg, min, max, or count)",
            )),
        }
    }
}

/// Aggregate outcome; the empty numeric set is a defined "no data" result
/// serialized as JSON null, never a division-by-zero failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateValue {
    Number(f64),
    Integer(usize),
    NoData,
}

impl AggregateValue {
    pub fn to_json(&self) -> Json {
        match self {
            AggregateValue::Number(n) => json!(n),
            AggregateValue::Integer(n) => json!(n),
            AggregateValue::NoData => Json::Null,
        }
    }
}

impl Serialize for AggregateValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Query request shape consumed from the transports. Either `path` (plain
/// path query) or `for_path` (FLWOR pipeline) must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub dataset_id: Uuid,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub for_path: Option<String>,
    #[serde(default)]
    pub where_condition: Option<String>,
    #[serde(default)]
    pub return_field: Option<String>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub dataset_name: String,
    pub query: String,
    pub count: usize,
    pub results: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub dataset_id: Uuid,
    pub field: String,
    pub operation: AggregateOp,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub field: String,
    pub operation: AggregateOp,
    pub result: AggregateValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByRequest {
    pub dataset_id: Uuid,
    pub group_field: String,
    #[serde(default)]
    pub aggregate_field: Option<String>,
    #[serde(default)]
    pub operation: Option<AggregateOp>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByResponse {
    pub grouped_by: String,
    /// Insertion order is first-seen group order; serde_json preserves it.
    pub results: Map<String, Json>,
}

struct CachedDocument {
    generation: u64,
    doc: Document,
}

/// Process-lifetime cache of parsed XML trees, one entry per dataset.
pub struct QueryEngine {
    cache: RwLock<HashMap<Uuid, Arc<CachedDocument>>>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the cached parse for a dataset, re-parsing when the entry is
    /// absent or stale. Readers share the lock; the swap is exclusive.
    fn document(&self, dataset: &Dataset) -> Result<Arc<CachedDocument>> {
        let artifact = dataset.xml_artifact().ok_or_else(|| CoreError::ArtifactMissing {
            dataset: dataset.name().to_string(),
            artifact: "XML",
        })?;

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&dataset.id()) {
                if entry.generation == artifact.generation {
                    return Ok(Arc::clone(entry));
                }
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have re-parsed while this one waited.
        if let Some(entry) = cache.get(&dataset.id()) {
            if entry.generation == artifact.generation {
                return Ok(Arc::clone(entry));
            }
            debug!(
                "Dropping stale parse for dataset '{}' (generation {} -> {})",
                dataset.name(),
                entry.generation,
                artifact.generation
            );
        }
        info!(
            "Parsing XML artifact for dataset '{}' (generation {})",
            dataset.name(),
            artifact.generation
        );
        let doc = Document::parse(&artifact.content)?;
        let entry = Arc::new(CachedDocument {
            generation: artifact.generation,
            doc,
        });
        cache.insert(dataset.id(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop the cached parse for a dataset; the next query re-parses.
    pub fn invalidate(&self, dataset_id: Uuid) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.remove(&dataset_id).is_some() {
            debug!("Invalidated cached parse for dataset {dataset_id}");
        }
    }

    /// Evaluate a plain path query against the dataset's XML.
    pub fn execute_path(
        &self,
        dataset: &Dataset,
        path: &str,
        format: OutputFormat,
    ) -> Result<QueryResponse> {
        let entry = self.document(dataset)?;
        let doc = &entry.doc;
        let query = xpath::parse_query(path)?;
        let (count, results) = match query.evaluate(doc) {
            PathResult::Count(n) => (n, json!(n)),
            PathResult::Nodes { nodes, .. } => match format {
                OutputFormat::Count => (nodes.len(), json!(nodes.len())),
                OutputFormat::Text => {
                    let texts: Vec<String> = nodes
                        .iter()
                        .map(|&id| doc.text(id).to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                    (texts.len(), json!(texts))
                }
                OutputFormat::Dict => {
                    let dicts: Vec<Json> =
                        nodes.iter().map(|&id| node_to_dict(doc, id)).collect();
                    (dicts.len(), json!(dicts))
                }
            },
        };
        Ok(QueryResponse {
            dataset_name: dataset.name().to_string(),
            query: path.to_string(),
            count,
            results,
        })
    }

    /// FLWOR-shaped pipeline: select (`for_path`) → filter
    /// (`where_condition`) → project (`return_field`), preserving input
    /// order throughout.
    pub fn execute_flwor(
        &self,
        dataset: &Dataset,
        for_path: &str,
        where_condition: Option<&str>,
        return_field: Option<&str>,
        format: OutputFormat,
    ) -> Result<QueryResponse> {
        let entry = self.document(dataset)?;
        let doc = &entry.doc;

        let query = xpath::parse_query(for_path)?;
        let mut nodes = match query.evaluate(doc) {
            PathResult::Nodes { nodes, .. } => nodes,
            PathResult::Count(_) => {
                return Err(CoreError::invalid_query(
                    for_path,
                    "count() cannot be the for-clause of a query pipeline",
                ));
            }
        };

        if let Some(condition) = where_condition {
            let parsed = xpath::parse_condition(condition)?;
            let size = nodes.len();
            nodes = nodes
                .into_iter()
                .enumerate()
                .filter(|(idx, id)| parsed.matches(doc, *id, idx + 1, size))
                .map(|(_, id)| id)
                .collect();
        }

        if let Some(field) = return_field {
            nodes = nodes
                .iter()
                .flat_map(|&id| doc.children_by_tag(id, field).collect::<Vec<NodeId>>())
                .collect();
        }

        let (count, results) = match format {
            OutputFormat::Count => (nodes.len(), json!(nodes.len())),
            OutputFormat::Text => {
                let texts: Vec<String> = nodes
                    .iter()
                    .map(|&id| doc.text(id).to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                (texts.len(), json!(texts))
            }
            OutputFormat::Dict => {
                let dicts: Vec<Json> = nodes.iter().map(|&id| node_to_dict(doc, id)).collect();
                (dicts.len(), json!(dicts))
            }
        };

        let mut rendered = for_path.to_string();
        if let Some(condition) = where_condition {
            rendered.push_str(&format!(" where {condition}"));
        }
        if let Some(field) = return_field {
            rendered.push_str(&format!(" return {field}"));
        }
        Ok(QueryResponse {
            dataset_name: dataset.name().to_string(),
            query: rendered,
            count,
            results,
        })
    }

    /// Aggregate over the text values matched by `field` under every
    /// record. Non-numeric values are skipped; `count` counts non-null
    /// matched nodes regardless of parseability.
    pub fn aggregate(
        &self,
        dataset: &Dataset,
        field: &str,
        operation: AggregateOp,
    ) -> Result<AggregateResponse> {
        let entry = self.document(dataset)?;
        let doc = &entry.doc;
        let query = xpath::parse_query(&format!("//record/{field}"))?;
        let nodes = match query.evaluate(doc) {
            PathResult::Nodes { nodes, .. } => nodes,
            PathResult::Count(_) => unreachable!("path query"),
        };
        let result = aggregate_nodes(doc, &nodes, operation);
        Ok(AggregateResponse {
            field: field.to_string(),
            operation,
            result,
        })
    }

    /// Partition records by the exact text of `group_field`, preserving
    /// first-seen group order, with per-group counts and an optional
    /// scoped aggregate.
    pub fn group_by(
        &self,
        dataset: &Dataset,
        group_field: &str,
        aggregate_field: Option<&str>,
        operation: Option<AggregateOp>,
    ) -> Result<GroupByResponse> {
        let entry = self.document(dataset)?;
        let doc = &entry.doc;
        let query = xpath::parse_query("//record")?;
        let records = match query.evaluate(doc) {
            PathResult::Nodes { nodes, .. } => nodes,
            PathResult::Count(_) => unreachable!("path query"),
        };

        let mut order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<NodeId>> = HashMap::new();
        for record in records {
            let Some(key_node) = doc.children_by_tag(record, group_field).next() else {
                continue;
            };
            // Nil or empty group keys are skipped, as the distinct-value
            // idiom skips falsy values.
            if doc.is_nil(key_node) || doc.text(key_node).is_empty() {
                continue;
            }
            let key = doc.text(key_node).to_string();
            if !members.contains_key(&key) {
                order.push(key.clone());
            }
            members.entry(key).or_default().push(record);
        }

        let mut results = Map::new();
        for key in order {
            let records = &members[&key];
            let mut group = Map::new();
            group.insert("count".to_string(), json!(records.len()));
            if let (Some(field), Some(op)) = (aggregate_field, operation) {
                let nodes: Vec<NodeId> = records
                    .iter()
                    .flat_map(|&record| doc.children_by_tag(record, field).collect::<Vec<_>>())
                    .collect();
                let value = aggregate_nodes(doc, &nodes, op);
                group.insert(format!("{field}_{}", op.as_str()), value.to_json());
            }
            results.insert(key, Json::Object(group));
        }

        Ok(GroupByResponse {
            grouped_by: group_field.to_string(),
            results,
        })
    }

    /// Tree statistics over the cached parse.
    pub fn statistics(&self, dataset: &Dataset) -> Result<crate::document::DocumentStats> {
        let entry = self.document(dataset)?;
        Ok(entry.doc.statistics())
    }
}

fn aggregate_nodes(doc: &Document, nodes: &[NodeId], operation: AggregateOp) -> AggregateValue {
    let non_null: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&id| !doc.is_nil(id) && !doc.text(id).is_empty())
        .collect();
    if operation == AggregateOp::Count {
        return AggregateValue::Integer(non_null.len());
    }
    let numeric: Vec<f64> = non_null
        .iter()
        .filter_map(|&id| doc.text(id).trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .collect();
    if numeric.is_empty() {
        return AggregateValue::NoData;
    }
    let value = match operation {
        AggregateOp::Sum => numeric.iter().sum(),
        AggregateOp::Avg => numeric.iter().sum::<f64>() / numeric.len() as f64,
        AggregateOp::Min => numeric.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateOp::Max => numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateOp::Count => unreachable!("handled above"),
    };
    AggregateValue::Number(value)
}

/// Structured per-record mapping with a `_tag` discriminator: text content
/// under `_text`, attributes under `_attributes`, and one entry per child
/// element with non-empty text.
fn node_to_dict(doc: &Document, id: NodeId) -> Json {
    let node = doc.node(id);
    let mut map = Map::new();
    map.insert("_tag".to_string(), json!(node.tag));
    if !node.text.is_empty() {
        map.insert("_text".to_string(), json!(node.text));
    }
    if !node.attrs.is_empty() {
        let attrs: Map<String, Json> = node
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        map.insert("_attributes".to_string(), Json::Object(attrs));
    }
    for &child in &node.children {
        let child_node = doc.node(child);
        if !child_node.text.is_empty() {
            map.insert(child_node.tag.clone(), json!(child_node.text));
        }
    }
    Json::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_op_parses_known_tokens() {
        assert_eq!("SUM".parse::<AggregateOp>().unwrap(), AggregateOp::Sum);
        assert!("median".parse::<AggregateOp>().is_err());
    }

    #[test]
    fn no_data_serializes_as_null() {
        assert_eq!(AggregateValue::NoData.to_json(), Json::Null);
        assert_eq!(AggregateValue::Integer(3).to_json(), json!(3));
    }

    #[test]
    fn node_dicts_carry_tag_discriminator_and_children() {
        let doc = Document::parse(
            "<d><record><Season>Kharif</Season><Area xsi:nil=\"true\"/></record></d>",
        )
        .unwrap();
        let record = doc.children_by_tag(doc.root, "record").next().unwrap();
        let dict = node_to_dict(&doc, record);
        assert_eq!(dict["_tag"], json!("record"));
        assert_eq!(dict["Season"], json!("Kharif"));
        assert!(dict.get("Area").is_none());
    }
}
