//! Orchestration seam for the transports: dataset registry, import,
//! artifact generation, validation, and query entry points.
//!
//! The service owns the only shared mutable state in the core (the
//! dataset registry and the query engine's parse cache) behind a
//! per-dataset read-write discipline. Every operation here is synchronous;
//! concurrent transport workers call in from their own threads.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, RwLock},
};

use log::{error, info};
use serde_json::json;
use uuid::Uuid;

use crate::{
    analyze,
    config::CoreConfig,
    dataset::{Dataset, ImportLogEntry, LogLevel},
    document::DocumentStats,
    error::{CoreError, Result},
    import,
    query::{
        AggregateRequest, AggregateResponse, GroupByRequest, GroupByResponse, QueryEngine,
        QueryRequest, QueryResponse,
    },
    validate::{self, ValidationReport},
    xml, xsd,
};

/// Summary of the full generate-and-validate workflow.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub dataset: String,
    pub xsd_generated: bool,
    pub xml_generated: bool,
    pub validation_passed: bool,
    pub validation_errors: Vec<String>,
}

type SharedDataset = Arc<RwLock<Dataset>>;

pub struct DatasetService {
    config: CoreConfig,
    datasets: RwLock<HashMap<Uuid, SharedDataset>>,
    names: RwLock<HashMap<String, Uuid>>,
    engine: QueryEngine,
}

impl Default for DatasetService {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl DatasetService {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            datasets: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            engine: QueryEngine::new(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn shared(&self, id: Uuid) -> Result<SharedDataset> {
        let datasets = self.datasets.read().unwrap_or_else(|e| e.into_inner());
        datasets
            .get(&id)
            .cloned()
            .ok_or(CoreError::DatasetNotFound(id))
    }

    pub fn dataset_id(&self, name: &str) -> Option<Uuid> {
        let names = self.names.read().unwrap_or_else(|e| e.into_inner());
        names.get(name).copied()
    }

    pub fn dataset_ids(&self) -> Vec<Uuid> {
        let datasets = self.datasets.read().unwrap_or_else(|e| e.into_inner());
        datasets.keys().copied().collect()
    }

    /// Import a tabular file: analyze structure, then batch-import every
    /// row under the inferred schema. Importing under an existing dataset
    /// name atomically replaces that dataset's record generation.
    pub fn import_csv(
        &self,
        path: &Path,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Uuid> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let dataset_name = crate::schema::normalize_xml_name(name.unwrap_or(&stem));
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Imported from {}", path.display()));

        info!("Starting import of {:?} as '{dataset_name}'", path);

        let shared = self.register(&dataset_name, &description, path);
        let id = {
            let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
            dataset.mark_processing();
            dataset.append_log(
                LogLevel::Info,
                format!("Starting import of {}", path.display()),
                json!({ "source": path.display().to_string() }),
            );
            dataset.id()
        };

        match self.run_import(path, &shared) {
            Ok(imported) => {
                let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
                dataset.append_log(
                    LogLevel::Success,
                    format!("Successfully imported {imported} rows"),
                    json!({ "rows": imported }),
                );
                self.engine.invalidate(id);
                info!("Import completed for '{dataset_name}' ({imported} rows)");
                Ok(id)
            }
            Err(err) => {
                let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
                dataset.mark_failed();
                dataset.append_log(
                    LogLevel::Error,
                    format!("Import failed: {err}"),
                    json!({ "kind": err.kind() }),
                );
                error!("Import of {:?} failed: {err}", path);
                Err(err)
            }
        }
    }

    fn register(&self, name: &str, description: &str, path: &Path) -> SharedDataset {
        if let Some(existing) = self.dataset_id(name) {
            if let Ok(shared) = self.shared(existing) {
                return shared;
            }
        }
        let mut dataset = Dataset::new(name, description);
        dataset.set_source_file(path.to_path_buf());
        let id = dataset.id();
        let shared = Arc::new(RwLock::new(dataset));
        self.datasets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&shared));
        self.names
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), id);
        shared
    }

    fn run_import(&self, path: &Path, shared: &SharedDataset) -> Result<usize> {
        let analysis = analyze::analyze_path(path, &self.config)?;
        let rows = import::read_rows(path, analysis.delimiter, analysis.encoding)?;
        let outcome = import::import_batch(&analysis.schema, rows, self.config.batch_size)?;

        let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
        let imported = outcome.imported;
        dataset.replace_records(analysis.schema, analysis.stats, outcome.records);
        for entry in outcome.entries {
            dataset.push_log_entry(entry);
        }
        Ok(imported)
    }

    /// Re-import the dataset from its recorded source file, producing a
    /// new record generation.
    pub fn refresh(&self, id: Uuid) -> Result<usize> {
        let shared = self.shared(id)?;
        let path = {
            let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
            let path = dataset
                .source_file()
                .cloned()
                .ok_or_else(|| CoreError::malformed("dataset has no recorded source file"))?;
            dataset.mark_processing();
            dataset.append_log(
                LogLevel::Info,
                format!("Re-importing from {}", path.display()),
                json!({ "source": path.display().to_string() }),
            );
            path
        };
        match self.run_import(&path, &shared) {
            Ok(imported) => {
                let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
                dataset.append_log(
                    LogLevel::Success,
                    format!("Successfully imported {imported} rows"),
                    json!({ "rows": imported }),
                );
                self.engine.invalidate(id);
                Ok(imported)
            }
            Err(err) => {
                let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
                dataset.mark_failed();
                dataset.append_log(
                    LogLevel::Error,
                    format!("Re-import failed: {err}"),
                    json!({ "kind": err.kind() }),
                );
                Err(err)
            }
        }
    }

    /// Generate the validating schema artifact for a dataset.
    pub fn generate_xsd(&self, id: Uuid) -> Result<String> {
        let shared = self.shared(id)?;
        let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
        let content = xsd::generate(dataset.name(), dataset.schema(), self.config.xml_indent)?;
        dataset.set_xsd_artifact(content.clone());
        self.persist_artifact(dataset.name(), "xsd", &content)?;
        dataset.append_log(
            LogLevel::Success,
            "XSD schema generated",
            json!({ "columns": dataset.total_columns() }),
        );
        info!("Generated XSD for dataset '{}'", dataset.name());
        Ok(content)
    }

    /// Serialize the dataset's records into the XML artifact, bumping the
    /// artifact generation and invalidating the cached parse.
    pub fn generate_xml(&self, id: Uuid, limit: Option<usize>) -> Result<String> {
        let shared = self.shared(id)?;
        let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
        let content = xml::serialize(
            dataset.name(),
            dataset.schema(),
            dataset.records(),
            limit,
            self.config.xml_indent,
        )?;
        dataset.set_xml_artifact(content.clone());
        self.persist_artifact(dataset.name(), "xml", &content)?;
        self.engine.invalidate(id);
        let emitted = limit.unwrap_or(dataset.total_rows()).min(dataset.total_rows());
        dataset.append_log(
            LogLevel::Success,
            format!("XML generated with {emitted} records"),
            json!({ "records": emitted }),
        );
        info!(
            "Generated XML for dataset '{}' ({} records)",
            dataset.name(),
            emitted
        );
        Ok(content)
    }

    fn persist_artifact(&self, dataset_name: &str, extension: &str, content: &str) -> Result<()> {
        if let Some(dir) = &self.config.artifact_dir {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("{dataset_name}.{extension}"));
            fs::write(&path, content)?;
            info!("Wrote artifact {path:?}");
        }
        Ok(())
    }

    /// Validate the generated XML against the generated XSD. Requires both
    /// artifacts; an invalid document is a normal reported result.
    pub fn validate(&self, id: Uuid) -> Result<ValidationReport> {
        let shared = self.shared(id)?;
        let mut dataset = shared.write().unwrap_or_else(|e| e.into_inner());
        let xml_content = dataset
            .xml_artifact()
            .ok_or_else(|| CoreError::ArtifactMissing {
                dataset: dataset.name().to_string(),
                artifact: "XML",
            })?
            .content
            .clone();
        let xsd_content = dataset
            .xsd_artifact()
            .ok_or_else(|| CoreError::ArtifactMissing {
                dataset: dataset.name().to_string(),
                artifact: "XSD",
            })?
            .content
            .clone();

        let report = validate::validate(&xml_content, &xsd_content)?;
        if report.is_valid {
            dataset.append_log(LogLevel::Success, "XML validation successful", json!({}));
        } else {
            dataset.append_log(
                LogLevel::Error,
                format!("XML validation failed with {} error(s)", report.errors.len()),
                json!({ "errors": report.errors }),
            );
        }
        Ok(report)
    }

    /// Complete workflow: generate XSD, generate XML, validate.
    pub fn generate_and_validate(&self, id: Uuid, limit: Option<usize>) -> Result<WorkflowSummary> {
        let name = {
            let shared = self.shared(id)?;
            let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
            dataset.name().to_string()
        };
        let mut summary = WorkflowSummary {
            dataset: name,
            xsd_generated: false,
            xml_generated: false,
            validation_passed: false,
            validation_errors: Vec::new(),
        };
        self.generate_xsd(id)?;
        summary.xsd_generated = true;
        self.generate_xml(id, limit)?;
        summary.xml_generated = true;
        let report = self.validate(id)?;
        summary.validation_passed = report.is_valid;
        summary.validation_errors = report
            .errors
            .into_iter()
            .map(|issue| format!("{}: {}", issue.location, issue.reason))
            .collect();
        Ok(summary)
    }

    /// Path or FLWOR query, per the request shape in the boundary
    /// contract.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let shared = self.shared(request.dataset_id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        let format = request.format.unwrap_or_default();
        if let Some(for_path) = &request.for_path {
            self.engine.execute_flwor(
                &dataset,
                for_path,
                request.where_condition.as_deref(),
                request.return_field.as_deref(),
                format,
            )
        } else if let Some(path) = &request.path {
            self.engine.execute_path(&dataset, path, format)
        } else {
            Err(CoreError::invalid_query(
                "",
                "request carries neither 'path' nor 'forPath'",
            ))
        }
    }

    pub fn aggregate(&self, request: &AggregateRequest) -> Result<AggregateResponse> {
        let shared = self.shared(request.dataset_id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        self.engine
            .aggregate(&dataset, &request.field, request.operation)
    }

    pub fn group_by(&self, request: &GroupByRequest) -> Result<GroupByResponse> {
        let shared = self.shared(request.dataset_id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        self.engine.group_by(
            &dataset,
            &request.group_field,
            request.aggregate_field.as_deref(),
            request.operation,
        )
    }

    pub fn statistics(&self, id: Uuid) -> Result<DocumentStats> {
        let shared = self.shared(id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        self.engine.statistics(&dataset)
    }

    /// The dataset's append-only import log, oldest first.
    pub fn logs(&self, id: Uuid) -> Result<Vec<ImportLogEntry>> {
        let shared = self.shared(id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        Ok(dataset.log().to_vec())
    }

    /// Run `f` with shared read access to a dataset.
    pub fn with_dataset<T>(&self, id: Uuid, f: impl FnOnce(&Dataset) -> T) -> Result<T> {
        let shared = self.shared(id)?;
        let dataset = shared.read().unwrap_or_else(|e| e.into_inner());
        Ok(f(&dataset))
    }
}
