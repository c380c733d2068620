//! JSON file import and export of the whole graph.
//!
//! The file holds a single array of records, each carrying its `type`
//! discriminator, exactly as returned by [`KnowledgeGraph::export_data`].

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::external::DocumentBackend;
use crate::graph::{Document, KnowledgeGraph};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub entities: usize,
    pub relations: usize,
}

/// A record that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// Position of the record in the file
    pub index: usize,
    /// Entity name or relation triple, when the record could be parsed
    pub target: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub entities: usize,
    pub relations: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.entities + self.relations
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Write every stored record to `path` as pretty printed JSON
pub async fn export_to_file<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    path: &Path,
) -> Result<ExportSummary> {
    let documents = graph
        .export_data()
        .await
        .context("Failed to read the graph for export")?;

    let mut summary = ExportSummary::default();
    for document in &documents {
        match document {
            Document::Entity(_) => summary.entities += 1,
            Document::Relation(_) => summary.relations += 1,
        }
    }

    let json = serde_json::to_string_pretty(&documents)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write export file {}", path.display()))?;

    info!(
        path = %path.display(),
        entities = summary.entities,
        relations = summary.relations,
        "exported knowledge graph"
    );
    Ok(summary)
}

/// Replay the records of an export file into the graph.
///
/// Entities are stored as given, keeping their reading statistics. A record
/// that fails to parse or store is reported and the import carries on.
pub async fn import_from_file<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    path: &Path,
) -> Result<ImportReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file {}", path.display()))?;
    let records: Vec<Value> = match serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?
    {
        Value::Array(records) => records,
        _ => return Err(anyhow!("{} must contain a JSON array of records", path.display())),
    };

    graph
        .initialize()
        .await
        .context("Failed to initialize the knowledge graph index")?;

    let mut report = ImportReport::default();
    for (index, record) in records.into_iter().enumerate() {
        let document: Document = match serde_json::from_value(record) {
            Ok(document) => document,
            Err(e) => {
                warn!(index, "skipping malformed record: {}", e);
                report.failures.push(ImportFailure {
                    index,
                    target: None,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let result = match &document {
            Document::Entity(_) => graph.restore_document(&document).await,
            Document::Relation(relation) => graph.save_relation(relation).await.map(|_| ()),
        };
        match result {
            Ok(()) => match document {
                Document::Entity(_) => report.entities += 1,
                Document::Relation(_) => report.relations += 1,
            },
            Err(e) => {
                warn!(index, "failed to import record: {}", e);
                report.failures.push(ImportFailure {
                    index,
                    target: Some(document.label()),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        path = %path.display(),
        entities = report.entities,
        relations = report.relations,
        failed = report.failures.len(),
        "imported knowledge graph"
    );
    Ok(report)
}
