use crate::constants::{IMPORT_LABEL_ADD, IMPORT_LABEL_REMOVE};
use crate::error::{ReconError, Result};
use crate::metrics;
use crate::parser::{AddFileReader, RemoveFileReader};
use crate::storage::MetadataStore;
use crate::transaction::MetadataTransactionService;
use crate::types::ResourceObjectHandle;
use crate::validation::{AddFieldValidator, RejectedRow, RemoveFieldValidator};
use crate::xml::{MetadataDocument, XmlDocumentEditor};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Add,
    Remove,
}

impl PipelineKind {
    pub fn import_label(&self) -> &'static str {
        match self {
            PipelineKind::Add => IMPORT_LABEL_ADD,
            PipelineKind::Remove => IMPORT_LABEL_REMOVE,
        }
    }

    fn metric_name(&self) -> &'static str {
        match self {
            PipelineKind::Add => metrics::PIPELINE_ADD,
            PipelineKind::Remove => metrics::PIPELINE_REMOVE,
        }
    }
}

/// Result of a complete add or remove run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub pipeline: PipelineKind,
    pub object: ResourceObjectHandle,
    pub rows_read: usize,
    /// Field names applied to the document, in application order
    pub staged: Vec<String>,
    pub rejected: Vec<RejectedRow>,
    pub import_submitted: bool,
    pub import_label: Option<String>,
}

impl RunSummary {
    fn new(pipeline: PipelineKind, object: ResourceObjectHandle) -> Self {
        Self {
            pipeline,
            object,
            rows_read: 0,
            staged: Vec::new(),
            rejected: Vec::new(),
            import_submitted: false,
            import_label: None,
        }
    }
}

/// Check that exactly one resource object has this name and resolve it
pub fn resolve_resource_object<S: MetadataStore + ?Sized>(
    store: &S,
    object_name: &str,
) -> Result<ResourceObjectHandle> {
    if !store.resource_object_exists(object_name)? {
        return Err(ReconError::ResourceNotFound(object_name.to_string()));
    }
    let key = store.resolve_resource_object_key(object_name)?;
    let name = store.resolve_resource_object_name(key)?;
    debug!("Resolved resource object {} to key {}", name, key);
    Ok(ResourceObjectHandle { key, name })
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)?;
    Ok(BufReader::new(file))
}

/// Export the object's document, apply `mutate`, serialize and import it
/// under the pipeline's label.
fn edit_and_import<T, F>(
    transactions: &T,
    kind: PipelineKind,
    object: &ResourceObjectHandle,
    staged: usize,
    mutate: F,
) -> Result<()>
where
    T: MetadataTransactionService + ?Sized,
    F: FnOnce(&mut MetadataDocument) -> Result<()>,
{
    let exported = transactions.export_object_xml(&object.name)?;
    let mut document = MetadataDocument::parse(&exported)?;
    mutate(&mut document)?;

    let xml = document.serialize()?;
    debug!("Import document for {}:\n{}", object.name, xml);

    let label = kind.import_label();
    match transactions.submit_import(&xml, label) {
        Ok(()) => {
            metrics::record_import_submitted(kind.metric_name(), staged, xml.len());
            info!("Submitted import {} for resource object {}", label, object.name);
            Ok(())
        }
        Err(e) => {
            metrics::record_import_failed(kind.metric_name());
            Err(e.with_payload("import", xml))
        }
    }
}

/// Adds the fields listed in a delimited file to a resource object
pub struct AddPipeline<'a, S: ?Sized, T: ?Sized> {
    store: &'a S,
    transactions: &'a T,
    editor: XmlDocumentEditor,
    delimiter: String,
}

impl<'a, S, T> AddPipeline<'a, S, T>
where
    S: MetadataStore + ?Sized,
    T: MetadataTransactionService + ?Sized,
{
    pub fn new(store: &'a S, transactions: &'a T, delimiter: &str) -> Self {
        Self {
            store,
            transactions,
            editor: XmlDocumentEditor::default(),
            delimiter: delimiter.to_string(),
        }
    }

    pub fn with_editor(mut self, editor: XmlDocumentEditor) -> Self {
        self.editor = editor;
        self
    }

    /// Run against an add file on disk. The file is opened only once the
    /// resource object is known to exist.
    #[instrument(skip(self), fields(pipeline = "add"))]
    pub fn run(&self, object_name: &str, path: &Path) -> Result<RunSummary> {
        self.run_with(object_name, || open_input(path))
    }

    pub fn run_reader<R: BufRead>(&self, object_name: &str, reader: R) -> Result<RunSummary> {
        self.run_with(object_name, || Ok(reader))
    }

    fn run_with<R, F>(&self, object_name: &str, open: F) -> Result<RunSummary>
    where
        R: BufRead,
        F: FnOnce() -> Result<R>,
    {
        let started = Instant::now();
        let object = resolve_resource_object(self.store, object_name)?;
        let mut reader = AddFileReader::new(open()?, &self.delimiter)?;

        let validation = AddFieldValidator::new(self.store, &object).validate_all(&mut reader)?;
        let mut summary = RunSummary::new(PipelineKind::Add, object.clone());
        summary.rows_read = validation.rows_read;
        summary.rejected = validation.rejected;
        summary.staged = validation.records.iter().map(|r| r.name.clone()).collect();

        if validation.records.is_empty() {
            warn!("No valid recon fields to add to {}", object.name);
            metrics::record_short_circuit(metrics::PIPELINE_ADD);
            return Ok(summary);
        }

        let editor = &self.editor;
        let records = &validation.records;
        edit_and_import(self.transactions, PipelineKind::Add, &object, records.len(), |document| {
            for record in records {
                editor.add_field(document, record)?;
                debug!("Added recon field {} to document", record.name);
            }
            Ok(())
        })?;

        // Committed fields become visible to the next run's store lookups
        for record in records {
            self.store.record_field_added(object.key, record)?;
        }

        summary.import_submitted = true;
        summary.import_label = Some(IMPORT_LABEL_ADD.to_string());
        metrics::record_run_duration(metrics::PIPELINE_ADD, started.elapsed().as_secs_f64());
        info!(
            "Added {} recon fields to {} ({} rows rejected)",
            summary.staged.len(),
            object.name,
            summary.rejected.len()
        );
        Ok(summary)
    }
}

/// Removes the fields listed one per line in a file from a resource object
pub struct RemovePipeline<'a, S: ?Sized, T: ?Sized> {
    store: &'a S,
    transactions: &'a T,
    editor: XmlDocumentEditor,
}

impl<'a, S, T> RemovePipeline<'a, S, T>
where
    S: MetadataStore + ?Sized,
    T: MetadataTransactionService + ?Sized,
{
    pub fn new(store: &'a S, transactions: &'a T) -> Self {
        Self {
            store,
            transactions,
            editor: XmlDocumentEditor::default(),
        }
    }

    pub fn with_editor(mut self, editor: XmlDocumentEditor) -> Self {
        self.editor = editor;
        self
    }

    #[instrument(skip(self), fields(pipeline = "remove"))]
    pub fn run(&self, object_name: &str, path: &Path) -> Result<RunSummary> {
        self.run_with(object_name, || open_input(path))
    }

    pub fn run_reader<R: BufRead>(&self, object_name: &str, reader: R) -> Result<RunSummary> {
        self.run_with(object_name, || Ok(reader))
    }

    fn run_with<R, F>(&self, object_name: &str, open: F) -> Result<RunSummary>
    where
        R: BufRead,
        F: FnOnce() -> Result<R>,
    {
        let started = Instant::now();
        let object = resolve_resource_object(self.store, object_name)?;
        let reader = RemoveFileReader::new(open()?);

        let validation = RemoveFieldValidator::new(self.store, &object).validate_all(reader)?;
        let mut summary = RunSummary::new(PipelineKind::Remove, object.clone());
        summary.rows_read = validation.rows_read;
        summary.rejected = validation.rejected;
        summary.staged = validation.staged;

        if summary.staged.is_empty() {
            warn!("No valid recon fields to remove from {}", object.name);
            metrics::record_short_circuit(metrics::PIPELINE_REMOVE);
            return Ok(summary);
        }

        let editor = &self.editor;
        let names = &summary.staged;
        edit_and_import(self.transactions, PipelineKind::Remove, &object, names.len(), |document| {
            for name in names {
                editor.remove_field(document, name)?;
                debug!("Removed recon field {} from document", name);
            }
            Ok(())
        })?;

        for name in &summary.staged {
            self.store.record_field_removed(object.key, name)?;
        }

        summary.import_submitted = true;
        summary.import_label = Some(IMPORT_LABEL_REMOVE.to_string());
        metrics::record_run_duration(metrics::PIPELINE_REMOVE, started.elapsed().as_secs_f64());
        info!(
            "Removed {} recon fields from {} ({} names rejected)",
            summary.staged.len(),
            object.name,
            summary.rejected.len()
        );
        Ok(summary)
    }
}
