//! Export/import of resource-object metadata documents.

pub mod fs;

use crate::error::{ReconError, Result};
use crate::xml::{MetadataDocument, XmlDocumentEditor};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub use fs::FsTransactionService;

/// The identity system's metadata export/import service
pub trait MetadataTransactionService {
    /// Export the XML of exactly one resource object
    fn export_object_xml(&self, object_name: &str) -> Result<String>;

    /// Import a document under a tracking label: take the exclusive import
    /// lock, stage the document, then commit it
    fn submit_import(&self, xml: &str, label: &str) -> Result<()>;
}

/// A document accepted by `submit_import`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedImport {
    pub label: String,
    pub xml: String,
}

#[derive(Debug, Default)]
struct InMemoryTransactionState {
    objects: Vec<(String, String)>,
    imports: Vec<SubmittedImport>,
    exports: usize,
}

/// In-memory transaction service for development/testing.
///
/// Committed imports replace the stored document of the resource object
/// they describe, so a later export sees the change.
#[derive(Debug, Default)]
pub struct InMemoryTransactionService {
    state: Mutex<InMemoryTransactionState>,
    editor: XmlDocumentEditor,
    reject_imports: Option<String>,
}

impl InMemoryTransactionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose imports always fail with `message`
    pub fn rejecting_imports(message: &str) -> Self {
        Self {
            reject_imports: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryTransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_object(&self, object_name: &str, xml: &str) {
        let mut state = self.lock();
        match state.objects.iter_mut().find(|(name, _)| name == object_name) {
            Some(slot) => slot.1 = xml.to_string(),
            None => state.objects.push((object_name.to_string(), xml.to_string())),
        }
    }

    pub fn object_xml(&self, object_name: &str) -> Option<String> {
        self.lock()
            .objects
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(object_name))
            .map(|(_, xml)| xml.clone())
    }

    pub fn imports(&self) -> Vec<SubmittedImport> {
        self.lock().imports.clone()
    }

    pub fn export_count(&self) -> usize {
        self.lock().exports
    }
}

impl MetadataTransactionService for InMemoryTransactionService {
    fn export_object_xml(&self, object_name: &str) -> Result<String> {
        let mut state = self.lock();
        let matches: Vec<String> = state
            .objects
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(object_name))
            .map(|(_, xml)| xml.clone())
            .collect();
        match matches.as_slice() {
            [xml] => {
                state.exports += 1;
                debug!("Exported {} ({} bytes)", object_name, xml.len());
                Ok(xml.clone())
            }
            [] => Err(ReconError::transaction(
                "export",
                format!("no resource object named '{}'", object_name),
            )),
            _ => Err(ReconError::transaction(
                "export",
                "Only one object can be exported at a time",
            )),
        }
    }

    fn submit_import(&self, xml: &str, label: &str) -> Result<()> {
        if let Some(message) = &self.reject_imports {
            return Err(ReconError::transaction("import", message.clone()));
        }

        let document = MetadataDocument::parse(xml)?;
        let object_name = self
            .editor
            .resource_name(&document)?
            .ok_or_else(|| ReconError::transaction("import", "document has no resource name"))?;

        let mut state = self.lock();
        match state
            .objects
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&object_name))
        {
            Some(slot) => slot.1 = xml.to_string(),
            None => state.objects.push((object_name.clone(), xml.to_string())),
        }
        state.imports.push(SubmittedImport {
            label: label.to_string(),
            xml: xml.to_string(),
        });
        info!("Imported {} under label {}", object_name, label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<xl-ddm-data><Resource name=\"Flat File\"><OBJ_UPDATE>1</OBJ_UPDATE></Resource></xl-ddm-data>";

    #[test]
    fn test_export_requires_exactly_one_match() {
        let service = InMemoryTransactionService::new();
        assert!(matches!(
            service.export_object_xml("Flat File"),
            Err(ReconError::Transaction { .. })
        ));

        service.put_object("Flat File", DOC);
        assert_eq!(service.export_object_xml("flat file").unwrap(), DOC);

        service.put_object("FLAT FILE", DOC);
        assert!(service.export_object_xml("Flat File").is_err());
    }

    #[test]
    fn test_import_replaces_stored_document() {
        let service = InMemoryTransactionService::new();
        service.put_object("Flat File", DOC);
        let updated = DOC.replace("<OBJ_UPDATE>1", "<OBJ_UPDATE>2");
        service.submit_import(&updated, "label").unwrap();

        assert_eq!(service.object_xml("Flat File").as_deref(), Some(updated.as_str()));
        assert_eq!(service.imports().len(), 1);
        assert_eq!(service.imports()[0].label, "label");
    }

    #[test]
    fn test_rejecting_service_fails_imports() {
        let service = InMemoryTransactionService::rejecting_imports("lock held");
        let err = service.submit_import(DOC, "label").unwrap_err();
        assert!(err.to_string().contains("lock held"));
        assert!(service.imports().is_empty());
    }
}
