use crate::constants::RECON_FIELD_TYPE_MULTI_VALUE;
use crate::error::{ReconError, Result};
use crate::types::{ReconFieldSummary, ReconciliationFieldRecord, ResourceObjectSummary};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Lookups against the identity system's resource-object metadata.
///
/// Resource object names are matched case-insensitively; reconciliation
/// field names are case-sensitive.
pub trait MetadataStore {
    /// True when exactly one resource object has this name
    fn resource_object_exists(&self, name: &str) -> Result<bool>;
    fn resolve_resource_object_key(&self, name: &str) -> Result<i64>;
    fn resolve_resource_object_name(&self, key: i64) -> Result<String>;

    /// True when a field with this name exists at any level of the object
    fn field_exists(&self, object_key: i64, field_name: &str) -> Result<bool>;
    fn is_field_multi_valued(&self, object_key: i64, field_name: &str) -> Result<bool>;
    /// True when the name belongs to an attribute nested under a multi-valued field
    fn is_field_child_attribute(&self, object_key: i64, field_name: &str) -> Result<bool>;
    fn resolve_field_key(&self, object_key: i64, field_name: &str) -> Result<i64>;
    /// True when the field is mapped to a process form field
    fn field_has_mapping(&self, field_key: i64) -> Result<bool>;

    fn list_resource_objects(&self) -> Result<Vec<ResourceObjectSummary>>;
    fn list_fields(&self, object_key: i64) -> Result<Vec<ReconFieldSummary>>;

    /// Record a top-level field committed by an import; returns its key
    fn record_field_added(&self, object_key: i64, record: &ReconciliationFieldRecord) -> Result<i64>;
    /// Drop the top-level field committed as removed by an import
    fn record_field_removed(&self, object_key: i64, field_name: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredField {
    object_key: i64,
    field: ReconFieldSummary,
}

#[derive(Debug, Default)]
struct InMemoryState {
    next_key: i64,
    objects: Vec<ResourceObjectSummary>,
    fields: Vec<StoredField>,
    mapped_fields: HashSet<i64>,
}

impl InMemoryState {
    fn allocate_key(&mut self) -> i64 {
        self.next_key += 1;
        self.next_key
    }

    fn matching_fields<'a>(&'a self, object_key: i64, field_name: &'a str) -> impl Iterator<Item = &'a ReconFieldSummary> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.object_key == object_key && f.field.name == field_name)
            .map(|f| &f.field)
    }
}

/// In-memory metadata store for development/testing
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_resource_object(&self, name: &str) -> i64 {
        let mut state = self.lock();
        let key = state.allocate_key();
        state.objects.push(ResourceObjectSummary {
            key,
            object_type: Some("Application".to_string()),
            name: name.to_string(),
        });
        debug!("Created resource object: {} with key {}", name, key);
        key
    }

    pub fn add_field(&self, object_key: i64, name: &str, field_type: &str, is_required: bool) -> i64 {
        self.insert_field(object_key, None, name, field_type, is_required)
    }

    /// Add an attribute nested under a multi-valued field
    pub fn add_child_field(&self, object_key: i64, parent_key: i64, name: &str, field_type: &str) -> i64 {
        self.insert_field(object_key, Some(parent_key), name, field_type, false)
    }

    fn insert_field(
        &self,
        object_key: i64,
        parent_key: Option<i64>,
        name: &str,
        field_type: &str,
        is_required: bool,
    ) -> i64 {
        let mut state = self.lock();
        let key = state.allocate_key();
        state.fields.push(StoredField {
            object_key,
            field: ReconFieldSummary {
                key,
                name: name.to_string(),
                field_type: field_type.to_string(),
                is_required,
                parent_key,
            },
        });
        debug!("Created recon field: {} with key {}", name, key);
        key
    }

    pub fn add_mapping(&self, field_key: i64) {
        self.lock().mapped_fields.insert(field_key);
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn resource_object_exists(&self, name: &str) -> Result<bool> {
        let state = self.lock();
        let count = state
            .objects
            .iter()
            .filter(|o| o.name.eq_ignore_ascii_case(name))
            .count();
        Ok(count == 1)
    }

    fn resolve_resource_object_key(&self, name: &str) -> Result<i64> {
        let state = self.lock();
        state
            .objects
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .map(|o| o.key)
            .ok_or_else(|| ReconError::ResourceNotFound(name.to_string()))
    }

    fn resolve_resource_object_name(&self, key: i64) -> Result<String> {
        let state = self.lock();
        state
            .objects
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.name.clone())
            .ok_or_else(|| ReconError::NotFound(format!("resource object key {}", key)))
    }

    fn field_exists(&self, object_key: i64, field_name: &str) -> Result<bool> {
        Ok(self.lock().matching_fields(object_key, field_name).next().is_some())
    }

    fn is_field_multi_valued(&self, object_key: i64, field_name: &str) -> Result<bool> {
        Ok(self
            .lock()
            .matching_fields(object_key, field_name)
            .next()
            .map_or(false, |f| f.field_type.eq_ignore_ascii_case(RECON_FIELD_TYPE_MULTI_VALUE)))
    }

    fn is_field_child_attribute(&self, object_key: i64, field_name: &str) -> Result<bool> {
        Ok(self
            .lock()
            .matching_fields(object_key, field_name)
            .any(|f| f.parent_key.is_some()))
    }

    fn resolve_field_key(&self, object_key: i64, field_name: &str) -> Result<i64> {
        let state = self.lock();
        let mut matches: Vec<&ReconFieldSummary> = state.matching_fields(object_key, field_name).collect();
        // Prefer the top-level field when the name also exists under a group
        matches.sort_by_key(|f| f.parent_key.is_some());
        matches
            .first()
            .map(|f| f.key)
            .ok_or_else(|| ReconError::NotFound(format!("recon field '{}' on object {}", field_name, object_key)))
    }

    fn field_has_mapping(&self, field_key: i64) -> Result<bool> {
        Ok(self.lock().mapped_fields.contains(&field_key))
    }

    fn list_resource_objects(&self) -> Result<Vec<ResourceObjectSummary>> {
        let mut objects = self.lock().objects.clone();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    fn list_fields(&self, object_key: i64) -> Result<Vec<ReconFieldSummary>> {
        let state = self.lock();
        let mut fields: Vec<ReconFieldSummary> = state
            .fields
            .iter()
            .filter(|f| f.object_key == object_key)
            .map(|f| f.field.clone())
            .collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fields)
    }

    fn record_field_added(&self, object_key: i64, record: &ReconciliationFieldRecord) -> Result<i64> {
        Ok(self.add_field(object_key, &record.name, record.field_type.as_str(), record.is_required))
    }

    fn record_field_removed(&self, object_key: i64, field_name: &str) -> Result<()> {
        let mut state = self.lock();
        let removed: Vec<i64> = state
            .matching_fields(object_key, field_name)
            .filter(|f| f.parent_key.is_none())
            .map(|f| f.key)
            .collect();
        if removed.is_empty() {
            return Err(ReconError::NotFound(format!(
                "recon field '{}' on object {}",
                field_name, object_key
            )));
        }
        state.fields.retain(|f| !removed.contains(&f.field.key));
        for key in &removed {
            state.mapped_fields.remove(key);
        }
        debug!("Removed recon field: {} from object {}", field_name, object_key);
        Ok(())
    }
}
