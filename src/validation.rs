//! Row-level validation for add and remove batches.
//!
//! A failed check never aborts the run: the row is dropped, a warning is
//! logged and a [`RejectedRow`] is recorded. Only store failures propagate.

use crate::error::{ReconError, Result};
use crate::metrics;
use crate::parser::{AddFileReader, Header, HeaderColumn, NameLine, RawRow, RemoveFileReader};
use crate::storage::MetadataStore;
use crate::types::{ReconFieldType, ReconciliationFieldRecord, ResourceObjectHandle};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    RowSize { expected: usize, found: usize },
    FieldExists,
    DuplicateInBatch,
    UnsupportedType { value: String },
    InvalidType { value: String },
    InvalidRequiredFlag { value: String },
    FieldNotFound,
    MultiValued,
    ChildAttribute,
    AlreadyStaged,
    HasMapping,
}

impl RejectReason {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::RowSize { .. } => "row_size",
            RejectReason::FieldExists => "field_exists",
            RejectReason::DuplicateInBatch => "duplicate_in_batch",
            RejectReason::UnsupportedType { .. } => "unsupported_type",
            RejectReason::InvalidType { .. } => "invalid_type",
            RejectReason::InvalidRequiredFlag { .. } => "invalid_required_flag",
            RejectReason::FieldNotFound => "field_not_found",
            RejectReason::MultiValued => "multi_valued",
            RejectReason::ChildAttribute => "child_attribute",
            RejectReason::AlreadyStaged => "already_staged",
            RejectReason::HasMapping => "has_mapping",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RowSize { expected, found } => {
                write!(f, "Size of row is invalid ({} tokens, expected {})", found, expected)
            }
            RejectReason::FieldExists => write!(f, "Recon field already exists"),
            RejectReason::DuplicateInBatch => write!(f, "Recon field exists in staging"),
            RejectReason::UnsupportedType { value } => write!(f, "Field type '{}' is not supported", value),
            RejectReason::InvalidType { value } => write!(f, "Field type '{}' is not valid", value),
            RejectReason::InvalidRequiredFlag { value } => write!(f, "isRequired value '{}' is not valid", value),
            RejectReason::FieldNotFound => write!(f, "Recon field does not exist"),
            RejectReason::MultiValued => write!(f, "Recon field is a multivalued attribute"),
            RejectReason::ChildAttribute => write!(f, "Recon field is a child attribute"),
            RejectReason::AlreadyStaged => write!(f, "Recon field exists in staging"),
            RejectReason::HasMapping => write!(f, "Recon field cannot be removed until its mapping is removed"),
        }
    }
}

/// A line dropped during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub line_number: usize,
    /// Raw line for add files, field name for remove files
    pub value: String,
    pub reason: RejectReason,
}

/// Outcome of validating an add file
#[derive(Debug, Default)]
pub struct AddValidation {
    pub records: Vec<ReconciliationFieldRecord>,
    pub rejected: Vec<RejectedRow>,
    pub rows_read: usize,
}

/// Outcome of validating a remove file
#[derive(Debug, Default)]
pub struct RemoveValidation {
    pub staged: Vec<String>,
    pub rejected: Vec<RejectedRow>,
    pub rows_read: usize,
}

/// `isRequired` token: "1" is true, "0" or empty is false
pub fn parse_required_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" | "" => Some(false),
        _ => None,
    }
}

/// Validates add-file rows against the batch seen so far and the store
pub struct AddFieldValidator<'a, S: MetadataStore + ?Sized> {
    store: &'a S,
    object: &'a ResourceObjectHandle,
    staged_names: HashSet<String>,
}

impl<'a, S: MetadataStore + ?Sized> AddFieldValidator<'a, S> {
    pub fn new(store: &'a S, object: &'a ResourceObjectHandle) -> Self {
        Self {
            store,
            object,
            staged_names: HashSet::new(),
        }
    }

    /// Validate one row, columns in header order, stopping at the first
    /// failed check. `Ok(Err(_))` is a row-level rejection.
    pub fn validate_row(
        &mut self,
        header: &Header,
        row: &RawRow,
    ) -> Result<std::result::Result<ReconciliationFieldRecord, RejectReason>> {
        let mut name = None;
        let mut field_type = None;
        let mut is_required = false;

        for (column, token) in header.columns().iter().zip(&row.tokens) {
            match column {
                HeaderColumn::ReconFieldName => {
                    if self.store.field_exists(self.object.key, token)? {
                        return Ok(Err(RejectReason::FieldExists));
                    }
                    // Registered as soon as the name passes, even if a later column fails
                    if !self.staged_names.insert(token.clone()) {
                        return Ok(Err(RejectReason::DuplicateInBatch));
                    }
                    name = Some(token.clone());
                }
                HeaderColumn::FieldType => match ReconFieldType::parse(token) {
                    Some(ReconFieldType::MultiValued) => {
                        return Ok(Err(RejectReason::UnsupportedType { value: token.clone() }))
                    }
                    Some(parsed) => field_type = Some(parsed),
                    None => return Ok(Err(RejectReason::InvalidType { value: token.clone() })),
                },
                HeaderColumn::IsRequired => match parse_required_flag(token) {
                    Some(flag) => is_required = flag,
                    None => {
                        return Ok(Err(RejectReason::InvalidRequiredFlag { value: token.clone() }))
                    }
                },
            }
        }

        match (name, field_type) {
            (Some(name), Some(field_type)) => Ok(Ok(ReconciliationFieldRecord {
                name,
                field_type,
                is_required,
            })),
            _ => Err(ReconError::BadFormat(format!(
                "Line {} does not carry both a field name and a field type",
                row.line_number
            ))),
        }
    }

    /// Drain the reader and validate every row
    pub fn validate_all<R: BufRead>(mut self, reader: &mut AddFileReader<R>) -> Result<AddValidation> {
        let header = reader.header().clone();
        let mut outcome = AddValidation::default();

        for row in reader.by_ref() {
            let row = row?;
            outcome.rows_read += 1;
            match self.validate_row(&header, &row)? {
                Ok(record) => {
                    debug!("Line = {} : staged {:?}", row.line_number, record);
                    metrics::record_row_accepted(metrics::PIPELINE_ADD);
                    outcome.records.push(record);
                }
                Err(reason) => {
                    warn!(
                        "[Warning] Line = {} : {}. Field will not be added: {}",
                        row.line_number, reason, row.line
                    );
                    metrics::record_row_rejected(metrics::PIPELINE_ADD, reason.label());
                    outcome.rejected.push(RejectedRow {
                        line_number: row.line_number,
                        value: row.line,
                        reason,
                    });
                }
            }
        }

        for skipped in reader.take_skipped() {
            outcome.rows_read += 1;
            let reason = RejectReason::RowSize {
                expected: skipped.expected_tokens,
                found: skipped.found_tokens,
            };
            metrics::record_row_rejected(metrics::PIPELINE_ADD, reason.label());
            outcome.rejected.push(RejectedRow {
                line_number: skipped.line_number,
                value: skipped.line,
                reason,
            });
        }
        outcome.rejected.sort_by_key(|r| r.line_number);
        Ok(outcome)
    }
}

/// Validates remove-file names against the store and the names staged so far
pub struct RemoveFieldValidator<'a, S: MetadataStore + ?Sized> {
    store: &'a S,
    object: &'a ResourceObjectHandle,
    staged: Vec<String>,
    staged_names: HashSet<String>,
}

impl<'a, S: MetadataStore + ?Sized> RemoveFieldValidator<'a, S> {
    pub fn new(store: &'a S, object: &'a ResourceObjectHandle) -> Self {
        Self {
            store,
            object,
            staged: Vec::new(),
            staged_names: HashSet::new(),
        }
    }

    /// Run every removal check for one name; stage it when all pass
    pub fn validate_name(&mut self, name: &str) -> Result<std::result::Result<(), RejectReason>> {
        let key = self.object.key;
        if !self.store.field_exists(key, name)? {
            return Ok(Err(RejectReason::FieldNotFound));
        }
        if self.store.is_field_multi_valued(key, name)? {
            return Ok(Err(RejectReason::MultiValued));
        }
        if self.store.is_field_child_attribute(key, name)? {
            return Ok(Err(RejectReason::ChildAttribute));
        }
        if self.staged_names.contains(name) {
            return Ok(Err(RejectReason::AlreadyStaged));
        }
        let field_key = self.store.resolve_field_key(key, name)?;
        if self.store.field_has_mapping(field_key)? {
            return Ok(Err(RejectReason::HasMapping));
        }

        self.staged_names.insert(name.to_string());
        self.staged.push(name.to_string());
        Ok(Ok(()))
    }

    pub fn validate_all<R: BufRead>(mut self, reader: RemoveFileReader<R>) -> Result<RemoveValidation> {
        let mut rejected = Vec::new();
        let mut rows_read = 0;

        for line in reader {
            let NameLine { line_number, name } = line?;
            rows_read += 1;
            match self.validate_name(&name)? {
                Ok(()) => {
                    debug!("Line = {} : staged '{}' for removal", line_number, name);
                    metrics::record_row_accepted(metrics::PIPELINE_REMOVE);
                }
                Err(reason) => {
                    warn!("[Warning] Line = {} : Recon Field '{}': {}", line_number, name, reason);
                    metrics::record_row_rejected(metrics::PIPELINE_REMOVE, reason.label());
                    rejected.push(RejectedRow {
                        line_number,
                        value: name,
                        reason,
                    });
                }
            }
        }

        Ok(RemoveValidation {
            staged: self.staged,
            rejected,
            rows_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryMetadataStore;
    use std::io::Cursor;

    fn fixture() -> (InMemoryMetadataStore, ResourceObjectHandle) {
        let store = InMemoryMetadataStore::new();
        let key = store.add_resource_object("Flat File");
        let login = store.add_field(key, "UserLogin", "String", true);
        store.add_field(key, "Email", "String", false);
        let roles = store.add_field(key, "Roles", "Multi-Valued", false);
        store.add_child_field(key, roles, "RoleName", "String");
        store.add_mapping(login);
        (
            store,
            ResourceObjectHandle {
                key,
                name: "Flat File".to_string(),
            },
        )
    }

    fn validate_add(store: &InMemoryMetadataStore, object: &ResourceObjectHandle, content: &str) -> AddValidation {
        let mut reader = AddFileReader::new(Cursor::new(content), ",").unwrap();
        AddFieldValidator::new(store, object).validate_all(&mut reader).unwrap()
    }

    fn reasons(rejected: &[RejectedRow]) -> Vec<(usize, &str)> {
        rejected.iter().map(|r| (r.line_number, r.reason.label())).collect()
    }

    #[test]
    fn test_valid_row_yields_record() {
        let (store, object) = fixture();
        let outcome = validate_add(&store, &object, "ReconFieldName,FieldType,isRequired\nPhone,String,1\n");
        assert_eq!(
            outcome.records,
            vec![ReconciliationFieldRecord {
                name: "Phone".to_string(),
                field_type: ReconFieldType::String,
                is_required: true,
            }]
        );
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.rows_read, 1);
    }

    #[test]
    fn test_required_flag_defaults_when_column_absent() {
        let (store, object) = fixture();
        let outcome = validate_add(&store, &object, "FieldType,ReconFieldName\nnumber,Age\n");
        assert_eq!(outcome.records[0].field_type, ReconFieldType::Number);
        assert!(!outcome.records[0].is_required);
    }

    #[test]
    fn test_required_flag_values() {
        assert_eq!(parse_required_flag("1"), Some(true));
        assert_eq!(parse_required_flag("0"), Some(false));
        assert_eq!(parse_required_flag(""), Some(false));
        assert_eq!(parse_required_flag("true"), None);
        assert_eq!(parse_required_flag("2"), None);
    }

    #[test]
    fn test_row_level_rejections() {
        let (store, object) = fixture();
        let outcome = validate_add(
            &store,
            &object,
            "ReconFieldName,FieldType,isRequired\n\
             UserLogin,String,1\n\
             Phone,Multi-Valued,0\n\
             Fax,Boolean,0\n\
             Pager,String,yes\n\
             Short,String\n\
             Title,Date,\n",
        );

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].name, "Title");
        assert_eq!(outcome.records[0].field_type, ReconFieldType::Date);
        assert!(!outcome.records[0].is_required);
        assert_eq!(
            reasons(&outcome.rejected),
            vec![
                (2, "field_exists"),
                (3, "unsupported_type"),
                (4, "invalid_type"),
                (5, "invalid_required_flag"),
                (6, "row_size"),
            ]
        );
        assert_eq!(outcome.rows_read, 6);
    }

    #[test]
    fn test_duplicate_in_batch_drops_second_occurrence() {
        let (store, object) = fixture();
        let outcome = validate_add(
            &store,
            &object,
            "ReconFieldName,FieldType\nPhone,String\nPhone,Number\nphone,Number\n",
        );
        let names: Vec<&str> = outcome.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Phone", "phone"]);
        assert_eq!(outcome.records[0].field_type, ReconFieldType::String);
        assert_eq!(reasons(&outcome.rejected), vec![(3, "duplicate_in_batch")]);
    }

    #[test]
    fn test_existing_child_attribute_name_is_rejected_for_add() {
        let (store, object) = fixture();
        let outcome = validate_add(&store, &object, "ReconFieldName,FieldType\nRoleName,String\n");
        assert!(outcome.records.is_empty());
        assert_eq!(reasons(&outcome.rejected), vec![(2, "field_exists")]);
    }

    fn validate_remove(store: &InMemoryMetadataStore, object: &ResourceObjectHandle, content: &str) -> RemoveValidation {
        RemoveFieldValidator::new(store, object)
            .validate_all(RemoveFileReader::new(Cursor::new(content)))
            .unwrap()
    }

    #[test]
    fn test_remove_checks() {
        let (store, object) = fixture();
        let outcome = validate_remove(
            &store,
            &object,
            "Email\nMissing\nRoles\nRoleName\nEmail\nUserLogin\n",
        );
        assert_eq!(outcome.staged, vec!["Email"]);
        assert_eq!(
            reasons(&outcome.rejected),
            vec![
                (2, "field_not_found"),
                (3, "multi_valued"),
                (4, "child_attribute"),
                (5, "already_staged"),
                (6, "has_mapping"),
            ]
        );
        assert_eq!(outcome.rows_read, 6);
    }

    #[test]
    fn test_remove_rechecks_store_for_each_name() {
        let (store, object) = fixture();
        let mut validator = RemoveFieldValidator::new(&store, &object);
        let email = store.resolve_field_key(object.key, "Email").unwrap();
        store.add_mapping(email);
        assert_eq!(validator.validate_name("Email").unwrap(), Err(RejectReason::HasMapping));
    }
}
