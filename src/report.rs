//! Export of a resource object's single-valued fields as an add file,
//! plus the listing helpers behind `list-objects` and `list-fields`.

use crate::constants::{
    DEFAULT_DELIMITER, RECON_FIELD_ATTR_ISREQUIRED, RECON_FIELD_ATTR_NAME, RECON_FIELD_ATTR_TYPE,
};
use crate::error::{ReconError, Result};
use crate::pipeline::resolve_resource_object;
use crate::storage::MetadataStore;
use crate::types::{ReconFieldSummary, ResourceObjectHandle, ResourceObjectSummary};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub object: ResourceObjectHandle,
    pub output: PathBuf,
    pub fields_written: usize,
}

/// Fields that belong in an add file: top-level and not multi-valued,
/// sorted by name
pub fn exportable_fields(mut fields: Vec<ReconFieldSummary>) -> Vec<ReconFieldSummary> {
    fields.retain(|f| !f.is_child_attribute() && !f.is_multi_valued());
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

/// Write the header and one row per field
pub fn write_fields<W: Write>(writer: &mut W, fields: &[ReconFieldSummary], delimiter: &str) -> Result<()> {
    writeln!(
        writer,
        "{}{d}{}{d}{}",
        RECON_FIELD_ATTR_NAME,
        RECON_FIELD_ATTR_TYPE,
        RECON_FIELD_ATTR_ISREQUIRED,
        d = delimiter
    )?;
    for field in fields {
        writeln!(
            writer,
            "{}{d}{}{d}{}",
            field.name,
            field.field_type,
            if field.is_required { "1" } else { "0" },
            d = delimiter
        )?;
    }
    Ok(())
}

#[instrument(skip(store))]
pub fn export_report<S: MetadataStore + ?Sized>(
    store: &S,
    object_name: &str,
    output: &Path,
    delimiter: Option<&str>,
) -> Result<ExportSummary> {
    let delimiter = delimiter.unwrap_or(DEFAULT_DELIMITER);
    if delimiter.is_empty() {
        return Err(ReconError::Config("delimiter must not be empty".to_string()));
    }

    let object = resolve_resource_object(store, object_name)?;
    let fields = exportable_fields(store.list_fields(object.key)?);

    let mut writer = BufWriter::new(File::create(output)?);
    write_fields(&mut writer, &fields, delimiter)?;
    writer.flush()?;

    info!("Wrote {} recon fields of {} to {}", fields.len(), object.name, output.display());
    Ok(ExportSummary {
        object,
        output: output.to_path_buf(),
        fields_written: fields.len(),
    })
}

pub fn list_objects<S: MetadataStore + ?Sized>(store: &S) -> Result<Vec<ResourceObjectSummary>> {
    store.list_resource_objects()
}

pub fn list_object_fields<S: MetadataStore + ?Sized>(
    store: &S,
    object_name: &str,
) -> Result<(ResourceObjectHandle, Vec<ReconFieldSummary>)> {
    let object = resolve_resource_object(store, object_name)?;
    let fields = store.list_fields(object.key)?;
    Ok((object, fields))
}
