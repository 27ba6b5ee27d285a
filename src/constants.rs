/// Column names accepted in the add-file header (matched case-insensitively)
pub const RECON_FIELD_ATTR_NAME: &str = "ReconFieldName";
pub const RECON_FIELD_ATTR_TYPE: &str = "FieldType";
pub const RECON_FIELD_ATTR_ISREQUIRED: &str = "isRequired";

// Reconciliation field type strings as stored by the identity system
pub const RECON_FIELD_TYPE_STRING: &str = "String";
pub const RECON_FIELD_TYPE_NUMBER: &str = "Number";
pub const RECON_FIELD_TYPE_DATE: &str = "Date";
pub const RECON_FIELD_TYPE_IT_RESOURCE: &str = "IT Resource";
pub const RECON_FIELD_TYPE_MULTI_VALUE: &str = "Multi-Valued";

// Labels recorded with each import, for tracking in the identity system
pub const IMPORT_LABEL_ADD: &str = "CustomReconFieldUtilAdd";
pub const IMPORT_LABEL_REMOVE: &str = "CustomReconFieldUtilRemove";

pub const DEFAULT_DELIMITER: &str = ",";

/// Get all valid add-file header names, in canonical order
pub fn header_names() -> Vec<&'static str> {
    vec![
        RECON_FIELD_ATTR_NAME,
        RECON_FIELD_ATTR_TYPE,
        RECON_FIELD_ATTR_ISREQUIRED,
    ]
}

/// Element and attribute names used in the exported resource-object XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTags {
    pub root: String,
    pub resource: String,
    pub recon_field: String,
    pub field_update: String,
    pub field_type: String,
    pub field_required: String,
    pub object_update: String,
    pub repo_type_attr: String,
    pub name_attr: String,
    pub repo_type: String,
}

impl Default for MetadataTags {
    fn default() -> Self {
        Self {
            root: "xl-ddm-data".to_string(),
            resource: "Resource".to_string(),
            recon_field: "ReconField".to_string(),
            field_update: "ORF_UPDATE".to_string(),
            field_type: "ORF_FIELDTYPE".to_string(),
            field_required: "ORF_REQUIRED".to_string(),
            object_update: "OBJ_UPDATE".to_string(),
            repo_type_attr: "repo-type".to_string(),
            name_attr: "name".to_string(),
            repo_type: "RDBMS".to_string(),
        }
    }
}
