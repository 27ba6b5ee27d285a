use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reconciliation field types known to the identity system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconFieldType {
    String,
    Number,
    Date,
    ItResource,
    /// Known to the system but not supported for add
    MultiValued,
}

impl ReconFieldType {
    pub const ALL: [ReconFieldType; 5] = [
        ReconFieldType::String,
        ReconFieldType::Number,
        ReconFieldType::Date,
        ReconFieldType::ItResource,
        ReconFieldType::MultiValued,
    ];

    /// Parse a type string, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconFieldType::String => RECON_FIELD_TYPE_STRING,
            ReconFieldType::Number => RECON_FIELD_TYPE_NUMBER,
            ReconFieldType::Date => RECON_FIELD_TYPE_DATE,
            ReconFieldType::ItResource => RECON_FIELD_TYPE_IT_RESOURCE,
            ReconFieldType::MultiValued => RECON_FIELD_TYPE_MULTI_VALUE,
        }
    }
}

impl fmt::Display for ReconFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated reconciliation field read from an add file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationFieldRecord {
    pub name: String,
    pub field_type: ReconFieldType,
    pub is_required: bool,
}

/// Resource object resolved from the metadata store at the start of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceObjectHandle {
    pub key: i64,
    pub name: String,
}

/// Row of the resource object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceObjectSummary {
    pub key: i64,
    pub object_type: Option<String>,
    pub name: String,
}

/// A reconciliation field as stored on a resource object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconFieldSummary {
    pub key: i64,
    pub name: String,
    pub field_type: String,
    pub is_required: bool,
    /// Set for child attributes of a multi-valued field
    pub parent_key: Option<i64>,
}

impl ReconFieldSummary {
    pub fn is_multi_valued(&self) -> bool {
        self.field_type.eq_ignore_ascii_case(RECON_FIELD_TYPE_MULTI_VALUE)
    }

    pub fn is_child_attribute(&self) -> bool {
        self.parent_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_type_ignores_case() {
        assert_eq!(ReconFieldType::parse("string"), Some(ReconFieldType::String));
        assert_eq!(ReconFieldType::parse("it resource"), Some(ReconFieldType::ItResource));
        assert_eq!(ReconFieldType::parse("MULTI-VALUED"), Some(ReconFieldType::MultiValued));
        assert_eq!(ReconFieldType::parse("Boolean"), None);
        assert_eq!(ReconFieldType::parse(""), None);
    }

    #[test]
    fn test_field_type_display_uses_canonical_name() {
        assert_eq!(ReconFieldType::ItResource.to_string(), "IT Resource");
        assert_eq!(ReconFieldType::parse("date").unwrap().to_string(), "Date");
    }
}
