use crate::error::{ReconError, Result};
use crate::storage::MetadataStore;
use crate::types::{ReconFieldSummary, ReconciliationFieldRecord, ResourceObjectSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Mirror of the identity system's resource-object tables: `OBJ` (resource
/// objects), `ORF` (reconciliation fields) and `PRF` (recon field to process
/// form mappings).
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS OBJ (
        OBJ_KEY   INTEGER PRIMARY KEY,
        OBJ_NAME  TEXT NOT NULL,
        OBJ_TYPE  TEXT
    );
    CREATE TABLE IF NOT EXISTS ORF (
        ORF_KEY             INTEGER PRIMARY KEY,
        OBJ_KEY             INTEGER NOT NULL REFERENCES OBJ(OBJ_KEY),
        ORF_FIELDNAME       TEXT NOT NULL,
        ORF_FIELDTYPE       TEXT NOT NULL,
        ORF_REQUIRED        TEXT NOT NULL DEFAULT '0',
        ORF_PARENT_ORF_KEY  INTEGER REFERENCES ORF(ORF_KEY)
    );
    CREATE TABLE IF NOT EXISTS PRF (
        PRF_KEY         INTEGER PRIMARY KEY,
        ORF_KEY         INTEGER NOT NULL REFERENCES ORF(ORF_KEY),
        PRF_COLUMNNAME  TEXT
    );
    CREATE INDEX IF NOT EXISTS ORF_OBJ_FIELDNAME ON ORF (OBJ_KEY, ORF_FIELDNAME);
"#;

/// SQLite-backed metadata store
pub struct SqliteMetadataStore {
    conn: Connection,
}

impl SqliteMetadataStore {
    /// Open (creating if needed) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening metadata store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert_resource_object(&self, name: &str, object_type: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO OBJ (OBJ_NAME, OBJ_TYPE) VALUES (?1, ?2)",
            params![name, object_type],
        )?;
        let key = self.conn.last_insert_rowid();
        debug!("Inserted resource object {} with key {}", name, key);
        Ok(key)
    }

    pub fn insert_field(
        &self,
        object_key: i64,
        parent_key: Option<i64>,
        name: &str,
        field_type: &str,
        is_required: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ORF (OBJ_KEY, ORF_FIELDNAME, ORF_FIELDTYPE, ORF_REQUIRED, ORF_PARENT_ORF_KEY)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![object_key, name, field_type, if is_required { "1" } else { "0" }, parent_key],
        )?;
        let key = self.conn.last_insert_rowid();
        debug!("Inserted recon field {} with key {}", name, key);
        Ok(key)
    }

    pub fn insert_mapping(&self, field_key: i64, column_name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO PRF (ORF_KEY, PRF_COLUMNNAME) VALUES (?1, ?2)",
            params![field_key, column_name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn resource_object_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM OBJ WHERE LOWER(OBJ_NAME) = LOWER(?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count == 1)
    }

    fn resolve_resource_object_key(&self, name: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT OBJ_KEY FROM OBJ WHERE LOWER(OBJ_NAME) = LOWER(?1) ORDER BY OBJ_KEY LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ReconError::ResourceNotFound(name.to_string()))
    }

    fn resolve_resource_object_name(&self, key: i64) -> Result<String> {
        self.conn
            .query_row("SELECT OBJ_NAME FROM OBJ WHERE OBJ_KEY = ?1", params![key], |row| row.get(0))
            .optional()?
            .ok_or_else(|| ReconError::NotFound(format!("resource object key {}", key)))
    }

    fn field_exists(&self, object_key: i64, field_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ORF WHERE OBJ_KEY = ?1 AND ORF_FIELDNAME = ?2",
            params![object_key, field_name],
            |row| row.get(0),
        )?;
        Ok(count >= 1)
    }

    fn is_field_multi_valued(&self, object_key: i64, field_name: &str) -> Result<bool> {
        let field_type: Option<String> = self
            .conn
            .query_row(
                "SELECT ORF_FIELDTYPE FROM ORF WHERE OBJ_KEY = ?1 AND ORF_FIELDNAME = ?2 ORDER BY ORF_KEY LIMIT 1",
                params![object_key, field_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(field_type.map_or(false, |t| {
            t.eq_ignore_ascii_case(crate::constants::RECON_FIELD_TYPE_MULTI_VALUE)
        }))
    }

    fn is_field_child_attribute(&self, object_key: i64, field_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ORF WHERE OBJ_KEY = ?1 AND ORF_PARENT_ORF_KEY IS NOT NULL AND ORF_FIELDNAME = ?2",
            params![object_key, field_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn resolve_field_key(&self, object_key: i64, field_name: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT ORF_KEY FROM ORF WHERE OBJ_KEY = ?1 AND ORF_FIELDNAME = ?2
                 ORDER BY ORF_PARENT_ORF_KEY IS NOT NULL, ORF_KEY LIMIT 1",
                params![object_key, field_name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ReconError::NotFound(format!("recon field '{}' on object {}", field_name, object_key)))
    }

    fn field_has_mapping(&self, field_key: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM PRF WHERE ORF_KEY = ?1",
            params![field_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_resource_objects(&self) -> Result<Vec<ResourceObjectSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT OBJ_KEY, OBJ_TYPE, OBJ_NAME FROM OBJ ORDER BY OBJ_NAME")?;
        let rows = stmt.query_map([], |row| {
            Ok(ResourceObjectSummary {
                key: row.get(0)?,
                object_type: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    fn list_fields(&self, object_key: i64) -> Result<Vec<ReconFieldSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT ORF_KEY, ORF_FIELDNAME, ORF_FIELDTYPE, ORF_REQUIRED, ORF_PARENT_ORF_KEY
             FROM ORF WHERE OBJ_KEY = ?1 ORDER BY ORF_FIELDNAME",
        )?;
        let rows = stmt.query_map(params![object_key], |row| {
            let required: Option<String> = row.get(3)?;
            Ok(ReconFieldSummary {
                key: row.get(0)?,
                name: row.get(1)?,
                field_type: row.get(2)?,
                is_required: required.as_deref() == Some("1"),
                parent_key: row.get(4)?,
            })
        })?;
        let mut fields = Vec::new();
        for row in rows {
            fields.push(row?);
        }
        Ok(fields)
    }

    fn record_field_added(&self, object_key: i64, record: &ReconciliationFieldRecord) -> Result<i64> {
        self.insert_field(
            object_key,
            None,
            &record.name,
            record.field_type.as_str(),
            record.is_required,
        )
    }

    fn record_field_removed(&self, object_key: i64, field_name: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM PRF WHERE ORF_KEY IN (
                 SELECT ORF_KEY FROM ORF
                 WHERE OBJ_KEY = ?1 AND ORF_FIELDNAME = ?2 AND ORF_PARENT_ORF_KEY IS NULL)",
            params![object_key, field_name],
        )?;
        let deleted = self.conn.execute(
            "DELETE FROM ORF WHERE OBJ_KEY = ?1 AND ORF_FIELDNAME = ?2 AND ORF_PARENT_ORF_KEY IS NULL",
            params![object_key, field_name],
        )?;
        if deleted == 0 {
            return Err(ReconError::NotFound(format!(
                "recon field '{}' on object {}",
                field_name, object_key
            )));
        }
        debug!("Deleted recon field {} from object {}", field_name, object_key);
        Ok(())
    }
}
