//! Filesystem-backed transaction service.
//!
//! Layout under the root directory:
//!
//! ```text
//! objects/<resource object>.xml   current document per resource object
//! staging/sha256/ab/cd/<digest>   content-addressed staged imports
//! import.lock                     held while an import is in progress
//! imports.ndjson                  one line per committed import
//! ```

use super::MetadataTransactionService;
use crate::error::{ReconError, Result};
use crate::xml::{MetadataDocument, XmlDocumentEditor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const OBJECTS_DIR: &str = "objects";
const STAGING_DIR: &str = "staging";
const LOCK_FILE: &str = "import.lock";
const IMPORT_LOG: &str = "imports.ndjson";

/// Audit line appended for each committed import
#[derive(Debug, Serialize)]
struct ImportLogEntry<'a> {
    label: &'a str,
    object: &'a str,
    staged_ref: &'a str,
    bytes: usize,
    imported_at: DateTime<Utc>,
}

/// Exclusive import lock; the lock file is removed on drop
struct ImportLock {
    path: PathBuf,
}

impl ImportLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ReconError::transaction(
                    "import",
                    format!("import lock {} is held by another run", path.display()),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "pid={} acquired_at={}", std::process::id(), Utc::now().to_rfc3339())?;
        debug!("Acquired import lock {}", path.display());
        Ok(Self { path })
    }
}

impl Drop for ImportLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release import lock {}: {}", self.path.display(), e);
        }
    }
}

/// Store `bytes` under `root/sha256/<2>/<2>/<digest>`; an existing blob is
/// left as is. Returns the `cas:sha256:` reference.
fn stage_document(root: &Path, bytes: &[u8]) -> Result<String> {
    let digest = hex::encode(Sha256::digest(bytes));
    let dir = root.join("sha256").join(&digest[..2]).join(&digest[2..4]);
    let path = dir.join(&digest);
    if !path.exists() {
        fs::create_dir_all(&dir)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
    }
    Ok(format!("cas:sha256:{}", digest))
}

fn check_object_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name == "." || name == ".." {
        return Err(ReconError::transaction(
            "import",
            format!("resource object name '{}' cannot be stored as a file", name),
        ));
    }
    Ok(())
}

pub struct FsTransactionService {
    root: PathBuf,
    editor: XmlDocumentEditor,
}

impl FsTransactionService {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            editor: XmlDocumentEditor::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR)
    }

    /// Object files whose stem matches `object_name`, ignoring case
    fn find_object_files(&self, object_name: &str) -> Result<Vec<PathBuf>> {
        let dir = self.objects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut matches = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_xml = path.extension().and_then(|e| e.to_str()) == Some("xml");
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map_or(false, |s| s.eq_ignore_ascii_case(object_name));
            if is_xml && stem_matches {
                matches.push(path);
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// Store a document as the current export of its resource object
    pub fn put_object(&self, object_name: &str, xml: &str) -> Result<PathBuf> {
        check_object_name(object_name)?;
        let target = match self.find_object_files(object_name)?.into_iter().next() {
            Some(existing) => existing,
            None => self.objects_dir().join(format!("{}.xml", object_name)),
        };
        fs::create_dir_all(self.objects_dir())?;

        let tmp = target.with_extension("xml.tmp");
        fs::write(&tmp, xml)?;
        fs::rename(&tmp, &target)?;
        Ok(target)
    }

    fn append_log(&self, entry: &ImportLogEntry<'_>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(IMPORT_LOG))?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn import_locked(&self, xml: &str, label: &str) -> Result<()> {
        let staged_ref = stage_document(&self.root.join(STAGING_DIR), xml.as_bytes())?;
        debug!("Staged import {} as {}", label, staged_ref);

        let document = MetadataDocument::parse(xml)?;
        let object_name = self
            .editor
            .resource_name(&document)?
            .ok_or_else(|| ReconError::transaction("import", "document has no resource name"))?;

        let target = self.put_object(&object_name, xml)?;
        self.append_log(&ImportLogEntry {
            label,
            object: &object_name,
            staged_ref: &staged_ref,
            bytes: xml.len(),
            imported_at: Utc::now(),
        })?;
        info!("Committed import {} for {} to {}", label, object_name, target.display());
        Ok(())
    }
}

impl MetadataTransactionService for FsTransactionService {
    fn export_object_xml(&self, object_name: &str) -> Result<String> {
        let matches = self.find_object_files(object_name)?;
        match matches.as_slice() {
            [path] => {
                debug!("Exporting {} from {}", object_name, path.display());
                Ok(fs::read_to_string(path)?)
            }
            [] => Err(ReconError::transaction(
                "export",
                format!("no resource object named '{}' under {}", object_name, self.objects_dir().display()),
            )),
            _ => Err(ReconError::transaction(
                "export",
                "Only one object can be exported at a time",
            )),
        }
    }

    fn submit_import(&self, xml: &str, label: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let _lock = ImportLock::acquire(self.root.join(LOCK_FILE))?;
        self.import_locked(xml, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<xl-ddm-data><Resource name=\"Flat File\"><OBJ_UPDATE>1</OBJ_UPDATE></Resource></xl-ddm-data>";

    #[test]
    fn test_export_reads_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsTransactionService::new(dir.path());
        service.put_object("Flat File", DOC).unwrap();
        assert_eq!(service.export_object_xml("FLAT FILE").unwrap(), DOC);
    }

    #[test]
    fn test_export_missing_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsTransactionService::new(dir.path());
        let err = service.export_object_xml("Flat File").unwrap_err();
        assert!(matches!(err, ReconError::Transaction { ref operation, .. } if operation == "export"));
    }

    #[test]
    fn test_import_stages_commits_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsTransactionService::new(dir.path());
        service.put_object("Flat File", DOC).unwrap();

        let updated = DOC.replace("<OBJ_UPDATE>1", "<OBJ_UPDATE>2");
        service.submit_import(&updated, "CustomReconFieldUtilAdd").unwrap();

        assert_eq!(service.export_object_xml("Flat File").unwrap(), updated);
        assert!(!dir.path().join(LOCK_FILE).exists());

        let log = fs::read_to_string(dir.path().join(IMPORT_LOG)).unwrap();
        let entry: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(entry["label"], "CustomReconFieldUtilAdd");
        assert_eq!(entry["object"], "Flat File");
        let staged = entry["staged_ref"].as_str().unwrap();
        assert!(staged.starts_with("cas:sha256:"));

        let hex = staged.trim_start_matches("cas:sha256:");
        let staged_path = dir
            .path()
            .join(STAGING_DIR)
            .join("sha256")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex);
        assert_eq!(fs::read_to_string(staged_path).unwrap(), updated);
    }

    #[test]
    fn test_staging_same_document_twice_reuses_blob() {
        let dir = tempfile::tempdir().unwrap();
        let first = stage_document(dir.path(), DOC.as_bytes()).unwrap();
        let second = stage_document(dir.path(), DOC.as_bytes()).unwrap();
        assert_eq!(first, second);

        let hex = first.trim_start_matches("cas:sha256:");
        let blob_dir = dir.path().join("sha256").join(&hex[0..2]).join(&hex[2..4]);
        assert_eq!(fs::read_dir(&blob_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_import_fails_while_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsTransactionService::new(dir.path());
        service.put_object("Flat File", DOC).unwrap();
        fs::write(dir.path().join(LOCK_FILE), "held").unwrap();

        let err = service.submit_import(DOC, "label").unwrap_err();
        assert!(err.to_string().contains("held by another run"));
        // The lock belongs to someone else and must survive the failed attempt
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_lock_released_when_import_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = FsTransactionService::new(dir.path());
        assert!(service.submit_import("<not-closed>", "label").is_err());
        assert!(!dir.path().join(LOCK_FILE).exists());
    }
}
