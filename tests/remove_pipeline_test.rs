use recon_fields::db::SqliteMetadataStore;
use recon_fields::error::ReconError;
use recon_fields::pipeline::{PipelineKind, RemovePipeline};
use recon_fields::storage::{InMemoryMetadataStore, MetadataStore};
use recon_fields::transaction::{FsTransactionService, InMemoryTransactionService, MetadataTransactionService};
use recon_fields::validation::RejectReason;
use recon_fields::xml::{MetadataDocument, XmlDocumentEditor};
use std::io::Cursor;

const RESOURCE_XML: &str = include_str!("resources/resource_object.xml");

fn seeded_store() -> InMemoryMetadataStore {
    let store = InMemoryMetadataStore::new();
    let key = store.add_resource_object("Flat File");
    let login = store.add_field(key, "UserLogin", "String", true);
    store.add_field(key, "Email", "String", false);
    let roles = store.add_field(key, "Roles", "Multi-Valued", false);
    store.add_child_field(key, roles, "RoleName", "String");
    store.add_field(key, "Department", "String", false);
    store.add_mapping(login);
    store
}

fn seeded_service() -> InMemoryTransactionService {
    let service = InMemoryTransactionService::new();
    service.put_object("Flat File", RESOURCE_XML);
    service
}

fn field_names(xml: &str) -> Vec<String> {
    let document = MetadataDocument::parse(xml).unwrap();
    XmlDocumentEditor::default().field_names(&document).unwrap()
}

#[test]
fn test_removes_unmapped_fields_in_file_order() {
    let store = seeded_store();
    let service = seeded_service();

    let summary = RemovePipeline::new(&store, &service)
        .run_reader("Flat File", Cursor::new("Department\nEmail\n"))
        .unwrap();

    assert_eq!(summary.pipeline, PipelineKind::Remove);
    assert_eq!(summary.staged, vec!["Department", "Email"]);
    assert!(summary.rejected.is_empty());

    let imports = service.imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].label, "CustomReconFieldUtilRemove");
    assert_eq!(field_names(&imports[0].xml), vec!["UserLogin", "Roles"]);
}

#[test]
fn test_mapped_field_is_kept() {
    let store = seeded_store();
    let service = seeded_service();

    let summary = RemovePipeline::new(&store, &service)
        .run_reader("Flat File", Cursor::new("UserLogin\nEmail\n"))
        .unwrap();

    assert_eq!(summary.staged, vec!["Email"]);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].value, "UserLogin");
    assert_eq!(summary.rejected[0].reason, RejectReason::HasMapping);

    let names = field_names(&service.object_xml("Flat File").unwrap());
    assert!(names.contains(&"UserLogin".to_string()));
    assert!(!names.contains(&"Email".to_string()));
}

#[test]
fn test_multi_valued_only_performs_no_transaction() {
    let store = InMemoryMetadataStore::new();
    let key = store.add_resource_object("Flat File");
    store.add_field(key, "UserLogin", "Multi-Valued", false);
    let service = seeded_service();

    let summary = RemovePipeline::new(&store, &service)
        .run_reader("Flat File", Cursor::new("UserLogin\n"))
        .unwrap();

    assert!(summary.staged.is_empty());
    assert_eq!(summary.rejected[0].reason, RejectReason::MultiValued);
    assert!(!summary.import_submitted);
    assert_eq!(service.export_count(), 0);
    assert!(service.imports().is_empty());
    assert_eq!(service.object_xml("Flat File").as_deref(), Some(RESOURCE_XML));
}

#[test]
fn test_rejections_cover_every_check() {
    let store = seeded_store();
    let service = seeded_service();

    let summary = RemovePipeline::new(&store, &service)
        .run_reader(
            "Flat File",
            Cursor::new("\u{feff}Email\n\nUnknown\r\nRoles\nRoleName\nEmail\nemail\n"),
        )
        .unwrap();

    assert_eq!(summary.staged, vec!["Email"]);
    let reasons: Vec<(usize, RejectReason)> = summary
        .rejected
        .iter()
        .map(|r| (r.line_number, r.reason.clone()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (3, RejectReason::FieldNotFound),
            (4, RejectReason::MultiValued),
            (5, RejectReason::ChildAttribute),
            (6, RejectReason::AlreadyStaged),
            (7, RejectReason::FieldNotFound),
        ]
    );
}

#[test]
fn test_field_missing_from_document_is_fatal() {
    let store = seeded_store();
    let key = store.resolve_resource_object_key("Flat File").unwrap();
    store.add_field(key, "StaleField", "String", false);
    let service = seeded_service();

    let err = RemovePipeline::new(&store, &service)
        .run_reader("Flat File", Cursor::new("StaleField\n"))
        .unwrap_err();
    assert!(matches!(err, ReconError::NotFound(_)));
    assert!(service.imports().is_empty());
}

#[test]
fn test_remove_with_sqlite_store_and_filesystem_service() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteMetadataStore::open(dir.path().join("metadata.db")).unwrap();
    let obj = store.insert_resource_object("Flat File", Some("Application")).unwrap();
    let login = store.insert_field(obj, None, "UserLogin", "String", true).unwrap();
    store.insert_field(obj, None, "Department", "String", false).unwrap();
    store.insert_mapping(login, "UD_FLAT_FIL_USERID").unwrap();

    let service = FsTransactionService::new(dir.path().join("tx"));
    service.put_object("Flat File", RESOURCE_XML).unwrap();

    let input = dir.path().join("remove.txt");
    std::fs::write(&input, "Department\nUserLogin\n").unwrap();

    let summary = RemovePipeline::new(&store, &service).run("FLAT FILE", &input).unwrap();
    assert_eq!(summary.staged, vec!["Department"]);
    assert_eq!(summary.rejected.len(), 1);

    let names = field_names(&service.export_object_xml("Flat File").unwrap());
    assert_eq!(names, vec!["UserLogin", "Email", "Roles"]);
    assert!(!dir.path().join("tx").join("import.lock").exists());
}
