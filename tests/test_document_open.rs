//! Opening documents: index loading, validation, recovery and resolution.

mod common;

use common::{FileBuilder, init_logging, simple_file, strip_startxref};
use pdf_kernel::xref::XRefEntry;
use pdf_kernel::{Document, Error, Object, ObjectRef, ParserOptions};
use std::sync::Arc;

// ============================================================================
// Clean files
// ============================================================================

#[test]
fn test_clean_table_is_not_recovered() {
    init_logging();
    let mut doc = Document::from_bytes(simple_file()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.version(), (1, 7));
    assert_eq!(doc.size(), 3);
    assert_eq!(doc.stats().recoveries, 0);

    let catalog = doc.catalog().unwrap();
    assert!(catalog.has_type("Catalog"));
    let pages = doc.get_from_dict(catalog.as_dict().unwrap(), "Pages");
    assert!(pages.has_type("Pages"));
}

#[test]
fn test_clean_stream_index_is_not_recovered() {
    init_logging();
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    b.xref_stream(3, "/Root 1 0 R");
    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert!(doc.catalog().unwrap().has_type("Catalog"));
    // stream-only keys do not leak into the trailer
    assert!(doc.trailer().get("W").is_none());
    assert!(doc.trailer().get("Type").is_none());
}

#[test]
fn test_repeated_resolution_returns_same_instance() {
    let mut doc = Document::from_bytes(simple_file()).unwrap();
    let first = doc.get_object_by_number(2, 0).unwrap();
    let second = doc.get_object_by_number(2, 0).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let third = doc.resolve(ObjectRef::new(2, 0));
    assert!(Arc::ptr_eq(&first, &third));
}

#[test]
fn test_free_and_absent_resolve_to_null() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").free(2, 0, 1);
    b.xref_table("/Root 1 0 R");
    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(doc.resolve(ObjectRef::new(2, 0)).is_null());
    assert!(doc.resolve(ObjectRef::new(2, 1)).is_null());
    assert!(doc.resolve(ObjectRef::new(77, 0)).is_null());
    // wrong generation of a live object
    assert!(doc.resolve(ObjectRef::new(1, 3)).is_null());

    let free = doc.resolve(ObjectRef::new(2, 0));
    assert!(Arc::ptr_eq(&free, &doc.resolve(ObjectRef::new(2, 0))));
    let absent = doc.resolve(ObjectRef::new(77, 0));
    assert!(Arc::ptr_eq(&absent, &doc.resolve(ObjectRef::new(77, 0))));
}

#[test]
fn test_long_reference_chain() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Start 2 0 R >>");
    for n in 2..102u32 {
        b.object(n, &format!("{} 0 R", n + 1));
    }
    b.object(102, "(end of chain)");
    b.xref_table("/Root 1 0 R");
    let mut doc = Document::from_bytes(b.build()).unwrap();

    let end = doc.dereference(&Object::reference(2, 0));
    assert_eq!(end.as_string().map(|s| s.as_bytes().to_vec()), Some(b"end of chain".to_vec()));
}

#[test]
fn test_reference_chain_limit() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>");
    for n in 2..12u32 {
        b.object(n, &format!("{} 0 R", n + 1));
    }
    b.object(12, "42");
    b.xref_table("/Root 1 0 R");
    let data = b.build();

    let mut doc = Document::from_bytes(data.clone()).unwrap();
    assert_eq!(doc.dereference(&Object::reference(2, 0)).as_integer(), Some(42));

    let mut options = ParserOptions::default();
    options.max_reference_chain = 3;
    let mut limited = Document::from_bytes_with_options(data, options).unwrap();
    assert!(limited.dereference(&Object::reference(2, 0)).is_null());
}

// ============================================================================
// Incremental updates
// ============================================================================

#[test]
fn test_newer_section_wins() {
    init_logging();
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Count 0 >>")
        .object(3, "(original)");
    b.xref_table("/Root 1 0 R");
    b.object(3, "(updated)").object(4, "(added)");
    b.xref_table("/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.size(), 5);
    let three = doc.resolve(ObjectRef::new(3, 0));
    assert_eq!(three.as_string().unwrap().as_bytes(), b"updated");
    let four = doc.resolve(ObjectRef::new(4, 0));
    assert_eq!(four.as_string().unwrap().as_bytes(), b"added");
    assert!(doc.trailer().get("Prev").is_none());
}

#[test]
fn test_deleted_in_update_is_free() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").object(2, "(doomed)");
    b.xref_table("/Root 1 0 R");
    b.free(2, 0, 1);
    b.xref_table("/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert!(doc.resolve(ObjectRef::new(2, 0)).is_null());
    assert!(doc.xref().get(2).unwrap().is_free());
}

#[test]
fn test_table_update_over_stream_index() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").object(2, "1");
    b.xref_stream(3, "/Root 1 0 R");
    b.object(2, "2");
    b.xref_table("/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.resolve(ObjectRef::new(2, 0)).as_integer(), Some(2));
}

// ============================================================================
// Hybrid files and chain limits
// ============================================================================

#[test]
fn test_hybrid_file_resolves_streamed_members() {
    init_logging();
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object_stream(6, &[(5, "<< /Hybrid true >>")], true);
    b.hybrid_table(7, "/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.xref().get(5), Some(&XRefEntry::Compressed { stream_number: 6, index: 0 }));
    let five = doc.resolve(ObjectRef::new(5, 0));
    assert_eq!(five.as_dict().and_then(|d| d.get("Hybrid")).and_then(Object::as_bool), Some(true));
    assert!(doc.trailer().get("XRefStm").is_none());
}

#[test]
fn test_table_entry_outranks_its_stream() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>")
        .object_stream(6, &[(5, "<< /Hybrid true >>")], false)
        .object(5, "<< /Direct true >>")
        .hybrid_compressed(5, 6, 0);
    b.hybrid_table(7, "/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    assert!(matches!(doc.xref().get(5), Some(XRefEntry::InUse { .. })));
    let five = doc.resolve(ObjectRef::new(5, 0));
    assert_eq!(five.as_dict().and_then(|d| d.get("Direct")).and_then(Object::as_bool), Some(true));
}

#[test]
fn test_stream_outranks_older_sections() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").object(5, "(first revision)");
    b.xref_table("/Root 1 0 R");
    b.object_stream(6, &[(5, "(second revision)")], false);
    b.hybrid_table(7, "/Root 1 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(!doc.is_recovered());
    let five = doc.resolve(ObjectRef::new(5, 0));
    assert_eq!(five.as_string().unwrap().as_bytes(), b"second revision");
}

/// Three chained sections; object 2 is defined only in the oldest.
fn three_sections() -> Vec<u8> {
    let mut b = FileBuilder::new();
    b.object(2, "(oldest)");
    b.xref_table("");
    b.object(1, "<< /Type /Catalog >>");
    b.xref_table("/Root 1 0 R");
    b.object(3, "(newest)");
    b.xref_table("/Root 1 0 R");
    b.build()
}

#[test]
fn test_section_limit_stops_the_chain() {
    let mut doc = Document::from_bytes(three_sections()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.resolve(ObjectRef::new(2, 0)).as_string().unwrap().as_bytes(), b"oldest");

    let mut options = ParserOptions::default();
    options.max_xref_sections = 2;
    let mut limited = Document::from_bytes_with_options(three_sections(), options).unwrap();
    assert!(!limited.is_recovered());
    assert!(limited.xref().get(2).is_none());
    assert!(limited.resolve(ObjectRef::new(2, 0)).is_null());
    assert_eq!(limited.resolve(ObjectRef::new(3, 0)).as_string().unwrap().as_bytes(), b"newest");
    assert!(limited.catalog().unwrap().has_type("Catalog"));
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_wrong_offsets_recover_every_object() {
    init_logging();
    let mut b = FileBuilder::new();
    b.shift_offsets(7);
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R >>")
        .object(4, "<< /Producer (fixture) >>");
    b.xref_table("/Root 1 0 R /Info 4 0 R");

    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.stats().recoveries, 1);
    assert!(doc.catalog().unwrap().has_type("Catalog"));
    for n in 1..=4 {
        assert!(!doc.resolve(ObjectRef::new(n, 0)).is_null(), "object {} lost", n);
    }
    assert!(doc.resolve(ObjectRef::new(3, 0)).has_type("Page"));
}

#[test]
fn test_offset_validation_can_be_disabled() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>");
    b.xref_table("/Root 1 0 R");
    // the update section points object 2 five bytes past its header
    b.shift_offsets(5);
    b.object(2, "(two)");
    b.xref_table("/Root 1 0 R");
    let data = b.build();

    let validated = Document::from_bytes(data.clone()).unwrap();
    assert!(validated.is_recovered());

    let options = ParserOptions::default().with_offset_validation(false);
    let mut unvalidated = Document::from_bytes_with_options(data, options).unwrap();
    assert!(!unvalidated.is_recovered());
    assert!(unvalidated.resolve(ObjectRef::new(2, 0)).is_null());
}

#[test]
fn test_missing_startxref_recovers() {
    init_logging();
    let data = strip_startxref(simple_file());
    let mut doc = Document::from_bytes(data).unwrap();
    assert!(doc.is_recovered());
    assert!(doc.catalog().unwrap().has_type("Catalog"));
    assert_eq!(doc.trailer().get_reference("Root"), Some(ObjectRef::new(1, 0)));
}

#[test]
fn test_no_trailer_rebuilds_root_and_info() {
    init_logging();
    let mut b = FileBuilder::new();
    b.object(1, "<< /Title (Report) /Producer (fixture) >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /Type /Catalog /Pages 2 0 R >>");
    let mut doc = Document::from_bytes(b.build()).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.trailer().get_reference("Root"), Some(ObjectRef::new(3, 0)));
    assert_eq!(doc.trailer().get_reference("Info"), Some(ObjectRef::new(1, 0)));
    assert_eq!(doc.trailer().get_integer("Size"), Some(4));
    assert!(doc.catalog().unwrap().has_type("Catalog"));
}

#[test]
fn test_recovery_ignores_huge_object_numbers() {
    let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n8388607 0 obj\nnull\nendobj\n";
    let mut doc = Document::from_bytes(data.to_vec()).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.size(), 2);
    assert_eq!(doc.xref().len(), 1);
    assert_eq!(doc.add_indirect_object(Object::Integer(1)), ObjectRef::new(2, 0));
}

#[test]
fn test_recovery_later_definition_wins() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").object(2, "(first)");
    b.unlisted_object(2, "(second)");
    b.xref_table("/Root 1 0 R");
    let data = strip_startxref(b.build());
    let mut doc = Document::from_bytes(data).unwrap();
    assert!(doc.is_recovered());
    let two = doc.resolve(ObjectRef::new(2, 0));
    assert_eq!(two.as_string().unwrap().as_bytes(), b"second");
}

#[test]
fn test_root_of_wrong_type_recovers() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Count 0 >>");
    b.xref_table("/Root 2 0 R");
    let doc = Document::from_bytes(b.build()).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.trailer().get_reference("Root"), Some(ObjectRef::new(1, 0)));
}

#[test]
fn test_unrecoverable_file_fails() {
    let result = Document::from_bytes(b"%PDF-1.7\nthis is not a document\n".to_vec());
    assert!(matches!(result, Err(Error::UnresolvableRoot)));
}

#[test]
fn test_encrypt_and_id_survive_recovery() {
    let mut b = FileBuilder::new();
    b.shift_offsets(3);
    b.object(1, "<< /Type /Catalog >>")
        .object(2, "<< /Filter /Standard /V 1 /R 2 >>");
    b.xref_table("/Root 1 0 R /Encrypt 2 0 R /ID [<0102> <0304>]");
    let doc = Document::from_bytes(b.build()).unwrap();
    assert!(doc.is_recovered());
    assert!(doc.is_encrypted());
    assert_eq!(doc.trailer().get_reference("Encrypt"), Some(ObjectRef::new(2, 0)));
    assert!(doc.trailer().get_array("ID").is_some());
}

#[test]
fn test_garbage_before_header() {
    let mut data = b"garbage garbage\n".to_vec();
    data.extend_from_slice(&simple_file());
    // offsets in the table are now off by the prefix, so recovery takes over
    let mut doc = Document::from_bytes(data).unwrap();
    assert_eq!(doc.version(), (1, 7));
    assert!(doc.is_recovered());
    assert!(doc.catalog().unwrap().has_type("Catalog"));
}

// ============================================================================
// Strict mode
// ============================================================================

#[test]
fn test_strict_mode_surfaces_damage() {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog >>").object(2, "<< /Broken ]");
    b.xref_table("/Root 1 0 R");
    let data = b.build();

    let mut lenient = Document::from_bytes(data.clone()).unwrap();
    assert!(lenient.get_object_by_number(2, 0).unwrap().is_null());

    let mut strict = Document::from_bytes_with_options(data, ParserOptions::strict()).unwrap();
    assert!(strict.get_object_by_number(2, 0).is_err());
    assert!(strict.resolve(ObjectRef::new(2, 0)).is_null());
}

// ============================================================================
// File-backed documents
// ============================================================================

#[test]
fn test_open_file_and_close() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simple.pdf");
    std::fs::write(&path, simple_file()).unwrap();

    let mut doc = Document::open(&path).unwrap();
    assert!(doc.catalog().unwrap().has_type("Catalog"));
    doc.close();
    assert!(doc.is_closed());
    assert!(matches!(doc.get_object_by_number(1, 0), Err(Error::DocumentClosed)));
    assert!(matches!(doc.catalog(), Err(Error::DocumentClosed)));
    drop(doc);
    dir.close().unwrap();
}

#[test]
fn test_open_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Document::open(dir.path().join("absent.pdf"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_from_reader() {
    let cursor = std::io::Cursor::new(simple_file());
    let mut doc = Document::from_reader(cursor).unwrap();
    assert!(doc.catalog().unwrap().has_type("Catalog"));
}
