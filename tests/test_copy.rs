//! Copying object graphs between parsed documents.

mod common;

use common::{FileBuilder, init_logging};
use pdf_kernel::{
    CopyOptions, Dictionary, Document, DocumentWriter, Error, Object, ObjectRef, copy_handle_to,
};

/// A page tree with a parent/child cycle and a resource shared by two pages.
fn source_file() -> Vec<u8> {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Resources 5 0 R /Contents 6 0 R >>")
        .object(4, "<< /Type /Page /Parent 2 0 R /Resources 5 0 R /Back 1 0 R >>")
        .object(5, "<< /Font << /F1 7 0 R >> >>")
        .stream(6, "", b"BT /F1 12 Tf (hi) Tj ET")
        .object(7, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
        .free(8, 0, 1);
    b.xref_table("/Root 1 0 R");
    b.build()
}

fn target_with_root() -> Document {
    let mut target = Document::new();
    let root = target.add_indirect_object(Object::Dictionary(
        [("Type".to_string(), Object::name("Catalog"))].into_iter().collect(),
    ));
    target.trailer_mut().insert("Root", Object::Reference(root));
    target
}

fn dict_of(doc: &mut Document, value: &Object) -> Dictionary {
    doc.dereference(value).as_dict().cloned().unwrap()
}

#[test]
fn test_copy_page_tree_with_cycle() {
    init_logging();
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    let before = target.size();

    let copied = source
        .copy_object_to(&Object::reference(2, 0), &mut target, &CopyOptions::default())
        .unwrap();
    let pages_ref = copied.as_reference().unwrap();

    // pages, two pages, resources, contents, font
    assert_eq!(target.size(), before + 6);

    let pages = dict_of(&mut target, &copied);
    let kids = pages.get_array("Kids").unwrap().clone();
    let page_a = dict_of(&mut target, &kids[0]);
    let page_b = dict_of(&mut target, &kids[1]);

    // the cycle closes on the copied parent
    assert_eq!(page_a.get_reference("Parent"), Some(pages_ref));
    assert_eq!(page_b.get_reference("Parent"), Some(pages_ref));
    // the shared resource is copied once
    assert_eq!(page_a.get_reference("Resources"), page_b.get_reference("Resources"));
    // the source catalog is not grafted into the target
    assert!(page_b.get("Back").unwrap().is_null());

    let contents = target.dereference(page_a.get("Contents").unwrap());
    assert_eq!(contents.decode_stream_data().unwrap(), b"BT /F1 12 Tf (hi) Tj ET");
}

#[test]
fn test_copy_map_survives_calls() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();

    // the parent link pulls in the whole tree, including the second page
    let first = source
        .copy_object_to(&Object::reference(3, 0), &mut target, &CopyOptions::default())
        .unwrap();
    let size_after_first = target.size();
    let second = source
        .copy_object_to(&Object::reference(4, 0), &mut target, &CopyOptions::default())
        .unwrap();
    assert_eq!(target.size(), size_after_first);

    let page_a = dict_of(&mut target, &first);
    let page_b = dict_of(&mut target, &second);
    assert_eq!(page_a.get_reference("Resources"), page_b.get_reference("Resources"));
    assert_eq!(page_a.get_reference("Parent"), page_b.get_reference("Parent"));
    let parent = dict_of(&mut target, page_a.get("Parent").unwrap());
    assert_eq!(parent.get_array("Kids").unwrap()[1], second);

    let again = source
        .copy_object_to(&Object::reference(3, 0), &mut target, &CopyOptions::default())
        .unwrap();
    assert_eq!(again, first);
}

#[test]
fn test_duplicates_share_children() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    let options = CopyOptions::default().with_duplicates(true);

    let a = source.copy_object_to(&Object::reference(5, 0), &mut target, &options).unwrap();
    let b = source.copy_object_to(&Object::reference(5, 0), &mut target, &options).unwrap();
    assert_ne!(a, b);

    let ra = dict_of(&mut target, &a);
    let rb = dict_of(&mut target, &b);
    let font_a = ra.get_dict("Font").unwrap().get_reference("F1");
    let font_b = rb.get_dict("Font").unwrap().get_reference("F1");
    assert_eq!(font_a, font_b);
}

#[test]
fn test_excluded_keys_apply_to_top_level_only() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    let options = CopyOptions::default().excluding(["Parent", "Type"]);

    let copied = source.copy_object_to(&Object::reference(3, 0), &mut target, &options).unwrap();
    let page = dict_of(&mut target, &copied);
    assert!(page.get("Parent").is_none());
    assert!(page.get("Type").is_none());

    let resources = dict_of(&mut target, page.get("Resources").unwrap());
    let font = dict_of(&mut target, resources.get_dict("Font").unwrap().get("F1").unwrap());
    assert_eq!(font.type_name(), Some("Font"));
}

#[test]
fn test_free_reference_copies_as_null() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    let value = Object::Array(vec![Object::reference(8, 0), Object::reference(99, 0)]);
    let copied = source.copy_object_to(&value, &mut target, &CopyOptions::default()).unwrap();
    assert_eq!(copied, Object::Array(vec![Object::Null, Object::Null]));
}

#[test]
fn test_between_two_parsed_documents() {
    let mut first = Document::from_bytes(source_file()).unwrap();
    let mut second = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();

    let a = first
        .copy_object_to(&Object::reference(7, 0), &mut target, &CopyOptions::default())
        .unwrap();
    let b = second
        .copy_object_to(&Object::reference(7, 0), &mut target, &CopyOptions::default())
        .unwrap();
    // same number, different source documents
    assert_ne!(a, b);
}

#[test]
fn test_handles_are_checked() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut other = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();

    let handle = source.handle(ObjectRef::new(7, 0));
    let copied = copy_handle_to(handle, &mut source, &mut target, &CopyOptions::default()).unwrap();
    assert!(copied.as_reference().is_some());

    let foreign = copy_handle_to(handle, &mut other, &mut target, &CopyOptions::default());
    assert!(matches!(foreign, Err(Error::Copy(_))));

    let freed = source.handle(ObjectRef::new(8, 0));
    let result = copy_handle_to(freed, &mut source, &mut target, &CopyOptions::default());
    assert!(matches!(result, Err(Error::Copy(_))));
}

#[test]
fn test_copied_graph_survives_writing() {
    init_logging();
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    let pages = source
        .copy_object_to(&Object::reference(2, 0), &mut target, &CopyOptions::default())
        .unwrap();
    let root = target.trailer().get_reference("Root").unwrap();
    let mut catalog = target.resolve(root).as_dict().cloned().unwrap();
    catalog.insert("Pages", pages);
    target.update_object(root, Object::Dictionary(catalog)).unwrap();

    let bytes = DocumentWriter::default().write_full(&mut target).unwrap();
    let mut reopened = Document::from_bytes(bytes).unwrap();
    assert!(!reopened.is_recovered());

    let catalog = reopened.catalog().unwrap();
    let pages = reopened.get_from_dict(catalog.as_dict().unwrap(), "Pages");
    assert_eq!(pages.as_dict().and_then(|d| d.get_integer("Count")), Some(2));
    let kids = pages.as_dict().and_then(|d| d.get_array("Kids")).cloned().unwrap();
    let page = reopened.dereference(&kids[0]);
    let parent = page.as_dict().and_then(|d| d.get_reference("Parent"));
    assert_eq!(parent, catalog.as_dict().and_then(|d| d.get_reference("Pages")));
}

#[test]
fn test_closed_document_cannot_copy() {
    let mut source = Document::from_bytes(source_file()).unwrap();
    let mut target = target_with_root();
    source.close();
    let result = source.copy_object_to(&Object::reference(7, 0), &mut target, &CopyOptions::default());
    assert!(matches!(result, Err(Error::DocumentClosed)));
}
