use annotator_rs::core::comments::CommentTable;
use annotator_rs::error::LoadError;
use rust_xlsxwriter::Workbook;

#[test]
fn loads_first_sheet_of_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comments.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "学号").unwrap();
    sheet.write_string(0, 1, "评语").unwrap();
    sheet.write_number(1, 0, 21001).unwrap();
    sheet.write_string(1, 1, "Good work").unwrap();
    sheet.write_string(2, 0, "21002").unwrap();
    sheet.write_string(2, 1, "  Needs revision  ").unwrap();
    // comment without an id, id without a comment
    sheet.write_string(3, 1, "orphan").unwrap();
    sheet.write_string(4, 0, "21004").unwrap();
    sheet.write_string(5, 0, "nan").unwrap();
    sheet.write_string(5, 1, "dropped").unwrap();
    // duplicate: the later row wins
    sheet.write_number(6, 0, 21001).unwrap();
    sheet.write_string(6, 1, "Excellent work").unwrap();

    let other = workbook.add_worksheet();
    other.write_string(1, 0, "99999").unwrap();
    other.write_string(1, 1, "second sheet").unwrap();
    workbook.save(&path).unwrap();

    let table = CommentTable::load(&path, true).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("21001"), Some("Excellent work"));
    assert_eq!(table.get("21002"), Some("Needs revision"));
    assert_eq!(table.get("21004"), None);
    assert_eq!(table.get("nan"), None);
    assert_eq!(table.get("99999"), None);
}

#[test]
fn workbook_missing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = CommentTable::load(dir.path().join("comments.xlsx"), true).unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));
}
