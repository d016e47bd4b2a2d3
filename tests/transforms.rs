#[path = "common/mod.rs"]
mod common;

use common::{crush_over, people_csv, run_to_string, write_input, write_zst_lines};
use crush::{Crush, CrushOptions, GrepFlags, KeyspecError, UsageError};
use std::io::Cursor;

/// Reorder by name permutes every row, header included.
#[test]
fn reorder_by_name_swaps_columns() {
    let out = run_to_string(|w| crush_over("a,b\n1,2\n3,4\n").reorder("b,a", w));
    assert_eq!(out, "b,a\n2,1\n4,3\n");
}

/// Reorder is a projection: selected fields, in selector order, duplicates kept.
#[test]
fn reorder_projects_and_duplicates() {
    let out = run_to_string(|w| crush_over(&people_csv()).reorder("4,2,2", w));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "city,name,name");
    assert_eq!(lines[1], "Paris,alice,alice");
    assert_eq!(lines.len(), 6);
}

/// A row shorter than the first row aborts the stream with its row number;
/// rows before it are already written.
#[test]
fn reorder_short_row_is_fatal() {
    let mut out: Vec<u8> = Vec::new();
    let err = crush_over("a,b,c\n1,2,3\n4,5\n").reorder("3", &mut out).unwrap_err();
    assert!(format!("{:#}", err).contains("row 3"), "unexpected error: {:#}", err);
}

/// An out-of-range selector is reported as a `KeyspecError` before anything is written.
#[test]
fn bad_selector_is_a_typed_error() {
    let mut out: Vec<u8> = Vec::new();
    let err = crush_over("a,b\n1,2\n").reorder("7", &mut out).unwrap_err();
    assert!(matches!(err.downcast_ref::<KeyspecError>(), Some(KeyspecError::OutOfRange { .. })));
    assert!(out.is_empty());
}

/// Empty input writes nothing and succeeds.
#[test]
fn empty_input_is_not_an_error() {
    let out = run_to_string(|w| crush_over("").reorder("1", w));
    assert_eq!(out, "");
}

/// CRLF terminators are stripped; output always uses `\n`.
#[test]
fn crlf_input_is_normalised() {
    let out = run_to_string(|w| crush_over("a,b\r\n1,2\r\n").reorder("2,1", w));
    assert_eq!(out, "b,a\n2,1\n");
}

/// A trailing `\r` is stripped even when the last line has no `\n`.
#[test]
fn trailing_carriage_return_without_newline() {
    let out = run_to_string(|w| crush_over("a,b\r\n1,2\r").reorder("2,1", w));
    assert_eq!(out, "b,a\n2,1\n");
}

/// Bytes that are not UTF-8 are replaced, not fatal; the rest of the row survives.
#[test]
fn invalid_utf8_is_replaced() {
    let input = b"a,b\n\xe9t\xe9,2\nx,3\n".to_vec();
    let out = run_to_string(|w| Crush::new().reader(Cursor::new(input)).reorder("b,a", w));
    assert_eq!(out, "b,a\n2,\u{FFFD}t\u{FFFD}\n3,x\n");
}

/// Options built up front behave like the builder setters.
#[test]
fn crush_from_options() {
    let opts = CrushOptions::default().with_delimiter(';').with_max_open_files(0);
    let crush = Crush::with_options(opts).reader(Cursor::new(b"a;b\n1;2\n".to_vec())).no_header(true);
    assert_eq!(crush.options().delimiter, ';');
    assert_eq!(crush.options().max_open_files, 1);
    assert!(crush.options().no_header);
    let out = run_to_string(|w| crush.reorder("b", w));
    assert_eq!(out, "b\n2\n");
}

/// Tab delimiter round-trips through the reader and the writer.
#[test]
fn custom_delimiter() {
    let out = run_to_string(|w| crush_over("a\tb\n1\t2\n").delimiter('\t').reorder("b", w));
    assert_eq!(out, "b\n2\n");
}

/// The grep example: the header passes, data rows are tested against `^3`.
#[test]
fn grep_keeps_header_and_matching_rows() {
    let out = run_to_string(|w| {
        crush_over("name,age\nalice,30\nbob,25\n").grep("age", &["^3"], GrepFlags::default(), w)
    });
    assert_eq!(out, "name,age\nalice,30\n");
}

/// Positional selectors give no header evidence, so the first row is data
/// and must match like any other.
#[test]
fn grep_by_position_treats_first_row_as_data() {
    let out = run_to_string(|w| {
        crush_over("name,age\nalice,30\nbob,25\n").grep("2", &["^3"], GrepFlags::default(), w)
    });
    assert_eq!(out, "alice,30\n");
}

/// AND over two fields keeps rows where both match; OR keeps rows where any does.
#[test]
fn grep_and_versus_any_field() {
    let input = "x,y\nAa,Bb\nAa,Cc\nDd,Bb\nDd,Ee\n";
    let all = run_to_string(|w| crush_over(input).grep("x,y", &["^A", "^B"], GrepFlags::default(), w));
    assert_eq!(all, "x,y\nAa,Bb\n");

    let any_flags = GrepFlags { any_field: true, ..GrepFlags::default() };
    let any = run_to_string(|w| crush_over(input).grep("x,y", &["^A", "^B"], any_flags, w));
    assert_eq!(any, "x,y\nAa,Bb\nAa,Cc\nDd,Bb\n");
}

/// Invert keeps exactly the rows where the combined condition is false.
#[test]
fn grep_invert_negates_the_combined_condition() {
    let input = "x,y\nAa,Bb\nAa,Cc\nDd,Bb\nDd,Ee\n";
    let flags = GrepFlags { invert: true, ..GrepFlags::default() };
    let out = run_to_string(|w| crush_over(input).grep("x,y", &["^A", "^B"], flags, w));
    assert_eq!(out, "x,y\nAa,Cc\nDd,Bb\nDd,Ee\n");

    let flags = GrepFlags { invert: true, any_field: true, ..GrepFlags::default() };
    let out = run_to_string(|w| crush_over(input).grep("x,y", &["^A", "^B"], flags, w));
    assert_eq!(out, "x,y\nDd,Ee\n");
}

/// Case-insensitive matching searches anywhere in the field.
#[test]
fn grep_ignore_case_searches_anywhere() {
    let flags = GrepFlags { ignore_case: true, ..GrepFlags::default() };
    let out = run_to_string(|w| crush_over(&people_csv()).grep("city", &["ARI"], flags, w));
    assert_eq!(out, "id,name,amount,city\n1,alice,21,Paris\n3,carol,30,Paris\n");
}

/// Field and pattern counts must agree; nothing is written when they do not.
#[test]
fn grep_pattern_count_mismatch() {
    let mut out: Vec<u8> = Vec::new();
    let err = crush_over(&people_csv())
        .grep("name,city", &["a"], GrepFlags::default(), &mut out)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<UsageError>(),
        Some(&UsageError::PatternCountMismatch { fields: 2, patterns: 1 })
    );
    assert!(out.is_empty());
}

/// An invalid regular expression is rejected up front.
#[test]
fn grep_invalid_regex() {
    let mut out: Vec<u8> = Vec::new();
    let err = crush_over(&people_csv()).grep("name", &["(unclosed"], GrepFlags::default(), &mut out).unwrap_err();
    assert!(format!("{:#}", err).contains("invalid pattern"));
}

/// `force_header` makes row one a header for a positional grep: it passes
/// through without being matched.
#[test]
fn grep_force_header_passes_first_row() {
    let out = run_to_string(|w| {
        crush_over("name,age\nalice,30\nbob,25\n").force_header(true).grep("2", &["^3"], GrepFlags::default(), w)
    });
    assert_eq!(out, "name,age\nalice,30\n");
}

/// `no_header` beats `force_header`.
#[test]
fn grep_no_header_beats_force_header() {
    let out = run_to_string(|w| {
        crush_over("name,age\nalice,30\n").force_header(true).no_header(true).grep("2", &["^3"], GrepFlags::default(), w)
    });
    assert_eq!(out, "alice,30\n");
}

/// `no_header` turns off name-based header detection for grep.
#[test]
fn grep_no_header_override() {
    let out = run_to_string(|w| {
        crush_over("name,age\nalice,30\n").no_header(true).grep("age", &["^3"], GrepFlags::default(), w)
    });
    assert_eq!(out, "alice,30\n");
}

/// Add-field by name: header gets the labels, data rows get the values.
#[test]
fn add_fields_with_labels() {
    let out = run_to_string(|w| {
        crush_over("a,b\n1,2\n3,4\n").add_fields("b", &["x"], Some(&["new"][..]), w)
    });
    assert_eq!(out, "a,new,b\n1,x,2\n3,x,4\n");
}

/// Labels force header treatment even when the selector is positional.
#[test]
fn add_fields_labels_force_header() {
    let out = run_to_string(|w| crush_over("a,b\n1,2\n").add_fields("1", &["v"], Some(&["lbl"][..]), w));
    assert_eq!(out, "lbl,a,b\nv,1,2\n");
}

/// Without labels and without name evidence every row gets the value.
#[test]
fn add_fields_without_header() {
    let out = run_to_string(|w| crush_over("1,2\n3,4\n").add_fields("2", &["z"], None, w));
    assert_eq!(out, "1,z,2\n3,z,4\n");
}

/// A name match without labels makes the header receive the value text.
#[test]
fn add_fields_detected_header_uses_values_as_labels() {
    let out = run_to_string(|w| crush_over("a,b\n1,2\n").add_fields("a", &["v"], None, w));
    assert_eq!(out, "v,a,b\nv,1,2\n");
}

/// Several insertions apply in order against the growing row: the second
/// index refers to the row after the first insertion.
#[test]
fn add_fields_post_shift_positions() {
    let out = run_to_string(|w| crush_over("a,b,c\n1,2,3\n").add_fields("1,3", &["X", "Y"], Some(&["hx", "hy"][..]), w));
    assert_eq!(out, "hx,a,hy,b,c\nX,1,Y,2,3\n");
    for line in out.lines() {
        assert_eq!(line.split(',').count(), 5, "each row grows by two fields");
    }
}

/// `no_header` beats labels: the labels are ignored and row one is data.
#[test]
fn add_fields_no_header_beats_labels() {
    let out = run_to_string(|w| {
        crush_over("a,b\n1,2\n").no_header(true).add_fields("1", &["v"], Some(&["lbl"][..]), w)
    });
    assert_eq!(out, "v,a,b\nv,1,2\n");
}

/// Value and label counts must match the number of insertion points.
#[test]
fn add_fields_count_mismatch() {
    let mut out: Vec<u8> = Vec::new();
    let err = crush_over("a,b\n1,2\n").add_fields("1,2", &["v"], None, &mut out).unwrap_err();
    assert!(matches!(err.downcast_ref::<UsageError>(), Some(UsageError::AddFieldCountMismatch { fields: 2, given: 1, .. })));

    let err = crush_over("a,b\n1,2\n")
        .add_fields("1", &["v"], Some(&["l1", "l2"][..]), &mut out)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<UsageError>(), Some(UsageError::AddFieldCountMismatch { fields: 1, given: 2, .. })));
}

/// Inputs are read from files, and `.zst` files are decompressed transparently.
#[test]
fn reads_plain_and_zstd_files() {
    let tmp = tempfile::tempdir().unwrap();
    let plain = tmp.path().join("in.csv");
    let packed = tmp.path().join("in.csv.zst");
    write_input(&plain, "a,b\n1,2\n3,4\n");
    write_zst_lines(&packed, &["a,b", "1,2", "3,4"]);

    let from_plain = run_to_string(|w| Crush::new().input(&plain).reorder("b", w));
    let from_zst = run_to_string(|w| Crush::new().input(&packed).reorder("b", w));
    assert_eq!(from_plain, "b\n2\n4\n");
    assert_eq!(from_zst, from_plain);
}

/// A missing input file is an error naming the path.
#[test]
fn missing_input_file() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.csv");
    let mut out: Vec<u8> = Vec::new();
    let err = Crush::new().input(&missing).reorder("1", &mut out).unwrap_err();
    assert!(format!("{:#}", err).contains("nope.csv"));
}
