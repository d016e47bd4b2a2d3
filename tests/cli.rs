#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::{people_csv, read_lines, write_input, write_zst_lines};
use predicates::prelude::*;

fn crush() -> Command {
    Command::cargo_bin("crush").unwrap()
}

/// `grep -f age ^3` keeps the header and the matching row.
#[test]
fn cli_grep_from_stdin() {
    crush()
        .args(["grep", "-f", "age", "^3"])
        .write_stdin("name,age\nalice,30\nbob,25\n")
        .assert()
        .success()
        .stdout("name,age\nalice,30\n");
}

/// `reorder -f b,a` swaps the two columns.
#[test]
fn cli_reorder() {
    crush()
        .args(["reorder", "-f", "b,a"])
        .write_stdin("a,b\n1,2\n3,4\n")
        .assert()
        .success()
        .stdout("b,a\n2,1\n4,3\n");
}

/// Global options precede the command; `-d tab` selects TAB.
#[test]
fn cli_tab_delimiter() {
    crush()
        .args(["-d", "tab", "reorder", "-f", "2"])
        .write_stdin("a\tb\n1\t2\n")
        .assert()
        .success()
        .stdout("b\n2\n");
}

/// `addfield` with header labels.
#[test]
fn cli_addfield() {
    crush()
        .args(["addfield", "-i", "1,3", "-v", "X,Y", "-H", "hx,hy"])
        .write_stdin("a,b,c\n1,2,3\n")
        .assert()
        .success()
        .stdout("hx,a,hy,b,c\nX,1,Y,2,3\n");
}

/// `calc` appends a computed column.
#[test]
fn cli_calc() {
    crush()
        .args(["calc", "-H", "double", "int([amount]) * 2"])
        .write_stdin("name,amount\nx,21\n")
        .assert()
        .success()
        .stdout("name,amount,double\nx,21,42\n");
}

/// `-N` makes the first row data even when a selector names it.
#[test]
fn cli_no_header() {
    crush()
        .args(["-N", "grep", "-v", "-f", "age", "^3"])
        .write_stdin("name,age\nalice,30\nbob,25\n")
        .assert()
        .success()
        .stdout("name,age\nbob,25\n");
}

/// `--header` makes row one a header for a positional selector.
#[test]
fn cli_force_header() {
    crush()
        .args(["--header", "grep", "-f", "2", "^3"])
        .write_stdin("name,age\nalice,30\nbob,25\n")
        .assert()
        .success()
        .stdout("name,age\nalice,30\n");
}

/// `-N` wins over `--header`: row one is data and must match.
#[test]
fn cli_no_header_beats_force_header() {
    crush()
        .args(["--header", "-N", "grep", "-f", "2", "^3"])
        .write_stdin("name,age\nalice,30\nbob,25\n")
        .assert()
        .success()
        .stdout("alice,30\n");
}

/// `split` writes bucket files under `--path` and nothing to stdout.
#[test]
fn cli_split() {
    let tmp = tempfile::tempdir().unwrap();
    let out_dir = tmp.path().join("parts");
    crush()
        .args(["split", "-f", "city", "-b", "c: lower(c)", "-o", "%.csv", "-p"])
        .arg(&out_dir)
        .write_stdin(people_csv())
        .assert()
        .success()
        .stdout("");
    assert_eq!(read_lines(&out_dir.join("oslo.csv")), vec!["id,name,amount,city", "4,dave,7,Oslo"]);
    assert_eq!(read_lines(&out_dir.join("berlin.csv")).len(), 3);
}

/// `--input` reads files, decompressing `.zst`.
#[test]
fn cli_input_files() {
    let tmp = tempfile::tempdir().unwrap();
    let plain = tmp.path().join("in.csv");
    let packed = tmp.path().join("in.csv.zst");
    write_input(&plain, "a,b\n1,2\n");
    write_zst_lines(&packed, &["a,b", "1,2"]);

    for path in [&plain, &packed] {
        crush()
            .arg("-I")
            .arg(path)
            .args(["reorder", "-f", "b"])
            .assert()
            .success()
            .stdout("b\n2\n");
    }
}

/// Specification errors exit non-zero with a message on stderr and no data on stdout.
#[test]
fn cli_errors_fail() {
    crush()
        .args(["reorder", "-f", "9"])
        .write_stdin("a,b\n1,2\n")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("outside the row"));

    crush()
        .args(["grep", "-f", "a,b", "x"])
        .write_stdin("a,b\n1,2\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 field(s) selected but 1 pattern(s) given"));

    crush()
        .args(["calc", "oops("])
        .write_stdin("a\n1\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot parse expression"));
}

/// A multi-character delimiter is rejected by the argument parser.
#[test]
fn cli_bad_delimiter() {
    crush()
        .args(["-d", "::", "reorder", "-f", "1"])
        .write_stdin("a\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("single character"));
}
