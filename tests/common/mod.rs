#![allow(dead_code)]

use crush::Crush;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};

/// A `Crush` reading `input` from memory.
pub fn crush_over(input: &str) -> Crush {
    Crush::new().reader(Cursor::new(input.as_bytes().to_vec()))
}

/// Run `op` against an in-memory output buffer and return what it wrote.
pub fn run_to_string(op: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<u64>) -> String {
    let mut out = Vec::new();
    op(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

/// Write a plain text input file.
pub fn write_input(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Write a compressed `.zst` input file containing the provided lines.
pub fn write_zst_lines(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Every regular file directly under `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// A small table with a header: id,name,amount,city.
pub fn people_csv() -> String {
    [
        "id,name,amount,city",
        "1,alice,21,Paris",
        "2,bob,5,Berlin",
        "3,carol,30,Paris",
        "4,dave,7,Oslo",
        "5,erin,12,Berlin",
    ]
    .join("\n")
        + "\n"
}
