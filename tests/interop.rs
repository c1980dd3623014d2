//! Archives are checked against the independent `zip` crate in both directions.

use std::fs::{self, File};
use std::io::{Read, Write};

use rezip::{AddOptions, ExtractOptions, Selection};
use tempfile::tempdir;

#[test]
fn written_archive_reads_with_zip_crate() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("docs")).unwrap();
    fs::write(src.join("docs/readme.txt"), "read me ".repeat(1000)).unwrap();
    fs::write(src.join("raw.bin"), [0u8, 1, 2, 3, 255]).unwrap();

    let path = dir.path().join("out.zip");
    let archive = rezip::ZipArchive::new(&path);
    let options = AddOptions {
        remove_path: Some(src.to_string_lossy().into_owned()),
        comment: Some("made by rezip".into()),
        ..Default::default()
    };
    archive.create(&[src.join("docs"), src.join("raw.bin")], &options).unwrap();

    let mut reader = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.comment(), b"made by rezip");
    assert!(reader.by_name("docs/").unwrap().is_dir());

    let mut text = String::new();
    reader.by_name("docs/readme.txt").unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "read me ".repeat(1000));

    let mut raw = Vec::new();
    reader.by_name("raw.bin").unwrap().read_to_end(&mut raw).unwrap();
    assert_eq!(raw, [0u8, 1, 2, 3, 255]);
}

#[test]
fn zip_crate_archive_reads_with_rezip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("foreign.zip");

    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    let deflated = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let stored = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    writer.add_directory("dir/", stored).unwrap();
    writer.start_file("dir/one.txt", deflated).unwrap();
    writer.write_all(b"first file").unwrap();
    writer.start_file("two.txt", stored).unwrap();
    writer.write_all(b"second file").unwrap();
    writer.finish().unwrap();

    let archive = rezip::ZipArchive::new(&path);
    let names: Vec<_> = archive.list().unwrap().into_iter().map(|e| e.stored_filename).collect();
    assert_eq!(names, vec!["dir/", "dir/one.txt", "two.txt"]);

    let options = ExtractOptions {
        selection: Selection::by_name(["dir/"]),
        extract_as_string: true,
        ..Default::default()
    };
    let results = archive.extract(&options).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].header().content.as_deref(), Some(&b"first file"[..]));

    archive.delete(&Selection::by_name(["dir/one.txt"])).unwrap();
    let mut reader = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    let mut text = String::new();
    reader.by_name("two.txt").unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "second file");
}
