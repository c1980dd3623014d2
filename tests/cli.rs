use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_create_list_extract_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("nested"))?;
    fs::write(src.join("file1.txt"), "Hello, this is the first file.\n")?;
    fs::write(src.join("nested/data.bin"), [0u8, 1, 2, 3, 4, 5])?;
    let archive = dir.path().join("test.zip");

    Command::cargo_bin("rezip")?
        .arg("create")
        .arg(&archive)
        .arg(src.join("file1.txt"))
        .arg(src.join("nested"))
        .arg("--remove-path")
        .arg(&src)
        .arg("-z")
        .arg("nightly")
        .assert()
        .success();

    Command::cargo_bin("rezip")?
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("file1.txt")
                .and(predicate::str::contains("nested/"))
                .and(predicate::str::contains("nested/data.bin")),
        );

    Command::cargo_bin("rezip")?
        .arg("list")
        .arg("-v")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Length").and(predicate::str::contains("2 files")));

    Command::cargo_bin("rezip")?
        .arg("properties")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("entries: 3").and(predicate::str::contains("nightly")));

    let out = dir.path().join("out");
    Command::cargo_bin("rezip")?
        .arg("extract")
        .arg(&archive)
        .arg("-d")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(out.join("file1.txt"))?, fs::read(src.join("file1.txt"))?);
    assert_eq!(fs::read(out.join("nested/data.bin"))?, [0u8, 1, 2, 3, 4, 5]);

    Ok(())
}

#[test]
fn test_cli_pipe_and_delete() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.txt"), "alpha")?;
    fs::write(dir.path().join("b.log"), "beta")?;
    let archive = dir.path().join("t.zip");

    Command::cargo_bin("rezip")?
        .current_dir(dir.path())
        .args(["create", "t.zip", "a.txt", "b.log"])
        .assert()
        .success();

    Command::cargo_bin("rezip")?
        .arg("extract")
        .arg("-p")
        .arg(&archive)
        .arg("a.txt")
        .assert()
        .success()
        .stdout("alpha");

    Command::cargo_bin("rezip")?
        .arg("delete")
        .arg(&archive)
        .arg("--preg")
        .arg("/\\.LOG$/i")
        .assert()
        .success()
        .stdout(predicate::str::contains("deleting: b.log"));

    Command::cargo_bin("rezip")?
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("b.log").not());

    Ok(())
}

#[test]
fn test_cli_reports_failures() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let missing = dir.path().join("missing.zip");

    Command::cargo_bin("rezip")?
        .arg("properties")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));

    fs::write(dir.path().join("a.txt"), "alpha")?;
    Command::cargo_bin("rezip")?
        .current_dir(dir.path())
        .args(["create", "t.zip", "a.txt"])
        .assert()
        .success();

    // The destination is a directory with the entry's name.
    fs::create_dir_all(dir.path().join("out/a.txt"))?;
    Command::cargo_bin("rezip")?
        .current_dir(dir.path())
        .args(["extract", "t.zip", "-d", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already_a_directory"));

    Ok(())
}
