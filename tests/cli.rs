//! End-to-end CLI tests against the compiled `ibhealth` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_minimal_dump(dir: &std::path::Path) {
    let path = dir.join("fabric.db_csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        concat!(
            "--pm_pause_time 2.5\n",
            "START_NODES\n",
            "NodeGUID,NodeDesc,NodeType\n",
            "0x1,\"host-a\",1\n",
            "END_NODES\n",
        )
    )
    .unwrap();
}

#[test]
fn analyze_on_empty_dump_reports_a_perfect_score() {
    let dir = tempfile::tempdir().unwrap();
    write_minimal_dump(dir.path());

    let mut cmd = Command::cargo_bin("ibhealth").unwrap();
    cmd.arg("analyze").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"score\": 100"))
        .stdout(predicate::str::contains("\"grade\": \"A\""));
}

#[test]
fn analyze_on_missing_directory_fails() {
    let mut cmd = Command::cargo_bin("ibhealth").unwrap();
    cmd.arg("analyze").arg("/no/such/dataset/root");
    cmd.assert().failure();
}

#[test]
fn csv_subcommand_counts_rows_and_previews() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "a,b,c").unwrap();
    for i in 0..5 {
        writeln!(file, "{i},{i},{i}").unwrap();
    }

    let mut cmd = Command::cargo_bin("ibhealth").unwrap();
    cmd.arg("csv").arg(file.path()).arg("--preview-rows").arg("2");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"row_count\": 5"))
        .stdout(predicate::str::contains("\"columns\""));
}

#[test]
fn csv_subcommand_rejects_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();

    let mut cmd = Command::cargo_bin("ibhealth").unwrap();
    cmd.arg("csv").arg(file.path());
    cmd.assert().failure();
}
