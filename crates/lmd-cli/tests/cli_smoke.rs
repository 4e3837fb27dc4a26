use std::path::Path;
use std::process::{Command, Output};

use lmd_core::ipc::{Char3GramsResponse, TrigramMatches, TrigramsResponse};
use tempfile::TempDir;

fn lmd(lmd_dir: &Path, data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lmd"))
        .env("LMD_DIR", lmd_dir)
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn cli_updates_and_queries_locally() {
    let lmd_dir = TempDir::new().unwrap();
    let corpus = TempDir::new().unwrap();
    let data_dir = lmd_dir.path().join("data");

    let a = corpus.path().join("a.txt");
    let b = corpus.path().join("b.txt");
    std::fs::write(&a, "The cat sat on the mat.").unwrap();
    std::fs::write(&b, "the cat sat on the rug").unwrap();

    let out = lmd(
        lmd_dir.path(),
        &data_dir,
        &[
            "update",
            "--workers",
            "2",
            "--shards",
            "16",
            a.to_str().unwrap(),
            b.to_str().unwrap(),
        ],
    );
    assert!(
        out.status.success(),
        "update failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let out = lmd(
        lmd_dir.path(),
        &data_dir,
        &["trigrams", "the", "cat", "--local", "--format", "json"],
    );
    assert!(out.status.success());
    let resp: TrigramsResponse = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(resp.total, 8);
    match resp.matches {
        TrigramMatches::Thirds(thirds) => assert_eq!(thirds.get("sat"), Some(&2)),
        other => panic!("unexpected matches: {:?}", other),
    }

    let out = lmd(
        lmd_dir.path(),
        &data_dir,
        &["char3grams", "CAT", "--local", "--format", "json"],
    );
    assert!(out.status.success());
    let resp: Char3GramsResponse = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(resp.matches[0].ngram, "cat");
    assert_eq!(resp.matches[0].count, 2);

    let out = lmd(lmd_dir.path(), &data_dir, &["compact"]);
    assert!(out.status.success());
}

#[test]
fn cli_fails_on_missing_document() {
    let lmd_dir = TempDir::new().unwrap();
    let data_dir = lmd_dir.path().join("data");

    let out = lmd(
        lmd_dir.path(),
        &data_dir,
        &["update", "/definitely/not/a/document.txt"],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("document.txt"));
}

#[test]
fn cli_fails_without_daemon() {
    let lmd_dir = TempDir::new().unwrap();
    let data_dir = lmd_dir.path().join("data");

    let out = lmd(lmd_dir.path(), &data_dir, &["char3grams", "abc"]);
    assert!(!out.status.success());
}
