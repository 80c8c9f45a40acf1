//! Integration tests for the marketload binary.
//!
//! Each test works in its own temp directory and uses the SQLite or memory
//! store, so no database server is needed.

mod common;

use std::fs;

use tempfile::TempDir;

use common::run_cli;

fn path_arg(path: &std::path::Path) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

#[test]
fn test_generate_load_analyze() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("raw").join("sales.parquet");
    let db = dir.path().join("sales.db");
    let summary = dir.path().join("summary.json");
    let processed = dir.path().join("processed");
    let store = format!("sqlite:{}", db.display());

    let out = run_cli(&["generate", "--rows", "3000", "--seed", "7", "--output", path_arg(&source)]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(source.exists());

    let out = run_cli(&[
        "load",
        "--source",
        path_arg(&source),
        "--store",
        &store,
        "--create-table",
        "--batch-size",
        "1000",
        "--concurrency",
        "10",
        "--summary-json",
        path_arg(&summary),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["state"], "Completed");
    assert_eq!(json["stats"]["succeeded"], 3000);
    assert_eq!(json["stats"]["batches"], 3);
    assert!(json["error"].is_null());

    let out = run_cli(&["analyze", "--store", &store, "--output-dir", path_arg(&processed)]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    for name in [
        "receita_estado_categoria.csv",
        "preco_rating_por_produto.csv",
        "vendas_por_mes.csv",
    ] {
        assert!(processed.join(name).exists(), "missing {name}");
    }
}

#[test]
fn test_missing_source_exits_one() {
    let dir = TempDir::new().unwrap();
    let out = run_cli(&[
        "load",
        "--source",
        path_arg(&dir.path().join("absent.parquet")),
        "--store",
        "memory:",
    ]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_zero_batch_size_exits_one() {
    let dir = TempDir::new().unwrap();
    let source = common::write_source(dir.path(), "sales.parquet", 10);
    let out = run_cli(&[
        "load",
        "--source",
        path_arg(&source),
        "--store",
        "memory:",
        "--batch-size",
        "0",
    ]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_bad_store_address_exits_one() {
    let dir = TempDir::new().unwrap();
    let source = common::write_source(dir.path(), "sales.parquet", 10);
    let summary = dir.path().join("summary.json");
    let out = run_cli(&[
        "load",
        "--source",
        path_arg(&source),
        "--store",
        "postgres://db/x",
        "--summary-json",
        path_arg(&summary),
    ]);
    assert_eq!(out.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["state"], "Aborted");
    assert_eq!(json["stats"]["attempted"], 0);
    assert_eq!(json["stats"]["records_read"], 0);
    assert!(json["error"].as_str().unwrap().contains("store"));
}

#[test]
fn test_unreachable_cluster_reports_zero_stats() {
    let dir = TempDir::new().unwrap();
    let source = common::write_source(dir.path(), "sales.parquet", 10);
    let summary = dir.path().join("summary.json");
    let out = run_cli(&[
        "load",
        "--source",
        path_arg(&source),
        "--store",
        "cassandra://127.0.0.1:1/marketplace_ks",
        "--summary-json",
        path_arg(&summary),
    ]);
    assert_eq!(out.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["state"], "Aborted");
    assert_eq!(json["stats"]["attempted"], 0);
    assert_eq!(json["stats"]["succeeded"], 0);
    assert_eq!(json["stats"]["failed"], 0);
}

#[test]
fn test_analyze_empty_store_exits_one() {
    let dir = TempDir::new().unwrap();
    let out = run_cli(&["analyze", "--store", "memory:", "--output-dir", path_arg(dir.path())]);
    assert_eq!(out.status.code(), Some(1));
}
