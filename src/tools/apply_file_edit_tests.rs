//! # File Editor Tool Tests

use super::FileEditorTool;
use crate::error::ErrorCode;
use crate::tools::{Tool, test_context};
use serde_json::json;
use std::fs;

#[tokio::test]
async fn test_fuzzy_edit_is_written_to_disk() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    let file = tmp_dir.path().join("a.py");
    fs::write(&file, "    if x:\n        return 1\n").unwrap();

    let result = FileEditorTool
        .execute(
            &json!({
                "path": "a.py",
                "search_block": "if x:\nreturn 1",
                "replace_block": "if x:\nreturn 2"
            }),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "    if x:\n        return 2\n"
    );
    assert_eq!(result["strategy"], "fuzzy");
    assert_eq!(result["path"], "a.py");
    assert_eq!(result["matched_lines"], json!({"start_line": 1, "end_line": 2}));
}

#[tokio::test]
async fn test_line_range_edit() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    let file = tmp_dir.path().join("a.txt");
    fs::write(&file, "line 1\nline 2\nline 3\nline 4").unwrap();

    FileEditorTool
        .execute(
            &json!({
                "path": "a.txt",
                "start_line": 2,
                "end_line": 3,
                "replace_block": "new line"
            }),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&file).unwrap(), "line 1\nnew line\nline 4");
}

#[tokio::test]
async fn test_ambiguous_edit_leaves_file_untouched() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    let file = tmp_dir.path().join("a.rs");
    let original = "fn a() {\n    return 1;\n}\nfn b() {\n    return 1;\n}\n";
    fs::write(&file, original).unwrap();

    let err = FileEditorTool
        .execute(
            &json!({
                "path": "a.rs",
                "search_block": "return 1;",
                "replace_block": "return 2;"
            }),
            &ctx,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::AmbiguousMatch);
    assert_eq!(err.details().unwrap()["candidates"].as_array().unwrap().len(), 2);
    assert_eq!(fs::read_to_string(&file).unwrap(), original);
}

#[tokio::test]
async fn test_identical_replacement_succeeds_without_changes() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    let file = tmp_dir.path().join("a.txt");
    fs::write(&file, "keep\nme\n").unwrap();

    let result = FileEditorTool
        .execute(
            &json!({"path": "a.txt", "search_block": "keep", "replace_block": "keep"}),
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(result["lines_changed"], 0);
    assert!(result["message"].as_str().unwrap().starts_with("No changes"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "keep\nme\n");
}

#[tokio::test]
async fn test_both_locators_are_rejected() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    fs::write(tmp_dir.path().join("a.txt"), "a\n").unwrap();

    for args in [
        json!({"path": "a.txt", "search_block": "a", "start_line": 1, "end_line": 1, "replace_block": "b"}),
        json!({"path": "a.txt", "start_line": 1, "replace_block": "b"}),
        json!({"path": "a.txt", "replace_block": "b"}),
    ] {
        let err = FileEditorTool.execute(&args, &ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest, "args {args}");
    }
}

#[tokio::test]
async fn test_edit_missing_file_is_not_found() {
    let (_tmp_dir, ctx) = test_context("test-edit-file");
    let err = FileEditorTool
        .execute(
            &json!({"path": "nope.txt", "search_block": "a", "replace_block": "b"}),
            &ctx,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_low_confidence_reports_candidate() {
    let (tmp_dir, ctx) = test_context("test-edit-file");
    fs::write(tmp_dir.path().join("a.txt"), "alpha\nbeta\n").unwrap();

    let err = FileEditorTool
        .execute(
            &json!({"path": "a.txt", "search_block": "something else entirely", "replace_block": "b"}),
            &ctx,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::NoConfidentMatch);
    assert!(err.details().unwrap()["best_candidate"]["score"].is_number());
}
