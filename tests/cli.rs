use std::io::Write;
use std::process::{Command, Output};

use jsmm::ast::{BinaryOp, NodeId, Tree, TreeBuilder};
use tempfile::NamedTempFile;

fn jsmm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_jsmm"))
}

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

fn tree_file(tree: &Tree) -> NamedTempFile {
    write_file(&serde_json::to_string(tree).expect("serialize tree"))
}

fn run(file: &NamedTempFile, extra: &[&str]) -> Output {
    jsmm()
        .arg("run")
        .arg(file.path())
        .args(extra)
        .output()
        .expect("failed to run jsmm")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn console_log(b: &mut TreeBuilder, line: u32, args: Vec<NodeId>) -> NodeId {
    let console = b.name(line, "console");
    let log = b.property(line, console, "log");
    b.call(line, log, args)
}

// --- run: output ---

#[test]
fn run_prints_console_output() {
    let mut b = TreeBuilder::new();
    let hi = b.string(1, "hi");
    let two = b.number(1, 2.0);
    let first = console_log(&mut b, 1, vec![hi, two]);
    let three = b.number(2, 3.0);
    let four = b.number(2, 4.0);
    let sum = b.binary(2, three, BinaryOp::Add, four);
    let second = console_log(&mut b, 2, vec![sum]);
    let file = tree_file(&b.program(vec![first, second]));

    let out = run(&file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "hi 2\n7\n");
}

#[test]
fn run_recursive_function() {
    // function fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }
    // console.log(fact(5));
    let mut b = TreeBuilder::new();
    let n = b.name(1, "n");
    let one = b.number(1, 1.0);
    let test = b.binary(1, n, BinaryOp::LessOrEqual, one);
    let one_again = b.number(1, 1.0);
    let base = b.ret(1, Some(one_again));
    let guard = b.if_block(1, test, vec![base], None);
    let n_left = b.name(2, "n");
    let n_arg = b.name(2, "n");
    let one_arg = b.number(2, 1.0);
    let minus = b.binary(2, n_arg, BinaryOp::Subtract, one_arg);
    let recurse = b.call_named(2, "fact", vec![minus]);
    let product = b.binary(2, n_left, BinaryOp::Multiply, recurse);
    let ret = b.ret(2, Some(product));
    let fact = b.function(1, "fact", &["n"], vec![guard, ret]);
    let five = b.number(3, 5.0);
    let call = b.call_named(3, "fact", vec![five]);
    let print = console_log(&mut b, 3, vec![call]);
    let file = tree_file(&b.program(vec![fact, print]));

    let out = run(&file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "120");
}

// --- run: faults ---

const DIVISION_TREE: &str = r#"{
  "root": 8,
  "source": "var x = 7 / 0;",
  "nodes": [
    {"id": 0, "loc": {"line": 1, "column": 9, "end_line": 1, "end_column": 10}, "type": "NumberLiteral", "value": 7},
    {"id": 1, "loc": {"line": 1, "column": 13, "end_line": 1, "end_column": 14}, "type": "NumberLiteral", "value": 0},
    {"id": 2, "loc": {"line": 1, "column": 9, "end_line": 1, "end_column": 14}, "type": "BinaryExpression", "left": 0, "op": "/", "right": 1},
    {"id": 3, "loc": {"line": 1, "column": 5, "end_line": 1, "end_column": 6}, "type": "NameIdentifier", "name": "x"},
    {"id": 4, "loc": {"line": 1, "column": 5, "end_line": 1, "end_column": 14}, "type": "AssignmentStatement", "target": 3, "op": "=", "value": 2},
    {"id": 5, "loc": {"line": 1, "column": 5, "end_line": 1, "end_column": 14}, "type": "VarItem", "name": "x", "assignment": 4},
    {"id": 6, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 15}, "type": "VarStatement", "items": [5]},
    {"id": 7, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 15}, "type": "StatementList", "statements": [6]},
    {"id": 8, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 15}, "type": "Program", "body": 7}
  ]
}"#;

#[test]
fn fault_renders_located_diagnostic() {
    let file = write_file(DIVISION_TREE);
    let out = run(&file, &[]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[JSMM-R006]"), "got: {err}");
    assert!(err.contains("/ not possible since it is a division by zero"), "got: {err}");
    assert!(err.contains("--> 1:9"), "got: {err}");
    assert!(err.contains("var x = 7 / 0;"), "got: {err}");
    assert!(err.contains("^^^^^"), "got: {err}");
}

#[test]
fn fault_as_json() {
    let file = write_file(DIVISION_TREE);
    let out = run(&file, &["--format", "json"]);
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_str(stderr(&out).trim()).expect("JSON diagnostic");
    assert_eq!(v["code"], "JSMM-R006");
    assert_eq!(v["labels"][0]["line"], 1);
    assert_eq!(v["labels"][0]["col"], 9);
}

#[test]
fn output_before_a_fault_is_kept() {
    let mut b = TreeBuilder::new();
    let before = b.string(1, "before");
    let print = console_log(&mut b, 1, vec![before]);
    let missing = b.name(2, "nowhere");
    let bad = console_log(&mut b, 2, vec![missing]);
    let file = tree_file(&b.program(vec![print, bad]));

    let out = run(&file, &[]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out), "before\n");
    assert!(stderr(&out).contains("JSMM-R014"), "got: {}", stderr(&out));
}

fn endless_loop() -> Tree {
    let mut b = TreeBuilder::new();
    let yes = b.boolean(1, true);
    let spin = b.while_block(1, yes, vec![]);
    b.program(vec![spin])
}

#[test]
fn max_cost_flag_stops_endless_loop() {
    let file = tree_file(&endless_loop());
    let out = run(&file, &["--max-cost", "50"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("JSMM-R012"), "got: {err}");
    assert!(err.contains("Program takes too long to run"), "got: {err}");
}

#[test]
fn config_file_sets_call_depth() {
    // function f() { f(); } f();
    let mut b = TreeBuilder::new();
    let inner = b.call_named(1, "f", vec![]);
    let f = b.function(1, "f", &[], vec![inner]);
    let outer = b.call_named(2, "f", vec![]);
    let file = tree_file(&b.program(vec![f, outer]));
    let config = write_file(r#"{"max_call_stack_depth": 5}"#);

    let out = jsmm()
        .arg("run")
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("failed to run jsmm");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("JSMM-R011"), "got: {}", stderr(&out));
}

#[test]
fn bad_config_file_is_rejected() {
    let file = tree_file(&endless_loop());
    let config = write_file("{ not json");
    let out = jsmm()
        .arg("run")
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("failed to run jsmm");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("invalid config"), "got: {}", stderr(&out));
}

// --- run: loading ---

#[test]
fn unreadable_tree_is_c002() {
    let file = write_file("[1, 2, 3]");
    let out = run(&file, &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("JSMM-C002"), "got: {}", stderr(&out));
}

#[test]
fn malformed_tree_is_c001() {
    let file = write_file(r#"{"root": 3, "nodes": [{"id": 0, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 1}, "type": "StatementList", "statements": []}]}"#);
    let out = run(&file, &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("JSMM-C001"), "got: {}", stderr(&out));
}

#[test]
fn cyclic_tree_is_c001_not_a_crash() {
    let file = write_file(
        r#"{"root": 3, "nodes": [
            {"id": 0, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 1}, "type": "ParenExpression", "inner": 0},
            {"id": 1, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 1}, "type": "ReturnStatement", "value": 0},
            {"id": 2, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 1}, "type": "StatementList", "statements": [1]},
            {"id": 3, "loc": {"line": 1, "column": 1, "end_line": 1, "end_column": 1}, "type": "Program", "body": 2}
        ]}"#,
    );
    let out = run(&file, &[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("JSMM-C001"), "got: {}", stderr(&out));
}

#[test]
fn missing_file_fails() {
    let out = jsmm().args(["run", "/nonexistent/program.json"]).output().expect("failed to run jsmm");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("cannot read"));
}

// --- run: history ---

#[test]
fn state_prints_global_frame() {
    let mut b = TreeBuilder::new();
    let three = b.number(1, 3.0);
    let decl = b.var(1, "x", Some(three));
    let file = tree_file(&b.program(vec![decl]));

    let out = run(&file, &["--state", "0"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let frames: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("JSON frames");
    assert_eq!(frames[0]["name"], "global");
    assert_eq!(frames[0]["vars"]["x"]["value"], "3");
    assert_eq!(frames[0]["vars"]["x"]["id"], "0-x");
}

#[test]
fn history_lists_scope_events() {
    let mut b = TreeBuilder::new();
    let one = b.number(1, 1.0);
    let decl = b.var(1, "x", Some(one));
    let file = tree_file(&b.program(vec![decl]));

    let out = run(&file, &["--history"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let events: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("JSON events");
    let events = events.as_array().expect("array of events");
    assert_eq!(events[0]["type"], "enter");
    assert_eq!(events[0]["name"], "global");
    assert!(events.iter().any(|e| e["type"] == "assignment" && e["name"] == "x" && e["value"] == "1"));
}

// --- explain ---

#[test]
fn explain_known_code() {
    let out = jsmm().args(["explain", "JSMM-R011"]).output().expect("failed to run jsmm");
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("## JSMM-R011"));
}

#[test]
fn explain_unknown_code_fails() {
    let out = jsmm().args(["explain", "JSMM-Z999"]).output().expect("failed to run jsmm");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("unknown error code"));
}

#[test]
fn explain_list_shows_every_code() {
    let out = jsmm().args(["explain", "--list"]).output().expect("failed to run jsmm");
    assert!(out.status.success());
    let listing = stdout(&out);
    assert!(listing.contains("JSMM-C001"));
    assert!(listing.contains("JSMM-R015"));
}
