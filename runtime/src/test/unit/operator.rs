//! Companion operator description tests.

use std::ffi::c_void;
use std::fs;

use kernlink_codegen::scan;
use kernlink_dtype::Backend;

use crate::binder::{FunctionBinding, FunctionTable};
use crate::operator::OperatorDef;
use crate::Error;

unsafe extern "C" fn noop(_args: *const *mut c_void, _ret: *mut c_void) {}

fn table(src: &str) -> FunctionTable {
    let mut table = FunctionTable::new();
    for decl in scan(src).unwrap().declarations {
        table.insert(unsafe { FunctionBinding::from_raw(decl, Backend::Cpu, noop, None) });
    }
    table
}

fn load(text: &str) -> crate::Result<OperatorDef> {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("add.toml");
    fs::write(&path, text).unwrap();
    OperatorDef::load(&path, "add")
}

#[test]
fn test_full_description() {
    let def = load(
        r#"
name = "elementwise_add"
inputs = ["a", "b"]
outputs = ["out"]
forward = "add_forward"
backward = "add_backward"

[attributes]
inplace = false
alpha = 1.5
"#,
    )
    .unwrap();

    assert_eq!(def.name, "elementwise_add");
    assert_eq!(def.inputs, vec!["a", "b"]);
    assert_eq!(def.outputs, vec!["out"]);
    assert_eq!(def.forward, "add_forward");
    assert_eq!(def.backward.as_deref(), Some("add_backward"));
    assert_eq!(def.attributes["inplace"], toml::Value::Boolean(false));
    assert_eq!(def.attributes["alpha"], toml::Value::Float(1.5));
    assert_eq!(def.functions().collect::<Vec<_>>(), vec!["add_forward", "add_backward"]);
}

#[test]
fn test_name_defaults_to_directory() {
    let def = load("forward = \"add_forward\"\n").unwrap();
    assert_eq!(def.name, "add");
    assert!(def.backward.is_none());
    assert!(def.inputs.is_empty());
}

#[test]
fn test_missing_forward() {
    let err = load("backward = \"add_backward\"\n").unwrap_err();
    assert!(matches!(err, Error::CompanionParse { .. }), "unexpected error: {err}");
}

#[test]
fn test_unknown_key() {
    let err = load("forward = \"add_forward\"\nforwards = \"typo\"\n").unwrap_err();
    assert!(matches!(err, Error::CompanionParse { .. }), "unexpected error: {err}");
}

#[test]
fn test_missing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let err = OperatorDef::load(&tmp.path().join("add.toml"), "add").unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "unexpected error: {err}");
}

#[test]
fn test_check_against_table() {
    let table = table(
        "KERNLINK_KERNEL void add_forward_kernel(const int n, IN a, OUT y) {}\n\
         KERNLINK_KERNEL void add_backward_kernel(const int n, IN dy, OUT dx) {}\n",
    );
    let def = load("forward = \"add_forward\"\nbackward = \"add_backward\"\n").unwrap();
    assert!(def.check(&table).is_ok());

    let def = load("forward = \"add_forward\"\nbackward = \"add_grad\"\n").unwrap();
    let err = def.check(&table).unwrap_err();
    match &err {
        Error::UnknownFunction { operator, name, .. } => {
            assert_eq!(operator, "add");
            assert_eq!(name, "add_grad");
        }
        other => panic!("expected unknown function, got {other}"),
    }
    assert!(err.to_string().contains("add_backward, add_forward"), "{err}");
}
