//! Generated Python evaluators checked against the in-process evaluator
//!
//! Both data access modes run on the same records as [`Program::evaluate`]
//! and must produce the same JSON. Skipped when `python3` is not installed.

use airscope::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::path::Path;
use std::process::Command;

const SCHEMA: &str = r#"{
  "tables": [
    {
      "id": "tblOrders",
      "name": "Orders",
      "primaryFieldId": "fldName",
      "fields": [
        {"id": "fldName", "name": "Name", "type": "singleLineText"},
        {"id": "fldQty", "name": "Qty", "type": "number"},
        {"id": "fldPrice", "name": "Price", "type": "currency"},
        {"id": "fldWhen", "name": "When", "type": "dateTime"},
        {"id": "fldTotal", "name": "Total", "type": "formula",
         "options": {"formula": "{Qty} * {Price}"}},
        {"id": "fldLabel", "name": "Label", "type": "formula",
         "options": {"formula": "IF({Total} > 10, \"big\", \"small\") & \" / \" & TRIM({Name})"}},
        {"id": "fldTiny", "name": "Tiny", "type": "formula",
         "options": {"formula": "0.0000001 & \"\""}},
        {"id": "fldHuge", "name": "Huge", "type": "formula",
         "options": {"formula": "1e21 & \"\""}},
        {"id": "fldNegZero", "name": "Neg Zero", "type": "formula",
         "options": {"formula": "(-0) & \"\""}},
        {"id": "fldQuotient", "name": "Quotient", "type": "formula",
         "options": {"formula": "({Total} / 7) & \"\""}},
        {"id": "fldUnderscore", "name": "Underscore", "type": "formula",
         "options": {"formula": "VALUE(\"1_000\")"}},
        {"id": "fldInfText", "name": "Inf Text", "type": "formula",
         "options": {"formula": "\"inf\" * 1"}},
        {"id": "fldCompactDate", "name": "Compact Date", "type": "formula",
         "options": {"formula": "YEAR(\"20240305\")"}},
        {"id": "fldOffsetDay", "name": "Offset Day", "type": "formula",
         "options": {"formula": "DAY(\"2024-03-05T23:30:00-02:00\")"}},
        {"id": "fldMonthEnd", "name": "Month End", "type": "formula",
         "options": {"formula": "DATEADD(\"2024-01-31\", 1, \"months\")"}},
        {"id": "fldFarFuture", "name": "Far Future", "type": "formula",
         "options": {"formula": "DATEADD(\"2024-01-01\", 1e19, \"years\")"}},
        {"id": "fldPastRange", "name": "Past Range", "type": "formula",
         "options": {"formula": "DATEADD(\"9999-12-31\", 1, \"days\")"}},
        {"id": "fldElapsed", "name": "Elapsed", "type": "formula",
         "options": {"formula": "DATETIME_DIFF({When}, \"2024-01-01\", \"days\")"}},
        {"id": "fldRepeat", "name": "Repeat", "type": "formula",
         "options": {"formula": "REPT(\"ab\", {Qty})"}},
        {"id": "fldRepeatHuge", "name": "Repeat Huge", "type": "formula",
         "options": {"formula": "REPT(\"ab\", 1e19)"}},
        {"id": "fldRepeatInf", "name": "Repeat Inf", "type": "formula",
         "options": {"formula": "REPT(\"ab\", 1e308 * 10)"}},
        {"id": "fldLeftHuge", "name": "Left Huge", "type": "formula",
         "options": {"formula": "LEFT({Name}, 1e300)"}},
        {"id": "fldRounded", "name": "Rounded", "type": "formula",
         "options": {"formula": "ROUND(2.345, 2)"}}
      ]
    }
  ]
}"#;

const DRIVER: &str = r#"
import importlib.util
import json
import sys


def load(path, name):
    spec = importlib.util.spec_from_file_location(name, path)
    module = importlib.util.module_from_spec(spec)
    sys.modules[name] = module
    spec.loader.exec_module(module)
    return module


mapping = load(sys.argv[1], "orders_mapping")
record = load(sys.argv[2], "orders_record")
values = json.loads(sys.stdin.buffer.read().decode("utf-8"))

computed = mapping.evaluate(values)
by_mapping = {
    key: mapping.to_json_value(computed[key]) for key, _ in mapping.EVALUATION_ORDER
}

ids = record.FIELD_IDS
row = record.OrdersRecord(**{name: values.get(field_id) for name, field_id in ids.items()})
record.evaluate(row)
by_record = {
    ids[name]: record.to_json_value(getattr(row, name)) for name, _ in record.EVALUATION_ORDER
}

print(json.dumps({"mapping": by_mapping, "record": by_record}))
"#;

fn has_python() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Numbers compare by value whatever their JSON spelling (`12` vs `12.0`)
fn normalize(json: Json) -> Json {
    match json {
        Json::Number(n) => n.as_f64().map_or(Json::Null, |f| json!(f)),
        Json::Array(items) => Json::Array(items.into_iter().map(normalize).collect()),
        Json::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect()),
        other => other,
    }
}

fn write_module(schema: &Schema, dir: &Path, name: &str, access: DataAccess) -> String {
    let source = schema
        .generate("Orders", &GenerateOptions::default().with_data_access(access))
        .unwrap();
    let path = dir.join(name);
    std::fs::write(&path, source).unwrap();
    path.to_string_lossy().into_owned()
}

fn run_python(schema: &Schema, inputs: &Json) -> Json {
    let dir = tempfile::tempdir().unwrap();
    let mapping = write_module(schema, dir.path(), "orders_mapping.py", DataAccess::Mapping);
    let record = write_module(schema, dir.path(), "orders_record.py", DataAccess::Record);
    let driver = dir.path().join("driver.py");
    std::fs::write(&driver, DRIVER).unwrap();

    let mut child = Command::new("python3")
        .arg(&driver)
        .arg(&mapping)
        .arg(&record)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    {
        use std::io::Write;
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(inputs.to_string().as_bytes()).unwrap();
    }
    let out = child.wait_with_output().unwrap();
    assert!(
        out.status.success(),
        "generated module failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    normalize(serde_json::from_slice(&out.stdout).unwrap())
}

fn run_rust(schema: &Schema, inputs: &Json) -> Json {
    let program = schema.compile("Orders").unwrap();
    let mut record = MappingRecord::from_json(inputs);
    program.evaluate(&mut record, &EvalContext::new());
    let computed: serde_json::Map<String, Json> = program
        .computed()
        .map(|slot| {
            let value = record.get(slot.field_id.as_str()).cloned().unwrap_or_default();
            (slot.field_id.to_string(), serde_json::to_value(value).unwrap())
        })
        .collect();
    normalize(Json::Object(computed))
}

fn assert_parity(inputs: Json) -> Json {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let expected = run_rust(&schema, &inputs);
    let python = run_python(&schema, &inputs);
    assert_eq!(python["mapping"], expected, "mapping access");
    assert_eq!(python["record"], expected, "record access");
    expected
}

#[test]
fn test_python_matches_interpreter() {
    if !has_python() {
        eprintln!("python3 not found; skipping generated module checks");
        return;
    }

    let out = assert_parity(json!({
        "fldName": "\u{2003}Ada\u{2003}",
        "fldQty": 3,
        "fldPrice": 4,
        "fldWhen": "2024-03-01T12:00:00.000Z",
    }));

    let error = json!({"error": "#VALUE!"});
    assert_eq!(out["fldTotal"], json!(12.0));
    assert_eq!(out["fldLabel"], json!("big / Ada"));
    assert_eq!(out["fldTiny"], json!("0.0000001"));
    assert_eq!(out["fldHuge"], json!("1000000000000000000000"));
    assert_eq!(out["fldNegZero"], json!("-0"));
    assert_eq!(out["fldUnderscore"], error);
    assert_eq!(out["fldInfText"], error);
    assert_eq!(out["fldCompactDate"], error);
    assert_eq!(out["fldOffsetDay"], json!(6.0));
    assert_eq!(out["fldMonthEnd"], json!("2024-02-29T00:00:00.000Z"));
    assert_eq!(out["fldFarFuture"], error);
    assert_eq!(out["fldPastRange"], error);
    assert_eq!(out["fldElapsed"], json!(60.0));
    assert_eq!(out["fldRepeat"], json!("ababab"));
    assert_eq!(out["fldRepeatHuge"], error);
    assert_eq!(out["fldRepeatInf"], error);
    assert_eq!(out["fldRounded"], json!(2.35));
}

#[test]
fn test_python_matches_interpreter_on_sparse_record() {
    if !has_python() {
        eprintln!("python3 not found; skipping generated module checks");
        return;
    }

    let out = assert_parity(json!({"fldQty": "2.5", "fldPrice": "1_0"}));
    assert_eq!(out["fldTotal"], json!({"error": "#VALUE!"}));
    assert_eq!(out["fldLabel"], json!({"error": "#VALUE!"}));
    assert_eq!(out["fldElapsed"], Json::Null);
    assert_eq!(out["fldRepeat"], json!("abab"));
}
