//! WASM binding tests
//!
//! Run with: wasm-pack test --node

#![cfg(target_arch = "wasm32")]

use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

use airscope_wasm::*;

wasm_bindgen_test_configure!(run_in_browser);

const SCHEMA: &str = r#"{"tables": [{
    "id": "tblOrders", "name": "Orders", "primaryFieldId": "fldName",
    "fields": [
        {"id": "fldName", "name": "Name", "type": "singleLineText"},
        {"id": "fldQty", "name": "Qty", "type": "number"},
        {"id": "fldPrice", "name": "Price", "type": "currency"},
        {"id": "fldTotal", "name": "Total", "type": "formula",
         "options": {"formula": "{Qty} * {Price}"}},
        {"id": "fldTax", "name": "Tax", "type": "formula",
         "options": {"formula": "{Total} * 0.2"}}
    ]
}]}"#;

fn get(object: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(object, &JsValue::from_str(key)).unwrap()
}

// =============================================================================
// Schema Tests
// =============================================================================

#[wasm_bindgen_test]
fn test_schema_new() {
    let schema = Schema::new(SCHEMA).unwrap();
    assert_eq!(schema.table_count(), 1);
    assert_eq!(schema.table_names(), vec!["Orders".to_string()]);
    assert_eq!(
        schema.formula_fields("Orders").unwrap(),
        vec!["Total".to_string(), "Tax".to_string()]
    );
}

#[wasm_bindgen_test]
fn test_schema_invalid_json() {
    assert!(Schema::new("{\"tables\": 3}").is_err());
}

#[wasm_bindgen_test]
fn test_graph() {
    let schema = Schema::new(SCHEMA).unwrap();
    let graph = schema.graph("Orders").unwrap();

    let nodes = js_sys::Array::from(&get(&graph, "nodes"));
    assert_eq!(nodes.length(), 5);
    let edges = js_sys::Array::from(&get(&graph, "edges"));
    assert_eq!(edges.length(), 3);
    assert!(get(&graph, "cycle").is_null());

    let tax = nodes.get(4);
    assert_eq!(get(&tax, "depth").as_f64(), Some(2.0));
}

#[wasm_bindgen_test]
fn test_traversal() {
    let schema = Schema::new(SCHEMA).unwrap();
    let upstream = schema.ancestors("Orders", "Tax", JsValue::UNDEFINED).unwrap();
    let nodes = js_sys::Array::from(&get(&upstream, "nodes"));
    assert_eq!(nodes.length(), 4);
    assert_eq!(get(&upstream, "truncated").as_bool(), Some(false));
}

// =============================================================================
// Compression and generation
// =============================================================================

#[wasm_bindgen_test]
fn test_compress() {
    let schema = Schema::new(SCHEMA).unwrap();
    let compressed = schema.compress("Orders", "Tax", JsValue::NULL).unwrap();
    assert_eq!(
        get(&compressed, "text").as_string().unwrap(),
        "{Qty}*{Price}*0.2"
    );
}

#[wasm_bindgen_test]
fn test_generate() {
    let schema = Schema::new(SCHEMA).unwrap();
    let source = schema.generate("Orders", JsValue::UNDEFINED).unwrap();
    assert!(source.contains("def compute_tax(values):"));
}

#[wasm_bindgen_test]
fn test_evaluate() {
    let schema = Schema::new(SCHEMA).unwrap();
    let record = js_sys::Object::new();
    js_sys::Reflect::set(&record, &"fldQty".into(), &JsValue::from(3)).unwrap();
    js_sys::Reflect::set(&record, &"fldPrice".into(), &JsValue::from(5)).unwrap();

    let result = schema.evaluate("Orders", record.into()).unwrap();
    assert_eq!(get(&result, "fldTotal").as_f64(), Some(15.0));
    assert_eq!(get(&result, "fldTax").as_f64(), Some(3.0));
}

#[wasm_bindgen_test]
fn test_analyze_table() {
    let schema = Schema::new(SCHEMA).unwrap();
    let report = schema.analyze_table("Orders").unwrap();
    assert_eq!(get(&report, "maxDepth").as_f64(), Some(2.0));
    let unused = js_sys::Array::from(&get(&report, "unusedFields"));
    assert_eq!(unused.get(0).as_string().unwrap(), "fldTax");
}

// =============================================================================
// Formula helpers
// =============================================================================

#[wasm_bindgen_test]
fn test_format_formula() {
    assert_eq!(
        format_formula_js("IF( {A} > 1 , 'x', 'y' )", None).unwrap(),
        "IF({A}>1,\"x\",\"y\")"
    );
    assert!(format_formula_js("1 +", None).is_err());
    assert!(format_formula_js("1", Some("fancy".to_string())).is_err());
}

#[wasm_bindgen_test]
fn test_parse_formula() {
    let ast = parse_formula_js("1 + 2").unwrap();
    assert!(ast.is_object());
}
