//! Integration tests for the conform, projection and transform stages

use std::fs;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::Span;

use harvit::conform::{Extraction, FieldExtractor};
use harvit::{
    Cancellation, Conformer, FieldType, FieldValue, Harvested, Pipeline, PipelineError, Plan,
    RawValue, RecordSchema, Sanitized, ScriptError, ScriptFailurePolicy, ScriptLimits,
    ScriptTransformer, StaticHarvester, Transformer, ValueKind,
};

const PLAN: &str = r##"
source: https://example.com/products/42
user_agents:
  - Mozilla/5.0 (X11; Linux x86_64)
fields:
  - name: title
    type: text
    selector: "#app > h1"
  - name: numberWithText
    type: number
    selector: "#app > .number"
  - name: productId
    type: number
    selector: "#app > .id"
    regex: "(\\d+)"
  - name: priceWithCurrency
    type: decimal
    selector: "#app > .price"
  - name: textList
    type: text
    selector: "#app > ul > li"
  - name: publishedAt
    type: datetime
    selector: "#app > time"
    format: d/m/Y H:i:s
  - name: localTime
    type: datetime
    selector: "#app > time"
    format: d/m/Y H:i:s
    timezone: Indian/Mauritius
  - name: raw
    type: raw
    selector: "#app > .raw"
"##;

fn plan() -> Plan {
    Plan::from_yaml_str(PLAN).unwrap()
}

fn harvested() -> Harvested {
    let mut doc = Harvested::new();
    doc.insert("title".into(), RawValue::from("  Product title \n"));
    doc.insert("numberWithText".into(), RawValue::from("This is some leet number: 1337"));
    doc.insert("productId".into(), RawValue::from("id-42-x"));
    doc.insert("priceWithCurrency".into(), RawValue::from("Rs 13.37"));
    doc.insert("textList".into(), RawValue::from(vec!["a", "b", "c"]));
    doc.insert("publishedAt".into(), RawValue::from("08/06/2022 19:53:44"));
    doc.insert("localTime".into(), RawValue::from("08/06/2022 19:53:44"));
    doc.insert("raw".into(), RawValue::from("<p>raw</p>"));
    doc.insert("notInPlan".into(), RawValue::from("ignored"));
    doc
}

#[test]
fn test_number_conversion() {
    let plan = plan();
    let conformer = Conformer::new(&plan.fields);

    assert_eq!(conformer.sanitize("numberWithText", "  1337 "), Some(FieldValue::Integer(1337)));
    assert_eq!(conformer.sanitize("numberWithText", "abc"), Some(FieldValue::Integer(0)));
}

#[test]
fn test_decimal_conversion() {
    let plan = plan();
    let conformer = Conformer::new(&plan.fields);

    assert_eq!(conformer.sanitize("priceWithCurrency", "13.37"), Some(FieldValue::Float(13.37)));
    assert_eq!(
        conformer.sanitize("priceWithCurrency", "not-a-number"),
        Some(FieldValue::Float(0.0))
    );
}

#[test]
fn test_regex_extraction_precedes_conversion() {
    let extractor = FieldExtractor::compile(r"(\d+)", &Span::none()).unwrap();
    assert_eq!(extractor.extract("id-42-x"), Extraction::Captured("42"));

    let plan = plan();
    let sanitized = Conformer::new(&plan.fields).conform(&harvested());
    assert_eq!(sanitized["product_id"], FieldValue::Integer(42));
}

#[test]
fn test_regex_without_match_yields_zero() {
    let plan = plan();
    let conformer = Conformer::new(&plan.fields);

    assert_eq!(conformer.sanitize("productId", "no digits here"), Some(FieldValue::Integer(0)));
}

#[test]
fn test_conformed_document() {
    let plan = plan();
    let sanitized: Sanitized = Conformer::new(&plan.fields).conform(&harvested());

    assert_eq!(sanitized["title"], FieldValue::from("Product title"));
    assert_eq!(sanitized["number_with_text"], FieldValue::Integer(1337));
    assert_eq!(sanitized["price_with_currency"], FieldValue::Float(13.37));
    assert_eq!(sanitized["text_list"], FieldValue::from(vec!["a", "b", "c"]));
    assert_eq!(sanitized["raw"], FieldValue::from("<p>raw</p>"));
    assert!(!sanitized.contains_key("notInPlan"));
    assert!(!sanitized.contains_key("not_in_plan"));
}

#[test]
fn test_datetime_is_host_independent() {
    let plan = plan();
    let sanitized = Conformer::new(&plan.fields).conform(&harvested());

    assert_eq!(sanitized["published_at"], FieldValue::from("2022-06-08T19:53:44+00:00"));
    assert_eq!(sanitized["local_time"], FieldValue::from("2022-06-08T23:53:44+04:00"));
}

#[test]
fn test_projection_exposes_only_declared_property() {
    let fields = vec![harvit::Field::new("numberWithText", FieldType::new(ValueKind::Number), "p")];
    let schema = RecordSchema::from_fields(&fields);

    let mut sanitized = Sanitized::new();
    sanitized.insert("number_with_text".into(), FieldValue::Integer(1337));

    let record = schema.project(&sanitized).unwrap();

    assert_eq!(serde_json::to_value(&record).unwrap(), json!({"number_with_text": 1337}));
}

#[test]
fn test_pipeline_output_has_every_plan_property() {
    let pipeline = Pipeline::new(&plan()).unwrap();

    let record = pipeline.run(&harvested(), &Cancellation::never()).unwrap();
    let mut keys: Vec<&str> = record.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();

    assert_eq!(
        keys,
        vec![
            "local_time",
            "number_with_text",
            "price_with_currency",
            "product_id",
            "published_at",
            "raw",
            "text_list",
            "title",
        ]
    );
    assert_eq!(record["text_list"], json!(["a", "b", "c"]));
}

#[test]
fn test_empty_document_projects_zero_values() {
    let pipeline = Pipeline::new(&plan()).unwrap();

    let record = pipeline.run(&Harvested::new(), &Cancellation::never()).unwrap();

    assert_eq!(
        record,
        json!({
            "title": "",
            "number_with_text": 0,
            "product_id": 0,
            "price_with_currency": 0.0,
            "text_list": "",
            "published_at": "",
            "local_time": "",
            "raw": ""
        })
    );
}

#[test]
fn test_unbounded_script_is_interrupted() {
    let limits = ScriptLimits {
        timeout: Duration::from_millis(300),
        ..ScriptLimits::default()
    };
    let script = ScriptTransformer::with_limits("loop { data.spin = true; }", limits).unwrap();
    let pipeline = Pipeline::new(&plan()).unwrap().with_script(script);

    let started = Instant::now();
    let result = pipeline.run(&harvested(), &Cancellation::never());

    assert!(matches!(result, Err(PipelineError::Script(ScriptError::Timeout(_)))));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_script_failure_can_keep_record() {
    let script = ScriptTransformer::new(r#"throw "bad data";"#).unwrap();
    let pipeline = Pipeline::new(&plan())
        .unwrap()
        .with_script(script)
        .with_failure_policy(ScriptFailurePolicy::KeepRecord);

    let record = pipeline.run(&harvested(), &Cancellation::never()).unwrap();

    assert_eq!(record["number_with_text"], json!(1337));
}

#[test]
fn test_plan_and_script_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("transformers")).unwrap();
    fs::write(
        dir.path().join("transformers/shout.rhai"),
        "data.title = data.title.to_upper();\ndata.fields = fields.len();\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("plan.yml"),
        format!("transformer: transformers/shout.rhai\n{}", PLAN),
    )
    .unwrap();

    let plan = Plan::load_from_file(dir.path().join("plan.yml")).unwrap();
    let pipeline = Pipeline::from_plan(&plan, ScriptLimits::default()).unwrap();
    assert!(pipeline.has_transformer());

    let record = pipeline.run(&harvested(), &Cancellation::never()).unwrap();

    assert_eq!(record["title"], json!("PRODUCT TITLE"));
    assert_eq!(record["fields"], json!(8));
}

#[test]
fn test_static_harvester_batch() {
    let harvester = StaticHarvester::from_json_str(
        r#"[
            {"numberWithText": "n: 1", "textList": ["x"]},
            {"numberWithText": "n: 2", "notInPlan": "dropped"}
        ]"#,
    )
    .unwrap();
    let plan = plan();
    let pipeline = Pipeline::new(&plan).unwrap().with_projection(false);

    let records = pipeline
        .harvest_and_run(&harvester, &plan, &Cancellation::never())
        .unwrap();

    assert_eq!(records, vec![
        json!({"number_with_text": 1, "text_list": ["x"]}),
        json!({"number_with_text": 2}),
    ]);
}

#[tokio::test]
async fn test_async_script_with_cancellation() {
    let limits = ScriptLimits {
        timeout: Duration::from_secs(30),
        ..ScriptLimits::default()
    };
    let script = ScriptTransformer::with_limits("while true { }", limits).unwrap();
    let (handle, cancellation) = Cancellation::new();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let result = script
        .transform_async(plan().fields, json!({}), cancellation)
        .await;

    assert!(matches!(result, Err(ScriptError::Cancelled)));
}

#[test]
fn test_script_sees_record_through_trait_object() {
    let script = ScriptTransformer::new("data.count = data.len();").unwrap();
    let transformer: &dyn Transformer = &script;

    let out = transformer
        .transform(&plan().fields, &json!({"a": 1, "b": 2}), &Cancellation::never())
        .unwrap();

    assert_eq!(out["count"], json!(2));
}
