mod common;

use common::TestWorkspace;
use tabxml::config::CoreConfig;
use tabxml::dataset::{DatasetStatus, LogLevel};
use tabxml::service::DatasetService;
use tabxml::value::Value;

#[test]
fn import_builds_typed_records_in_order() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv(
        "crops.csv",
        &[
            "Crop,Area,Organic",
            "Rice,120.5,true",
            "Wheat,80,false",
            "Maize,,true",
        ],
    );
    let service = DatasetService::default();
    let id = service.import_csv(&path, None, None).expect("import");

    service
        .with_dataset(id, |dataset| {
            assert_eq!(dataset.status(), DatasetStatus::Completed);
            assert_eq!(dataset.total_rows(), 3);
            assert_eq!(dataset.total_columns(), 3);
            let schema = dataset.schema();
            let first = &dataset.records()[0];
            assert_eq!(
                first.field(schema, "Crop"),
                Some(&Value::String("Rice".to_string()))
            );
            assert_eq!(first.field(schema, "Area"), Some(&Value::Float(120.5)));
            assert_eq!(first.field(schema, "Organic"), Some(&Value::Boolean(true)));
            assert_eq!(dataset.records()[2].field(schema, "Area"), None);
        })
        .expect("dataset lookup");
}

#[test]
fn import_logs_batches_and_success() {
    let ws = TestWorkspace::new();
    let mut lines = vec!["n".to_string()];
    for i in 0..25 {
        lines.push(i.to_string());
    }
    let path = ws.write("numbers.csv", &(lines.join("\n") + "\n"));
    let config = CoreConfig {
        batch_size: 10,
        ..CoreConfig::default()
    };
    let service = DatasetService::new(config);
    let id = service.import_csv(&path, None, None).expect("import");

    let logs = service.logs(id).expect("logs");
    let batch_entries = logs
        .iter()
        .filter(|e| e.level == LogLevel::Info && e.message.starts_with("Imported"))
        .count();
    assert_eq!(batch_entries, 2);
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Success && e.message.contains("imported 25 rows")));
}

#[test]
fn dataset_name_defaults_to_normalized_file_stem() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv("crop production.csv", &["a,b", "1,2"]);
    let service = DatasetService::default();
    let id = service.import_csv(&path, None, None).expect("import");
    service
        .with_dataset(id, |dataset| {
            assert_eq!(dataset.name(), "crop_production");
        })
        .expect("dataset lookup");
    assert_eq!(service.dataset_id("crop_production"), Some(id));
}

#[test]
fn reimport_under_same_name_replaces_records_atomically() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv("stock.csv", &["sku,qty", "a,1", "b,2"]);
    let service = DatasetService::default();
    let id = service.import_csv(&path, None, None).expect("first import");
    let generation_before = service
        .with_dataset(id, |d| d.generation())
        .expect("generation");

    service.generate_xsd(id).expect("xsd");
    service.generate_xml(id, None).expect("xml");

    ws.write_csv("stock.csv", &["sku,qty", "a,5", "b,6", "c,7"]);
    let same_id = service.import_csv(&path, None, None).expect("re-import");
    assert_eq!(same_id, id);

    service
        .with_dataset(id, |dataset| {
            assert_eq!(dataset.total_rows(), 3);
            assert!(dataset.generation() > generation_before);
            assert!(dataset.xml_artifact().is_none());
            assert!(dataset.xsd_artifact().is_none());
        })
        .expect("dataset lookup");
}

#[test]
fn failed_import_marks_dataset_failed_and_keeps_log() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv("bad.csv", &["a,b,c", "1,2", "1,2,3,4"]);
    let service = DatasetService::default();
    let err = service.import_csv(&path, Some("bad"), None).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");

    let id = service.dataset_id("bad").expect("registered");
    service
        .with_dataset(id, |dataset| {
            assert_eq!(dataset.status(), DatasetStatus::Failed);
        })
        .expect("dataset lookup");
    let logs = service.logs(id).expect("logs");
    assert!(logs.iter().any(|e| e.level == LogLevel::Error));
}

#[test]
fn coercion_fallback_is_logged_not_fatal() {
    let ws = TestWorkspace::new();
    // The sampled prefix says integer; a row past the sample disagrees.
    let mut lines = vec!["n".to_string()];
    for i in 0..30 {
        lines.push(i.to_string());
    }
    let path = ws.write("mostly_numbers.csv", &(lines.join("\n") + "\n"));
    let config = CoreConfig {
        sample_rows: 20,
        ..CoreConfig::default()
    };
    // Appended after the first write so the sampled prefix stays numeric.
    let mut contents = std::fs::read_to_string(&path).expect("read back");
    contents.push_str("not-a-number\n");
    std::fs::write(&path, contents).expect("append");

    let service = DatasetService::new(config);
    let id = service.import_csv(&path, None, None).expect("import");

    service
        .with_dataset(id, |dataset| {
            assert_eq!(dataset.total_rows(), 31);
            let schema = dataset.schema();
            let last = dataset.records().last().expect("records");
            assert_eq!(
                last.field(schema, "n"),
                Some(&Value::String("not-a-number".to_string()))
            );
        })
        .expect("dataset lookup");
    let logs = service.logs(id).expect("logs");
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Warning && e.message.contains("defaulted to string")));
}

#[test]
fn log_entries_are_append_only_and_survive_reimport() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv("log.csv", &["a", "1"]);
    let service = DatasetService::default();
    let id = service.import_csv(&path, None, None).expect("import");
    let before = service.logs(id).expect("logs");

    service.refresh(id).expect("refresh");
    let after = service.logs(id).expect("logs");
    assert!(after.len() > before.len());
    // Earlier entries are never rewritten, only appended to.
    assert!(before
        .iter()
        .zip(after.iter())
        .all(|(a, b)| a.message == b.message && a.timestamp == b.timestamp));
}
