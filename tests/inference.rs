mod common;

use common::TestWorkspace;
use tabxml::analyze::{self, DELIMITER_CANDIDATES};
use tabxml::config::CoreConfig;
use tabxml::schema::ColumnType;

#[test]
fn analyzer_detects_each_candidate_delimiter() {
    let ws = TestWorkspace::new();
    let cases = [
        ("comma.csv", "id,name\n1,alpha\n2,beta", b','),
        ("semicolon.csv", "id;name\n1;alpha\n2;beta", b';'),
        ("tab.csv", "id\tname\n1\talpha\n2\tbeta", b'\t'),
        ("pipe.csv", "id|name\n1|alpha\n2|beta", b'|'),
    ];
    for (name, contents, expected) in cases {
        let path = ws.write(name, contents);
        let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
        assert_eq!(analysis.delimiter, expected, "file {name}");
        assert_eq!(analysis.schema.columns.len(), 2);
    }
    assert_eq!(DELIMITER_CANDIDATES, [b',', b';', b'\t', b'|']);
}

#[test]
fn analyzer_infers_types_per_column() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv(
        "mixed.csv",
        &[
            "count,price,flag,seen,stamp,label",
            "1,2.5,true,2024-01-01,2024-01-01T08:30:00,alpha",
            "2,3.0,false,2024-01-02,2024-01-02T09:45:00,beta",
            "3,4.25,yes,2024-01-03,2024-01-03 10:00:00,gamma",
        ],
    );
    let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
    let types: Vec<ColumnType> = analysis
        .schema
        .columns
        .iter()
        .map(|c| c.datatype)
        .collect();
    assert_eq!(
        types,
        vec![
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Boolean,
            ColumnType::Date,
            ColumnType::DateTime,
            ColumnType::String,
        ]
    );
}

#[test]
fn null_counts_and_nullable_flags_reflect_empty_cells() {
    let ws = TestWorkspace::new();
    let mut lines = vec!["id,value".to_string()];
    for i in 0..10 {
        if i == 3 || i == 7 {
            lines.push(format!("{i},"));
        } else {
            lines.push(format!("{i},{}", i * 2));
        }
    }
    let path = ws.write("nulls.csv", &(lines.join("\n") + "\n"));
    let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
    assert!(!analysis.schema.columns[0].nullable);
    assert!(analysis.schema.columns[1].nullable);
    assert_eq!(analysis.stats[1].null_count, 2);
    assert_eq!(analysis.stats[1].unique_count, 8);
}

#[test]
fn uniqueness_heuristic_requires_all_distinct_and_no_nulls() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv(
        "unique.csv",
        &["id,category", "1,a", "2,a", "3,b", "4,b"],
    );
    let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
    assert!(analysis.schema.columns[0].unique);
    assert!(!analysis.schema.columns[1].unique);
}

#[test]
fn header_names_are_normalized_for_xml_safety() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv(
        "headers.csv",
        &["State Name,2024 total,price($)", "Kerala,10,1.5"],
    );
    let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
    let names: Vec<&str> = analysis
        .schema
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["State_Name", "_2024_total", "price___"]);
}

#[test]
fn sample_values_are_capped_and_distinct() {
    let ws = TestWorkspace::new();
    let mut lines = vec!["v".to_string()];
    for i in 0..20 {
        lines.push(format!("val{}", i % 8));
    }
    let path = ws.write("samples.csv", &(lines.join("\n") + "\n"));
    let config = CoreConfig::default();
    let analysis = analyze::analyze_path(&path, &config).expect("analyze");
    assert_eq!(analysis.stats[0].sample_values.len(), config.sample_value_cap);
    assert_eq!(analysis.stats[0].unique_count, 8);
}

#[test]
fn sample_rows_bound_limits_the_scan() {
    let ws = TestWorkspace::new();
    let mut lines = vec!["n".to_string()];
    for i in 0..50 {
        lines.push(i.to_string());
    }
    let path = ws.write("big.csv", &(lines.join("\n") + "\n"));
    let config = CoreConfig {
        sample_rows: 10,
        ..CoreConfig::default()
    };
    let analysis = analyze::analyze_path(&path, &config).expect("analyze");
    assert_eq!(analysis.rows_sampled, 10);
    assert_eq!(analysis.stats[0].unique_count, 10);
}

#[test]
fn zero_data_rows_is_malformed_input() {
    let ws = TestWorkspace::new();
    let path = ws.write("empty.csv", "id,name\n");
    let err = analyze::analyze_path(&path, &CoreConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");

    let path = ws.write("blank.csv", "");
    let err = analyze::analyze_path(&path, &CoreConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");
}

#[test]
fn ragged_structure_is_malformed_input() {
    let ws = TestWorkspace::new();
    let path = ws.write_csv("ragged.csv", &["a,b,c", "1,2", "1,2,3,4"]);
    let err = analyze::analyze_path(&path, &CoreConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "malformed_input");
}

#[test]
fn non_utf8_input_falls_back_to_configured_encoding() {
    let ws = TestWorkspace::new();
    let path = ws.path().join("latin.csv");
    // "café" encoded as windows-1252: the 0xE9 byte is invalid UTF-8.
    std::fs::write(&path, b"name,qty\ncaf\xE9,3\n").expect("write fixture");
    let analysis = analyze::analyze_path(&path, &CoreConfig::default()).expect("analyze");
    assert_eq!(analysis.encoding, encoding_rs::WINDOWS_1252);
    assert_eq!(analysis.stats[0].sample_values[0], "café");
}
