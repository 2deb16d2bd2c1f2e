//! Schema model, type inference, and YAML persistence.
//!
//! This module owns [`Schema`] (the canonical description of a dataset's
//! structure), [`ColumnType`] (the closed six-type system with its widening
//! order), [`ColumnSpec`] per-column metadata, [`ColumnStats`] sampling
//! statistics, and the inference engine that classifies a column's raw text
//! values into the narrowest type parsing all of them.
//!
//! ## Responsibilities
//!
//! - XML-name-safe column name normalization and uniqueness
//! - Candidate-elimination type inference with string fallback
//! - Widening along the fixed generality order (never narrowing)
//! - YAML schema loading and saving via `serde_yaml`

use std::{fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    value,
};

/// Semantic column types, ordered from narrowest to widest. The derived
/// `Ord` follows variant order and is the widening order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Date,
    DateTime,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::String => "string",
        }
    }

    /// The narrower of two types never survives contact with the wider.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        self.max(other)
    }

    pub fn variants() -> &'static [&'static str] {
        &["boolean", "integer", "float", "date", "datetime", "string"]
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "integer" | "int" => Ok(ColumnType::Integer),
            "float" | "double" => Ok(ColumnType::Float),
            "date" => Ok(ColumnType::Date),
            "datetime" | "date-time" | "timestamp" => Ok(ColumnType::DateTime),
            "string" => Ok(ColumnType::String),
            other => Err(CoreError::malformed(format!(
                "unknown column type '{other}'; supported types: {}",
                ColumnType::variants().join(", ")
            ))),
        }
    }
}

/// One column of a schema. `position` is stable insertion order and is
/// never renumbered after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub datatype: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub position: usize,
}

/// Sampling statistics captured at analysis time. Immutable until the
/// dataset is re-imported; never consulted by the generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnStats {
    pub null_count: usize,
    pub unique_count: usize,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Build a schema from already-normalized column names, all typed as
    /// string. The analyzer refines datatypes afterwards.
    pub fn from_headers(headers: &[String]) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(position, name)| ColumnSpec {
                name: name.clone(),
                datatype: ColumnType::String,
                nullable: false,
                unique: false,
                position,
            })
            .collect();
        Schema { columns }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_yaml::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let schema = serde_yaml::from_reader(reader)?;
        Ok(schema)
    }
}

/// Normalize a raw header into a valid XML element name: every character
/// outside `[A-Za-z0-9_]` becomes `_`, a leading digit gets a `_` prefix,
/// and an empty header becomes `_`.
pub fn normalize_xml_name(name: &str) -> String {
    let mut normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if normalized.is_empty() {
        normalized.push('_');
    }
    let first = normalized.chars().next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        normalized.insert(0, '_');
    }
    normalized
}

/// Normalize every header and disambiguate collisions with a numeric
/// suffix, preserving first occurrence untouched.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let base = normalize_xml_name(header);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while seen.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}

/// Candidate-elimination inference: every candidate starts alive and each
/// non-null value kills the candidates it fails to parse under. The
/// narrowest survivor wins; string always survives.
#[derive(Debug, Clone)]
pub struct TypeCandidate {
    possible_boolean: bool,
    possible_integer: bool,
    possible_float: bool,
    possible_date: bool,
    possible_datetime: bool,
}

impl Default for TypeCandidate {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCandidate {
    pub fn new() -> Self {
        Self {
            possible_boolean: true,
            possible_integer: true,
            possible_float: true,
            possible_date: true,
            possible_datetime: true,
        }
    }

    pub fn update(&mut self, raw: &str) {
        if self.possible_boolean && value::parse_boolean(raw).is_none() {
            self.possible_boolean = false;
        }
        if self.possible_integer && value::parse_integer(raw).is_none() {
            self.possible_integer = false;
        }
        if self.possible_float && value::parse_float(raw).is_none() {
            self.possible_float = false;
        }
        if self.possible_date && value::parse_naive_date(raw).is_none() {
            self.possible_date = false;
        }
        if self.possible_datetime && value::parse_naive_datetime(raw).is_none() {
            self.possible_datetime = false;
        }
    }

    pub fn decide(&self) -> ColumnType {
        if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

/// Infer the type and nullability of a single column from its raw cell
/// values (empty string marks null). Never fails: the fallback is string.
pub fn infer_column<'a, I>(values: I) -> (ColumnType, bool)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidate = TypeCandidate::new();
    let mut nullable = false;
    let mut saw_value = false;
    for raw in values {
        if raw.is_empty() {
            nullable = true;
            continue;
        }
        saw_value = true;
        candidate.update(raw);
    }
    if !saw_value {
        return (ColumnType::String, nullable);
    }
    (candidate.decide(), nullable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_follows_generality_order() {
        assert_eq!(
            ColumnType::Boolean.widen(ColumnType::Integer),
            ColumnType::Integer
        );
        assert_eq!(
            ColumnType::Float.widen(ColumnType::Integer),
            ColumnType::Float
        );
        assert_eq!(
            ColumnType::DateTime.widen(ColumnType::String),
            ColumnType::String
        );
    }

    #[test]
    fn inference_widens_monotonically() {
        let (ty, _) = infer_column(["1", "2", "3"]);
        assert_eq!(ty, ColumnType::Integer);

        let (ty, _) = infer_column(["1", "2", "3", "2.5"]);
        assert_eq!(ty, ColumnType::Float);

        let (ty, _) = infer_column(["1", "2", "3", "2.5", "abc"]);
        assert_eq!(ty, ColumnType::String);
    }

    #[test]
    fn inference_flags_nullable_on_missing_values() {
        let (ty, nullable) = infer_column(["4", "", "6"]);
        assert_eq!(ty, ColumnType::Integer);
        assert!(nullable);
    }

    #[test]
    fn all_null_column_falls_back_to_string() {
        let (ty, nullable) = infer_column(["", "", ""]);
        assert_eq!(ty, ColumnType::String);
        assert!(nullable);
    }

    #[test]
    fn zero_one_columns_stay_boolean() {
        let (ty, _) = infer_column(["1", "0", "1"]);
        assert_eq!(ty, ColumnType::Boolean);
    }

    #[test]
    fn iso_dates_infer_date_and_slash_days_widen_to_string() {
        let (ty, _) = infer_column(["2016-08-11", "2016-08-12"]);
        assert_eq!(ty, ColumnType::Date);

        let (ty, _) = infer_column(["11/08/2016", "12/08/2016"]);
        assert_eq!(ty, ColumnType::String);
    }

    #[test]
    fn normalize_xml_name_handles_spaces_digits_and_symbols() {
        assert_eq!(normalize_xml_name("State Name"), "State_Name");
        assert_eq!(normalize_xml_name("2024 total"), "_2024_total");
        assert_eq!(normalize_xml_name("price($)"), "price___");
        assert_eq!(normalize_xml_name(""), "_");
    }

    #[test]
    fn normalize_headers_disambiguates_collisions() {
        let headers = vec!["a b".to_string(), "a-b".to_string(), "a_b".to_string()];
        assert_eq!(normalize_headers(&headers), vec!["a_b", "a_b_2", "a_b_3"]);
    }

    #[test]
    fn schema_round_trips_through_yaml() {
        let schema = Schema {
            columns: vec![
                ColumnSpec {
                    name: "id".into(),
                    datatype: ColumnType::Integer,
                    nullable: false,
                    unique: true,
                    position: 0,
                },
                ColumnSpec {
                    name: "note".into(),
                    datatype: ColumnType::String,
                    nullable: true,
                    unique: false,
                    position: 1,
                },
            ],
        };
        let file = tempfile::NamedTempFile::new().expect("temp file");
        schema.save(file.path()).expect("save");
        let loaded = Schema::load(file.path()).expect("load");
        assert_eq!(loaded, schema);
    }

    #[test]
    fn column_type_round_trips_through_str() {
        for token in ColumnType::variants() {
            let parsed: ColumnType = token.parse().expect("known variant");
            assert_eq!(parsed.as_str(), *token);
        }
        assert!("geometry".parse::<ColumnType>().is_err());
    }
}
