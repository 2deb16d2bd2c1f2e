//! Projection of a dataset's records into an XML document honoring the
//! generated XSD.
//!
//! One `record` element per row in record order; null cells emit an empty
//! element carrying `xsi:nil="true"` so the null/empty-string distinction
//! survives the round trip; every value renders in its canonical textual
//! form so identical records always serialize identically.

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{dataset::Record, error::Result, schema::Schema};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Serialize up to `limit` records (all when `None`) under a root element
/// named after the dataset.
pub fn serialize(
    dataset_name: &str,
    schema: &Schema,
    records: &[Record],
    limit: Option<usize>,
    indent: usize,
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new(dataset_name);
    root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    writer.write_event(Event::Start(root))?;

    let count = limit.unwrap_or(records.len()).min(records.len());
    for record in &records[..count] {
        writer.write_event(Event::Start(BytesStart::new("record")))?;
        for column in &schema.columns {
            match record.value(column.position) {
                Some(value) => {
                    writer.write_event(Event::Start(BytesStart::new(column.name.as_str())))?;
                    let text = value.canonical_text();
                    writer.write_event(Event::Text(BytesText::new(&text)))?;
                    writer.write_event(Event::End(BytesEnd::new(column.name.as_str())))?;
                }
                None => {
                    let mut nil = BytesStart::new(column.name.as_str());
                    nil.push_attribute(("xsi:nil", "true"));
                    writer.write_event(Event::Empty(nil))?;
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new("record")))?;
    }

    writer.write_event(Event::End(BytesEnd::new(dataset_name)))?;

    let bytes = writer.into_inner();
    Ok(String::from_utf8(bytes).expect("generated XML is UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{ColumnSpec, ColumnType},
        value::Value,
    };

    fn sample() -> (Schema, Vec<Record>) {
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
        let records = vec![
            Record::new(vec![Some(Value::Integer(1)), Some(Value::String("a<b".into()))]),
            Record::new(vec![Some(Value::Integer(2)), None]),
        ];
        (schema, records)
    }

    #[test]
    fn null_cells_carry_the_nil_marker() {
        let (schema, records) = sample();
        let xml = serialize("items", &schema, &records, None, 2).unwrap();
        assert!(xml.contains(r#"<note xsi:nil="true"/>"#));
        assert!(!xml.contains("<note></note>"));
    }

    #[test]
    fn text_is_escaped_and_root_is_dataset_name() {
        let (schema, records) = sample();
        let xml = serialize("items", &schema, &records, None, 2).unwrap();
        assert!(xml.contains("<note>a&lt;b</note>"));
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(&format!("<items xmlns:xsi=\"{XSI_NAMESPACE}\">")));
        assert!(xml.trim_end().ends_with("</items>"));
    }

    #[test]
    fn limit_caps_emitted_records() {
        let (schema, records) = sample();
        let xml = serialize("items", &schema, &records, Some(1), 2).unwrap();
        assert_eq!(xml.matches("<record>").count(), 1);
    }
}
