//! Deterministic projection of a [`Schema`] into an XSD document.
//!
//! The generated schema declares one root element named after the dataset
//! containing a repeating `record` complex type; each column becomes an
//! element declaration with the fixed semantic-to-XSD type mapping.
//! Identical schema input always yields byte-identical output.

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, Event},
};

use crate::{
    error::Result,
    schema::{ColumnType, Schema},
};

pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Fixed semantic-to-XSD type mapping.
pub fn xsd_type(datatype: ColumnType) -> &'static str {
    match datatype {
        ColumnType::String => "xs:string",
        ColumnType::Integer => "xs:integer",
        ColumnType::Float => "xs:decimal",
        ColumnType::Boolean => "xs:boolean",
        ColumnType::Date => "xs:date",
        ColumnType::DateTime => "xs:dateTime",
    }
}

/// Generate the validating schema for a dataset. Pure function of its
/// inputs; indentation is fixed so output is reproducible byte for byte.
pub fn generate(dataset_name: &str, schema: &Schema, indent: usize) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("xs:schema");
    root.push_attribute(("xmlns:xs", XS_NAMESPACE));
    root.push_attribute(("elementFormDefault", "qualified"));
    root.push_attribute(("attributeFormDefault", "unqualified"));
    writer.write_event(Event::Start(root))?;

    let mut dataset_element = BytesStart::new("xs:element");
    dataset_element.push_attribute(("name", dataset_name));
    writer.write_event(Event::Start(dataset_element))?;
    writer.write_event(Event::Start(BytesStart::new("xs:complexType")))?;
    writer.write_event(Event::Start(BytesStart::new("xs:sequence")))?;

    let mut record_element = BytesStart::new("xs:element");
    record_element.push_attribute(("name", "record"));
    record_element.push_attribute(("minOccurs", "0"));
    record_element.push_attribute(("maxOccurs", "unbounded"));
    writer.write_event(Event::Start(record_element))?;
    writer.write_event(Event::Start(BytesStart::new("xs:complexType")))?;
    writer.write_event(Event::Start(BytesStart::new("xs:sequence")))?;

    for column in &schema.columns {
        let mut field = BytesStart::new("xs:element");
        field.push_attribute(("name", column.name.as_str()));
        field.push_attribute(("type", xsd_type(column.datatype)));
        if column.nullable {
            field.push_attribute(("minOccurs", "0"));
            field.push_attribute(("nillable", "true"));
        }
        writer.write_event(Event::Empty(field))?;
    }

    writer.write_event(Event::End(BytesEnd::new("xs:sequence")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:complexType")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:element")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:sequence")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:complexType")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:element")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:schema")))?;

    let bytes = writer.into_inner();
    // The writer only ever emits valid UTF-8.
    Ok(String::from_utf8(bytes).expect("generated XSD is UTF-8"))
}
