//! Validation of an XML document against the generated XSD.
//!
//! The validator compiles the XSD subset emitted by [`crate::xsd`] into a
//! flat field-declaration model, then streams the instance document and
//! collects every violation with a location path and a human-readable
//! reason. A well-formed document that fails validation is a normal,
//! reported result; only a corrupt schema document is an error.

use std::sync::OnceLock;

use quick_xml::{Reader, events::Event};
use regex::Regex;
use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsdType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

impl XsdType {
    fn from_token(token: &str) -> Option<Self> {
        match token.trim_start_matches("xs:") {
            "string" => Some(XsdType::String),
            "integer" => Some(XsdType::Integer),
            "decimal" => Some(XsdType::Decimal),
            "boolean" => Some(XsdType::Boolean),
            "date" => Some(XsdType::Date),
            "dateTime" => Some(XsdType::DateTime),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            XsdType::String => "xs:string",
            XsdType::Integer => "xs:integer",
            XsdType::Decimal => "xs:decimal",
            XsdType::Boolean => "xs:boolean",
            XsdType::Date => "xs:date",
            XsdType::DateTime => "xs:dateTime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub datatype: XsdType,
    pub optional: bool,
    pub nillable: bool,
}

/// The compiled shape of a generated schema: a root element wrapping
/// repeated `record` elements with an ordered field sequence.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub root: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| CoreError::malformed(format!("bad XML attribute: {err}")))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| CoreError::malformed(format!("bad attribute value: {err}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Compile an XSD document into the validator's field model. Only the
/// subset emitted by the generator is understood; anything else is a
/// structural failure of the schema artifact.
pub fn compile_xsd(xsd: &str) -> Result<CompiledSchema> {
    let mut reader = Reader::from_str(xsd);
    let mut buf = Vec::new();

    let mut root: Option<String> = None;
    let mut fields: Vec<FieldDecl> = Vec::new();
    // Nesting depth of xs:element containers seen so far: 0 = none,
    // 1 = inside the root declaration, 2 = inside the record declaration.
    let mut element_depth = 0usize;
    let mut saw_schema = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag_name(e.name().as_ref());
                match name.as_str() {
                    "xs:schema" => saw_schema = true,
                    "xs:element" => {
                        let declared = attr_value(&e, "name")?.ok_or_else(|| {
                            CoreError::malformed("xs:element declaration without a name")
                        })?;
                        match element_depth {
                            0 => root = Some(declared),
                            1 => {
                                if declared != "record" {
                                    return Err(CoreError::malformed(format!(
                                        "expected repeating 'record' declaration, found '{declared}'"
                                    )));
                                }
                            }
                            _ => {
                                fields.push(parse_field(&e, declared)?);
                            }
                        }
                        element_depth += 1;
                    }
                    "xs:complexType" | "xs:sequence" => {}
                    other => {
                        return Err(CoreError::malformed(format!(
                            "unsupported schema construct '{other}'"
                        )));
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(e.name().as_ref());
                if name == "xs:element" {
                    let declared = attr_value(&e, "name")?.ok_or_else(|| {
                        CoreError::malformed("xs:element declaration without a name")
                    })?;
                    if element_depth < 2 {
                        return Err(CoreError::malformed(format!(
                            "field declaration '{declared}' outside the record sequence"
                        )));
                    }
                    fields.push(parse_field(&e, declared)?);
                }
            }
            Ok(Event::End(e)) => {
                if tag_name(e.name().as_ref()) == "xs:element" {
                    element_depth = element_depth.saturating_sub(1);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(CoreError::malformed(format!(
                    "schema document is not well-formed: {err}"
                )));
            }
        }
        buf.clear();
    }

    if !saw_schema {
        return Err(CoreError::malformed("document is not an XSD schema"));
    }
    let root = root.ok_or_else(|| CoreError::malformed("schema declares no root element"))?;
    Ok(CompiledSchema { root, fields })
}

fn parse_field(e: &quick_xml::events::BytesStart<'_>, name: String) -> Result<FieldDecl> {
    let type_token = attr_value(e, "type")?
        .ok_or_else(|| CoreError::malformed(format!("field '{name}' declares no type")))?;
    let datatype = XsdType::from_token(&type_token).ok_or_else(|| {
        CoreError::malformed(format!("unsupported XSD type '{type_token}' on field '{name}'"))
    })?;
    let optional = attr_value(e, "minOccurs")?.as_deref() == Some("0");
    let nillable = attr_value(e, "nillable")?.as_deref() == Some("true");
    Ok(FieldDecl {
        name,
        datatype,
        optional,
        nillable,
    })
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("static pattern"))
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").expect("static pattern"))
}

/// Check one text value against the lexical space of its XSD type.
fn lexically_valid(text: &str, datatype: XsdType) -> bool {
    match datatype {
        XsdType::String => true,
        XsdType::Integer => integer_pattern().is_match(text),
        XsdType::Decimal => decimal_pattern().is_match(text),
        XsdType::Boolean => matches!(text, "true" | "false" | "1" | "0"),
        XsdType::Date => chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
        XsdType::DateTime => {
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
                || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        }
    }
}

#[derive(Debug)]
struct ChildElement {
    name: String,
    nil: bool,
    text: String,
}

/// Validate an XML document against an XSD document. Collects every
/// violation instead of stopping at the first.
pub fn validate(xml: &str, xsd: &str) -> Result<ValidationReport> {
    let compiled = compile_xsd(xsd)?;
    Ok(validate_against(xml, &compiled))
}

/// Validate against an already-compiled schema.
pub fn validate_against(xml: &str, compiled: &CompiledSchema) -> ValidationReport {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut issues: Vec<ValidationIssue> = Vec::new();
    let mut depth = 0usize;
    let mut record_index = 0usize;
    let mut current_children: Vec<ChildElement> = Vec::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag_name(e.name().as_ref());
                let nil = nil_attr(&e);
                open_element(
                    compiled,
                    depth,
                    &name,
                    nil,
                    &mut record_index,
                    &mut current_children,
                    &mut current_text,
                    &mut issues,
                );
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                // Self-closing elements open and close in one event.
                let name = tag_name(e.name().as_ref());
                let nil = nil_attr(&e);
                open_element(
                    compiled,
                    depth,
                    &name,
                    nil,
                    &mut record_index,
                    &mut current_children,
                    &mut current_text,
                    &mut issues,
                );
                if depth == 1 {
                    // An empty <record/> still validates its (absent) fields.
                    validate_record(compiled, record_index, &current_children, &mut issues);
                }
            }
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let name = tag_name(e.name().as_ref());
                depth = depth.saturating_sub(1);
                match depth {
                    2 => {
                        if let Some(child) = current_children.last_mut() {
                            if child.name == name {
                                child.text = current_text.trim().to_string();
                            }
                        }
                        current_text.clear();
                    }
                    1 => {
                        if name == "record" {
                            validate_record(
                                compiled,
                                record_index,
                                &current_children,
                                &mut issues,
                            );
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => {
                if depth > 0 {
                    issues.push(ValidationIssue {
                        location: format!("byte {}", reader.buffer_position()),
                        reason: format!(
                            "document is not well-formed: {depth} element(s) left unclosed"
                        ),
                    });
                }
                break;
            }
            Ok(_) => {}
            Err(err) => {
                issues.push(ValidationIssue {
                    location: format!("byte {}", reader.buffer_position()),
                    reason: format!("document is not well-formed: {err}"),
                });
                break;
            }
        }
        buf.clear();
    }

    ValidationReport::from_issues(issues)
}

fn nil_attr(e: &quick_xml::events::BytesStart<'_>) -> bool {
    e.attributes().any(|attr| {
        attr.map(|attr| {
            let value = attr.value.as_ref();
            attr.key.as_ref() == b"xsi:nil" && (value == b"true" || value == b"1")
        })
        .unwrap_or(false)
    })
}

/// Shared open-tag handling for `Start` and `Empty` events.
#[allow(clippy::too_many_arguments)]
fn open_element(
    compiled: &CompiledSchema,
    depth: usize,
    name: &str,
    nil: bool,
    record_index: &mut usize,
    current_children: &mut Vec<ChildElement>,
    current_text: &mut String,
    issues: &mut Vec<ValidationIssue>,
) {
    match depth {
        0 => {
            if name != compiled.root {
                issues.push(ValidationIssue {
                    location: format!("/{name}"),
                    reason: format!(
                        "root element '{name}' does not match schema root '{}'",
                        compiled.root
                    ),
                });
            }
        }
        1 => {
            if name != "record" {
                issues.push(ValidationIssue {
                    location: format!("/{}/{name}", compiled.root),
                    reason: format!("unexpected element '{name}', expected 'record'"),
                });
            }
            *record_index += 1;
            current_children.clear();
        }
        2 => {
            current_children.push(ChildElement {
                name: name.to_string(),
                nil,
                text: String::new(),
            });
            current_text.clear();
        }
        _ => {
            issues.push(ValidationIssue {
                location: format!("/{}/record[{record_index}]/{name}", compiled.root),
                reason: "nested content is not allowed inside a field".to_string(),
            });
        }
    }
}

/// Walk one record's children against the declared field sequence.
fn validate_record(
    compiled: &CompiledSchema,
    record_index: usize,
    children: &[ChildElement],
    issues: &mut Vec<ValidationIssue>,
) {
    let location = |field: &str| format!("/{}/record[{record_index}]/{field}", compiled.root);
    let mut next_field = 0usize;

    for child in children {
        // Advance the declaration pointer to the child, reporting any
        // skipped required field along the way.
        let matched = compiled.fields[next_field.min(compiled.fields.len())..]
            .iter()
            .position(|f| f.name == child.name)
            .map(|offset| next_field + offset);

        let Some(field_idx) = matched else {
            let known = compiled.fields.iter().any(|f| f.name == child.name);
            issues.push(ValidationIssue {
                location: location(&child.name),
                reason: if known {
                    format!("element '{}' is out of sequence", child.name)
                } else {
                    format!("unexpected element '{}'", child.name)
                },
            });
            continue;
        };

        for skipped in &compiled.fields[next_field..field_idx] {
            if !skipped.optional {
                issues.push(ValidationIssue {
                    location: location(&skipped.name),
                    reason: format!("required element '{}' is missing", skipped.name),
                });
            }
        }
        next_field = field_idx + 1;

        let field = &compiled.fields[field_idx];
        if child.nil {
            if !field.nillable {
                issues.push(ValidationIssue {
                    location: location(&field.name),
                    reason: format!("element '{}' is not nillable", field.name),
                });
            }
            if !child.text.is_empty() {
                issues.push(ValidationIssue {
                    location: location(&field.name),
                    reason: format!("nil element '{}' must be empty", field.name),
                });
            }
        } else if !lexically_valid(&child.text, field.datatype) {
            issues.push(ValidationIssue {
                location: location(&field.name),
                reason: format!(
                    "value '{}' is not a valid {}",
                    child.text,
                    field.datatype.as_str()
                ),
            });
        }
    }

    for remaining in &compiled.fields[next_field..] {
        if !remaining.optional {
            issues.push(ValidationIssue {
                location: location(&remaining.name),
                reason: format!("required element '{}' is missing", remaining.name),
            });
        }
    }
}
