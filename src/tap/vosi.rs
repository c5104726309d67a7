//! VOSI table metadata parsing.
//!
//! `GET {tap}/tables` returns a VODataService tableset: schemas containing
//! tables containing columns. The `<name>` element is context-dependent, so
//! the parser tracks whether it is inside a schema, table, or column when
//! text arrives.

use quick_xml::events::Event;
use tracing::debug;

use crate::error::{Result, VoError};
use crate::xml_utils::{local_name_upper, make_reader};

/// Metadata for one queryable table
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TapTableMetadata {
    /// Schema the table belongs to, e.g. `gaiadr3`
    pub schema: String,
    /// Table name as usable in ADQL, usually schema-qualified
    pub name: String,
    pub description: Option<String>,
    pub columns: Vec<TapColumn>,
}

impl TapTableMetadata {
    /// Column metadata by name (case-insensitive, like ADQL identifiers)
    pub fn column(&self, name: &str) -> Option<&TapColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The `schema.table` form, or the bare name when the declared table
    /// name already carries its schema prefix
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() || self.name.contains('.') {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// Metadata for one column of a TAP table
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TapColumn {
    pub name: String,
    pub description: Option<String>,
    /// Physical unit as declared by the service
    pub unit: Option<String>,
    /// Unified Content Descriptor
    pub ucd: Option<String>,
    /// Datatype string as declared, e.g. `VARCHAR` or `double`
    pub datatype: Option<String>,
}

#[derive(PartialEq)]
enum Level {
    Tableset,
    Schema,
    Table,
    Column,
}

#[derive(PartialEq)]
enum Target {
    None,
    Name,
    Description,
    Unit,
    Ucd,
    Datatype,
}

/// Parse a VOSI tableset document into per-table metadata
pub(crate) fn parse_tableset(xml: &str) -> Result<Vec<TapTableMetadata>> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();

    let mut tables = Vec::new();
    let mut saw_tableset = false;
    let mut level = Level::Tableset;
    let mut target = Target::None;
    let mut text = String::new();

    let mut schema_name = String::new();
    let mut table: Option<TapTableMetadata> = None;
    let mut column: Option<TapColumn> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(err) => {
                return Err(VoError::XmlError(format!("malformed tableset: {err}")));
            }
            Ok(Event::Eof) => break,

            Ok(Event::Start(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"TABLESET" => saw_tableset = true,
                b"SCHEMA" => {
                    level = Level::Schema;
                    schema_name.clear();
                }
                b"TABLE" if level == Level::Schema => {
                    level = Level::Table;
                    table = Some(TapTableMetadata {
                        schema: schema_name.clone(),
                        name: String::new(),
                        description: None,
                        columns: Vec::new(),
                    });
                }
                b"COLUMN" if level == Level::Table => {
                    level = Level::Column;
                    column = Some(TapColumn::default());
                }
                b"NAME" => {
                    text.clear();
                    target = Target::Name;
                }
                b"DESCRIPTION" => {
                    text.clear();
                    target = Target::Description;
                }
                b"UNIT" if level == Level::Column => {
                    text.clear();
                    target = Target::Unit;
                }
                b"UCD" if level == Level::Column => {
                    text.clear();
                    target = Target::Ucd;
                }
                b"DATATYPE" if level == Level::Column => {
                    text.clear();
                    target = Target::Datatype;
                }
                _ => {}
            },

            Ok(Event::Text(ref t)) => {
                if target != Target::None {
                    let unescaped = t.unescape().map_err(|err| {
                        VoError::XmlError(format!("invalid character data: {err}"))
                    })?;
                    text.push_str(&unescaped);
                }
            }

            Ok(Event::End(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"NAME" if target == Target::Name => {
                    let value = text.trim().to_string();
                    match level {
                        Level::Column => {
                            if let Some(c) = column.as_mut() {
                                c.name = value;
                            }
                        }
                        Level::Table => {
                            if let Some(t) = table.as_mut() {
                                t.name = value;
                            }
                        }
                        Level::Schema => schema_name = value,
                        Level::Tableset => {}
                    }
                    target = Target::None;
                }
                b"DESCRIPTION" if target == Target::Description => {
                    let value = text.trim();
                    if !value.is_empty() {
                        match level {
                            Level::Column => {
                                if let Some(c) = column.as_mut() {
                                    c.description = Some(value.to_string());
                                }
                            }
                            Level::Table => {
                                if let Some(t) = table.as_mut() {
                                    t.description = Some(value.to_string());
                                }
                            }
                            _ => {}
                        }
                    }
                    target = Target::None;
                }
                b"UNIT" if target == Target::Unit => {
                    if let Some(c) = column.as_mut() {
                        c.unit = non_empty(&text);
                    }
                    target = Target::None;
                }
                b"UCD" if target == Target::Ucd => {
                    if let Some(c) = column.as_mut() {
                        c.ucd = non_empty(&text);
                    }
                    target = Target::None;
                }
                b"DATATYPE" if target == Target::Datatype => {
                    if let Some(c) = column.as_mut() {
                        c.datatype = non_empty(&text);
                    }
                    target = Target::None;
                }
                b"COLUMN" if level == Level::Column => {
                    level = Level::Table;
                    if let (Some(t), Some(c)) = (table.as_mut(), column.take()) {
                        if c.name.is_empty() {
                            debug!(table = %t.name, "Skipping column without a name");
                        } else {
                            t.columns.push(c);
                        }
                    }
                }
                b"TABLE" if level == Level::Table => {
                    level = Level::Schema;
                    if let Some(t) = table.take() {
                        if t.name.is_empty() {
                            debug!(schema = %t.schema, "Skipping table without a name");
                        } else {
                            tables.push(t);
                        }
                    }
                }
                b"SCHEMA" if level == Level::Schema => {
                    level = Level::Tableset;
                }
                _ => {}
            },

            Ok(_) => {}
        }
        buf.clear();
    }

    if !saw_tableset {
        return Err(VoError::XmlError(
            "response is not a VOSI tableset".to_string(),
        ));
    }
    Ok(tables)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
