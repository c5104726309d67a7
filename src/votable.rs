//! VOTable response parsing.
//!
//! VOTable is the XML tabular format returned by TAP services, cone search
//! endpoints, and the IRSA Gator CGI. This parser handles the TABLEDATA
//! serialization, which is what services send when asked for
//! `FORMAT=votable`. The binary serializations (BINARY, BINARY2, FITS) are
//! rejected with a clear error rather than misparsed.
//!
//! Only the first `TABLE` element is read; TAP responses carry a single
//! result table and any further tables are service-specific extras.
//!
//! Status handling follows the TAP convention: an
//! `<INFO name="QUERY_STATUS" value="ERROR">` anywhere in the document turns
//! the whole response into [`VoError::ServiceError`], and `value="OVERFLOW"`
//! marks the parsed table as truncated by the row limit.

use quick_xml::events::Event;
use quick_xml::name::QName;
use tracing::debug;

use crate::error::{Result, VoError};
use crate::table::{Column, Datatype, Table, Value};
use crate::xml_utils::{get_attr, local_name_upper, make_reader};

/// Which element's character data is currently being collected
#[derive(PartialEq)]
enum TextTarget {
    None,
    Cell,
    FieldDescription,
    StatusInfo,
}

/// Parse a VOTable document into a [`Table`].
///
/// # Errors
///
/// * [`VoError::ServiceError`] when the document carries
///   `QUERY_STATUS value="ERROR"`
/// * [`VoError::VotableError`] for malformed XML, missing tables, or binary
///   serializations
pub fn parse_votable(xml: &str) -> Result<Table> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();

    let mut table = Table::default();
    let mut table_count: usize = 0;
    let mut in_table = false;
    let mut in_tabledata = false;

    let mut field: Option<Column> = None;
    let mut row: Option<Vec<Value>> = None;
    let mut cell_text = String::new();

    let mut text_target = TextTarget::None;
    let mut status_value: Option<String> = None;
    let mut status_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(err) => {
                return Err(VoError::XmlError(format!(
                    "malformed XML at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            Ok(Event::Eof) => break,

            Ok(Event::Start(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"TABLE" => {
                    table_count += 1;
                    if table_count == 1 {
                        in_table = true;
                    } else {
                        debug!("Ignoring additional TABLE element");
                        skip_subtree(&mut reader, e.name())?;
                    }
                }
                b"FIELD" if in_table && !in_tabledata && table.rows.is_empty() => {
                    let mut column = Column::new(
                        get_attr(e, b"name").unwrap_or_default(),
                        get_attr(e, b"datatype")
                            .map(|d| Datatype::parse(&d))
                            .unwrap_or_default(),
                    );
                    column.arraysize = get_attr(e, b"arraysize");
                    column.unit = get_attr(e, b"unit");
                    column.ucd = get_attr(e, b"ucd");
                    field = Some(column);
                }
                b"DESCRIPTION" if field.is_some() => {
                    text_target = TextTarget::FieldDescription;
                }
                b"VALUES" => {
                    if let Some(column) = field.as_mut() {
                        column.null_value = get_attr(e, b"null");
                    }
                }
                b"TABLEDATA" if in_table => {
                    in_tabledata = true;
                }
                b"TR" if in_tabledata => {
                    row = Some(Vec::with_capacity(table.columns.len()));
                }
                b"TD" if row.is_some() => {
                    cell_text.clear();
                    text_target = TextTarget::Cell;
                }
                b"BINARY" | b"BINARY2" | b"FITS" if in_table => {
                    return Err(VoError::VotableError(format!(
                        "{} serialization is not supported, request TABLEDATA output",
                        String::from_utf8_lossy(e.local_name().as_ref())
                    )));
                }
                b"INFO" => {
                    let is_query_status = get_attr(e, b"name")
                        .is_some_and(|n| n.eq_ignore_ascii_case("QUERY_STATUS"));
                    if is_query_status {
                        status_value = get_attr(e, b"value");
                        status_text.clear();
                        text_target = TextTarget::StatusInfo;
                    }
                }
                _ => {}
            },

            Ok(Event::Text(ref t)) => {
                if text_target != TextTarget::None {
                    let text = t.unescape().map_err(|err| {
                        VoError::XmlError(format!("invalid character data: {err}"))
                    })?;
                    match text_target {
                        TextTarget::Cell => cell_text.push_str(&text),
                        TextTarget::StatusInfo => status_text.push_str(&text),
                        TextTarget::FieldDescription => {
                            if let Some(column) = field.as_mut() {
                                push_description(&mut column.description, &text);
                            }
                        }
                        TextTarget::None => {}
                    }
                }
            }

            Ok(Event::CData(ref t)) => {
                let text = String::from_utf8_lossy(t);
                match text_target {
                    TextTarget::Cell => cell_text.push_str(&text),
                    TextTarget::StatusInfo => status_text.push_str(&text),
                    _ => {}
                }
            }

            Ok(Event::End(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"TABLE" => {
                    in_table = false;
                }
                b"TABLEDATA" => {
                    in_tabledata = false;
                }
                b"FIELD" => {
                    if let Some(column) = field.take() {
                        table.columns.push(column);
                    }
                }
                b"DESCRIPTION" => {
                    if text_target == TextTarget::FieldDescription {
                        text_target = TextTarget::None;
                    }
                }
                b"TD" => {
                    if let Some(cells) = row.as_mut() {
                        match table.columns.get(cells.len()) {
                            Some(column) => cells.push(column.parse_cell(&cell_text)),
                            None => {
                                debug!(
                                    row = table.rows.len(),
                                    "Row has more cells than declared fields, dropping extra"
                                );
                            }
                        }
                    }
                    text_target = TextTarget::None;
                }
                b"TR" => {
                    if let Some(mut cells) = row.take() {
                        if cells.len() < table.columns.len() {
                            debug!(
                                row = table.rows.len(),
                                cells = cells.len(),
                                fields = table.columns.len(),
                                "Row has fewer cells than declared fields, padding with nulls"
                            );
                            cells.resize(table.columns.len(), Value::Null);
                        }
                        table.rows.push(cells);
                    }
                }
                b"INFO" => {
                    if let Some(status) = status_value.take() {
                        match status.to_ascii_uppercase().as_str() {
                            "ERROR" => {
                                let message = status_text.trim();
                                return Err(VoError::ServiceError {
                                    message: if message.is_empty() {
                                        "service reported an error without a message".to_string()
                                    } else {
                                        message.to_string()
                                    },
                                });
                            }
                            "OVERFLOW" => {
                                debug!("Result truncated by the service row limit");
                                table.truncated = true;
                            }
                            _ => {}
                        }
                    }
                    if text_target == TextTarget::StatusInfo {
                        text_target = TextTarget::None;
                    }
                }
                _ => {}
            },

            Ok(_) => {}
        }
        buf.clear();
    }

    if row.is_some() || in_table {
        return Err(VoError::VotableError(
            "document ended inside a TABLE element".to_string(),
        ));
    }
    if table_count == 0 {
        return Err(VoError::VotableError(
            "response contains no TABLE element".to_string(),
        ));
    }

    Ok(table)
}

/// Skip an entire element subtree. The reader must have just consumed the
/// `Start` event for `name`.
fn skip_subtree(reader: &mut quick_xml::Reader<&[u8]>, name: QName) -> Result<()> {
    let owned = name.as_ref().to_vec();
    let mut skip_buf = Vec::new();
    reader
        .read_to_end_into(QName(&owned), &mut skip_buf)
        .map_err(|err| VoError::XmlError(format!("malformed XML: {err}")))?;
    Ok(())
}

fn push_description(description: &mut Option<String>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match description {
        Some(existing) => {
            existing.push(' ');
            existing.push_str(text);
        }
        None => *description = Some(text.to_string()),
    }
}
