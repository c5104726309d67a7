//! Tabular query results.
//!
//! Every query operation in this crate resolves to a [`Table`]: an ordered
//! list of [`Column`] descriptions plus rows of loosely typed [`Value`] cells.
//! The shape mirrors what VOTable and the TAP JSON format carry on the wire,
//! without committing callers to a particular column layout at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Primitive datatypes a column can declare.
///
/// These follow the VOTable type system. Database-flavored names coming from
/// TAP JSON metadata ("VARCHAR", "BIGINT", "REAL") are folded into the
/// closest VOTable primitive by [`Datatype::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datatype {
    Boolean,
    Bit,
    UnsignedByte,
    Short,
    Int,
    Long,
    Char,
    UnicodeChar,
    Float,
    Double,
    FloatComplex,
    DoubleComplex,
}

impl Datatype {
    /// Parse a datatype name from VOTable or TAP JSON metadata.
    ///
    /// Unknown names fall back to [`Datatype::Char`] so that unexpected
    /// metadata degrades to string cells instead of a parse failure.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "boolean" => Datatype::Boolean,
            "bit" => Datatype::Bit,
            "unsignedbyte" => Datatype::UnsignedByte,
            "short" | "smallint" => Datatype::Short,
            "int" | "integer" => Datatype::Int,
            "long" | "bigint" => Datatype::Long,
            "char" | "varchar" | "string" | "timestamp" | "clob" => Datatype::Char,
            "unicodechar" => Datatype::UnicodeChar,
            "float" | "real" => Datatype::Float,
            "double" | "double precision" => Datatype::Double,
            "floatcomplex" => Datatype::FloatComplex,
            "doublecomplex" => Datatype::DoubleComplex,
            other => {
                debug!(datatype = other, "Unknown column datatype, treating as char");
                Datatype::Char
            }
        }
    }
}

impl Default for Datatype {
    fn default() -> Self {
        Datatype::Char
    }
}

/// A single table cell.
///
/// `Null` covers empty cells, declared null sentinels, and values that failed
/// to parse under the column's declared datatype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell, widening integers and floats to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the cell; floats are not coerced
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Description of a single table column, as declared by the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Column {
    /// Column name as returned by the service
    pub name: String,
    /// Declared cell datatype
    pub datatype: Datatype,
    /// VOTable array size declaration, e.g. `"*"` for variable-length strings
    pub arraysize: Option<String>,
    /// Physical unit, e.g. `"deg"` or `"mas.yr**-1"`
    pub unit: Option<String>,
    /// Unified Content Descriptor, e.g. `"pos.eq.ra;meta.main"`
    pub ucd: Option<String>,
    pub description: Option<String>,
    /// Sentinel that marks a cell as null, from `<VALUES null="...">`
    pub null_value: Option<String>,
}

impl Column {
    pub fn new<S: Into<String>>(name: S, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            ..Self::default()
        }
    }

    /// Whether cells hold a single value rather than an array.
    ///
    /// Character columns are scalar strings regardless of their arraysize.
    fn is_scalar(&self) -> bool {
        matches!(self.datatype, Datatype::Char | Datatype::UnicodeChar)
            || self.arraysize.is_none()
            || self.arraysize.as_deref() == Some("1")
    }

    /// Parse a text cell under this column's declared datatype.
    ///
    /// Empty cells, declared null sentinels, and unparseable numerics all
    /// become [`Value::Null`]. Array cells keep their raw text form.
    pub fn parse_cell(&self, text: &str) -> Value {
        let text = text.trim();
        if text.is_empty() {
            return Value::Null;
        }
        if let Some(null_value) = &self.null_value {
            if text == null_value {
                return Value::Null;
            }
        }
        if !self.is_scalar() {
            return Value::Str(text.to_string());
        }

        match self.datatype {
            Datatype::Boolean => match text {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
                "?" => Value::Null,
                other => {
                    debug!(column = %self.name, value = other, "Unparseable boolean cell");
                    Value::Null
                }
            },
            Datatype::Short => self.parse_numeric(text, Value::Short),
            Datatype::Bit | Datatype::UnsignedByte | Datatype::Int => {
                self.parse_numeric(text, Value::Int)
            }
            Datatype::Long => self.parse_numeric(text, Value::Long),
            Datatype::Float => self.parse_numeric(text, Value::Float),
            Datatype::Double => self.parse_numeric(text, Value::Double),
            Datatype::Char
            | Datatype::UnicodeChar
            | Datatype::FloatComplex
            | Datatype::DoubleComplex => Value::Str(text.to_string()),
        }
    }

    fn parse_numeric<T: std::str::FromStr>(&self, text: &str, wrap: fn(T) -> Value) -> Value {
        match text.parse::<T>() {
            Ok(v) => wrap(v),
            Err(_) => {
                debug!(
                    column = %self.name,
                    value = text,
                    "Cell does not match declared datatype, treating as null"
                );
                Value::Null
            }
        }
    }
}

/// A query result: column metadata plus rows of cells
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Set when the service reported an OVERFLOW, meaning the row limit cut
    /// off further results
    pub truncated: bool,
}

impl Table {
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a column position by name.
    ///
    /// ADQL treats identifiers case-insensitively, so an exact match is
    /// preferred but a case-insensitive match is accepted.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Column metadata by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Cell lookup by row index and column name
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Iterate over all cells of one column, top to bottom
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(idx)))
    }
}
