//! ADQL query construction.
//!
//! ADQL is the SQL dialect understood by TAP services. Queries are plain
//! strings on the wire; this module builds them from typed parts so that
//! table names, sort columns, and geometry arguments are checked before a
//! request ever leaves the process. Free-form WHERE conditions are passed
//! through untouched, matching how the archives themselves document their
//! query interfaces.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, VoError};

/// Regular or dotted ADQL identifier: `ra`, `gaiadr3.gaia_source`,
/// `catalog.schema.table`
static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").expect("valid regex")
});

/// Escape a string literal for embedding in ADQL.
///
/// ADQL string literals use single quotes; embedded quotes are doubled.
///
/// # Example
///
/// ```
/// use vo_client::tap::escape_literal;
///
/// assert_eq!(escape_literal("Barnard's Star"), "Barnard''s Star");
/// ```
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(VoError::InvalidQuery(format!(
            "'{name}' is not a valid ADQL identifier"
        )))
    }
}

/// Check that a position is finite and inside the ICRS coordinate ranges
pub(crate) fn validate_coordinates(ra: f64, dec: f64) -> Result<()> {
    let ra_ok = ra.is_finite() && (0.0..=360.0).contains(&ra);
    let dec_ok = dec.is_finite() && (-90.0..=90.0).contains(&dec);
    if ra_ok && dec_ok {
        Ok(())
    } else {
        Err(VoError::InvalidCoordinates { ra, dec })
    }
}

/// Check that a search radius is finite, positive, and at most `max_deg`
pub(crate) fn validate_radius(radius_deg: f64, max_deg: f64) -> Result<()> {
    if radius_deg.is_finite() && radius_deg > 0.0 && radius_deg <= max_deg {
        Ok(())
    } else {
        Err(VoError::InvalidRadius {
            radius_deg,
            max_deg,
        })
    }
}

/// Condition matching rows whose position falls inside a circle on the sky.
///
/// `ra_col` and `dec_col` name the position columns of the queried table;
/// the circle is centered on (`ra`, `dec`) with the given radius, all in
/// ICRS degrees.
///
/// # Example
///
/// ```
/// use vo_client::tap::circle_contains;
///
/// let cond = circle_contains("ra", "dec", 280.7, -7.2, 0.5).unwrap();
/// assert_eq!(
///     cond,
///     "1=CONTAINS(POINT('ICRS', ra, dec), CIRCLE('ICRS', 280.7, -7.2, 0.5))"
/// );
/// ```
pub fn circle_contains(
    ra_col: &str,
    dec_col: &str,
    ra: f64,
    dec: f64,
    radius_deg: f64,
) -> Result<String> {
    validate_identifier(ra_col)?;
    validate_identifier(dec_col)?;
    validate_coordinates(ra, dec)?;
    validate_radius(radius_deg, 180.0)?;
    Ok(format!(
        "1=CONTAINS(POINT('ICRS', {ra_col}, {dec_col}), CIRCLE('ICRS', {ra}, {dec}, {radius_deg}))"
    ))
}

/// Condition matching rows whose position falls inside a box on the sky
pub fn box_contains(
    ra_col: &str,
    dec_col: &str,
    ra: f64,
    dec: f64,
    width_deg: f64,
    height_deg: f64,
) -> Result<String> {
    validate_identifier(ra_col)?;
    validate_identifier(dec_col)?;
    validate_coordinates(ra, dec)?;
    validate_radius(width_deg, 180.0)?;
    validate_radius(height_deg, 180.0)?;
    Ok(format!(
        "1=CONTAINS(POINT('ICRS', {ra_col}, {dec_col}), BOX('ICRS', {ra}, {dec}, {width_deg}, {height_deg}))"
    ))
}

/// Expression computing the angular distance in degrees between each row's
/// position and a fixed point, typically used as `SELECT ... AS dist` with
/// `ORDER BY dist ASC`
pub fn distance_expr(ra_col: &str, dec_col: &str, ra: f64, dec: f64) -> Result<String> {
    validate_identifier(ra_col)?;
    validate_identifier(dec_col)?;
    validate_coordinates(ra, dec)?;
    Ok(format!(
        "DISTANCE(POINT('ICRS', {ra_col}, {dec_col}), POINT('ICRS', {ra}, {dec}))"
    ))
}

/// Sort direction for `ORDER BY`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_adql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Builder for ADQL SELECT statements
///
/// # Example
///
/// ```
/// use vo_client::tap::{AdqlQuery, SortDirection};
///
/// let adql = AdqlQuery::new()
///     .select("source_id")
///     .select("phot_g_mean_mag")
///     .top(100)
///     .from("gaiadr3.gaia_source")
///     .where_clause("parallax > 50")
///     .order_by("phot_g_mean_mag", SortDirection::Ascending)
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     adql,
///     "SELECT TOP 100 source_id, phot_g_mean_mag FROM gaiadr3.gaia_source \
///      WHERE parallax > 50 ORDER BY phot_g_mean_mag ASC"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdqlQuery {
    columns: Vec<String>,
    top: Option<usize>,
    table: Option<String>,
    conditions: Vec<String>,
    order_by: Option<(String, SortDirection)>,
    offset: Option<usize>,
}

impl AdqlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column or select expression. With no selections the query
    /// selects `*`.
    pub fn select<S: Into<String>>(mut self, column: S) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Limit the number of returned rows (`SELECT TOP n`)
    pub fn top(mut self, limit: usize) -> Self {
        self.top = Some(limit);
        self
    }

    /// Set the queried table
    pub fn from<S: Into<String>>(mut self, table: S) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a WHERE condition. Multiple conditions are joined with AND.
    /// The condition text is passed through as-is.
    pub fn where_clause<S: Into<String>>(mut self, condition: S) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Sort the result by a column
    pub fn order_by<S: Into<String>>(mut self, column: S, direction: SortDirection) -> Self {
        self.order_by = Some((column.into(), direction));
        self
    }

    /// Skip the first `n` rows (ADQL 2.1 OFFSET), for paging through large
    /// results together with [`AdqlQuery::top`]
    pub fn offset(mut self, rows: usize) -> Self {
        self.offset = Some(rows);
        self
    }

    /// Assemble the ADQL string.
    ///
    /// # Errors
    ///
    /// [`VoError::InvalidQuery`] when no table was set or the table or sort
    /// column is not a valid identifier.
    pub fn build(self) -> Result<String> {
        let table = self
            .table
            .ok_or_else(|| VoError::InvalidQuery("FROM table is required".to_string()))?;
        validate_identifier(&table)?;

        let mut adql = String::from("SELECT");
        if let Some(top) = self.top {
            let _ = write!(adql, " TOP {top}");
        }
        if self.columns.is_empty() {
            adql.push_str(" *");
        } else {
            let _ = write!(adql, " {}", self.columns.join(", "));
        }
        let _ = write!(adql, " FROM {table}");

        if !self.conditions.is_empty() {
            let _ = write!(adql, " WHERE {}", self.conditions.join(" AND "));
        }
        if let Some((column, direction)) = self.order_by {
            validate_identifier(&column)?;
            let _ = write!(adql, " ORDER BY {column} {}", direction.as_adql());
        }
        if let Some(offset) = self.offset {
            let _ = write!(adql, " OFFSET {offset}");
        }

        Ok(adql)
    }
}
