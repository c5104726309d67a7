//! Client for the CDS SIMBAD database.
//!
//! SIMBAD exposes a plain TAP service at `sim-tap`. Object data lives in the
//! `basic` table; every name an object is known under is a row in `ident`,
//! keyed by `oidref`. The canned queries here cover the lookups astronomers
//! run constantly: object by name, all names for an object, objects in a
//! region.
//!
//! Object names are free-form strings ("M 31", "Barnard's Star"), so they
//! are escaped into ADQL literals rather than validated.

use tracing::instrument;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::table::Table;
use crate::tap::{
    circle_contains, distance_expr, escape_literal, AdqlQuery, SortDirection, TapClient,
};

/// TAP endpoint of SIMBAD at CDS Strasbourg
pub const DEFAULT_SIMBAD_TAP_URL: &str = "https://simbad.cds.unistra.fr/simbad/sim-tap";

/// Row limit applied to the canned queries when none is given
pub const DEFAULT_ROW_LIMIT: usize = 20;

/// Columns returned by the object and region queries
const BASIC_COLUMNS: &str = "main_id, ra, dec, otype, sp_type";

/// Client for SIMBAD
///
/// # Example
///
/// ```no_run
/// use vo_client::simbad::SimbadClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let simbad = SimbadClient::new();
///     let table = simbad.query_object("M 31").await?;
///     if let Some(otype) = table.cell(0, "otype") {
///         println!("M 31 is a {otype}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SimbadClient {
    tap: TapClient,
    row_limit: usize,
}

impl SimbadClient {
    /// Create a client for the public SIMBAD service
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            tap: TapClient::with_config(DEFAULT_SIMBAD_TAP_URL, config),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Change the row limit used by the canned queries
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// The underlying TAP client, for queries this wrapper does not cover
    pub fn tap(&self) -> &TapClient {
        &self.tap
    }

    /// Run a raw ADQL query against SIMBAD
    pub async fn query(&self, adql: &str) -> Result<Table> {
        self.tap.query(adql).await
    }

    /// Basic data for one object, looked up by any of its identifiers
    #[instrument(skip(self))]
    pub async fn query_object(&self, name: &str) -> Result<Table> {
        self.tap.query(&object_adql(name, self.row_limit)).await
    }

    /// Every identifier the object is known under
    #[instrument(skip(self))]
    pub async fn query_objectids(&self, name: &str) -> Result<Table> {
        self.tap.query(&objectids_adql(name)).await
    }

    /// Objects within `radius_deg` of a position, nearest first
    #[instrument(skip(self))]
    pub async fn query_region(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Table> {
        self.tap
            .query(&region_adql(ra, dec, radius_deg, self.row_limit)?)
            .await
    }

    /// Objects matching a raw ADQL condition over the `basic` table, e.g.
    /// `otype = 'G' AND nbref > 100`
    #[instrument(skip(self))]
    pub async fn query_criteria(&self, condition: &str) -> Result<Table> {
        let adql = AdqlQuery::new()
            .select(BASIC_COLUMNS)
            .top(self.row_limit)
            .from("basic")
            .where_clause(condition)
            .build()?;
        self.tap.query(&adql).await
    }
}

impl Default for SimbadClient {
    fn default() -> Self {
        Self::new()
    }
}

fn object_adql(name: &str, limit: usize) -> String {
    format!(
        "SELECT TOP {limit} {BASIC_COLUMNS} FROM basic \
         JOIN ident ON ident.oidref = basic.oid WHERE ident.id = '{}'",
        escape_literal(name)
    )
}

fn objectids_adql(name: &str) -> String {
    format!(
        "SELECT i2.id FROM ident AS i1 JOIN ident AS i2 ON i1.oidref = i2.oidref \
         WHERE i1.id = '{}'",
        escape_literal(name)
    )
}

fn region_adql(ra: f64, dec: f64, radius_deg: f64, limit: usize) -> Result<String> {
    let dist = distance_expr("ra", "dec", ra, dec)?;
    AdqlQuery::new()
        .select(BASIC_COLUMNS)
        .select(format!("{dist} AS dist"))
        .top(limit)
        .from("basic")
        .where_clause(circle_contains("ra", "dec", ra, dec, radius_deg)?)
        .order_by("dist", SortDirection::Ascending)
        .build()
}
