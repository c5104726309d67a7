//! Client for the ESA Gaia archive.
//!
//! Gaia is a TAP+ service: plain TAP plus cookie-session login and server-side
//! user tables. The client wraps [`TapClient`] with the archive's endpoint,
//! its main catalogue table, and the cone/box searches everyone runs first.

use tracing::instrument;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::table::Table;
use crate::tap::{
    box_contains, circle_contains, distance_expr, AdqlQuery, SortDirection, TapClient, TapJob,
    TapTableMetadata,
};

/// TAP endpoint of the Gaia archive at ESAC
pub const DEFAULT_GAIA_TAP_URL: &str = "https://gea.esac.esa.int/tap-server/tap";

/// The main Gaia source catalogue (data release 3)
pub const MAIN_GAIA_TABLE: &str = "gaiadr3.gaia_source";

/// Row limit applied to the canned searches when none is given
pub const DEFAULT_ROW_LIMIT: usize = 50;

const RA_COLUMN: &str = "ra";
const DEC_COLUMN: &str = "dec";

/// Client for the ESA Gaia archive
///
/// # Example
///
/// ```no_run
/// use vo_client::gaia::GaiaClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let gaia = GaiaClient::new();
///     // Sources within 6 arcmin of the Pleiades center
///     let table = gaia.cone_search(56.75, 24.1167, 0.1).await?;
///     for row in 0..table.nrows() {
///         println!("{:?}", table.cell(row, "source_id"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GaiaClient {
    tap: TapClient,
    row_limit: usize,
}

impl GaiaClient {
    /// Create a client for the public Gaia archive
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            tap: TapClient::with_config(DEFAULT_GAIA_TAP_URL, config),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Change the row limit used by the canned searches
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// The underlying TAP client, for queries this wrapper does not cover
    pub fn tap(&self) -> &TapClient {
        &self.tap
    }

    /// Run a synchronous ADQL query
    pub async fn query(&self, adql: &str) -> Result<Table> {
        self.tap.query(adql).await
    }

    /// Submit an asynchronous ADQL query
    pub async fn submit_job(&self, adql: &str) -> Result<TapJob> {
        self.tap.submit_job(adql).await
    }

    /// Submit an asynchronous query, wait for it, and fetch the result.
    /// Use this instead of [`query`](Self::query) for anything that may run
    /// longer than the sync endpoint allows.
    pub async fn run(&self, adql: &str) -> Result<Table> {
        self.tap.run(adql).await
    }

    /// Cone search on the main Gaia table, nearest sources first
    #[instrument(skip(self))]
    pub async fn cone_search(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Table> {
        self.cone_search_on(MAIN_GAIA_TABLE, ra, dec, radius_deg, self.row_limit)
            .await
    }

    /// Cone search on an arbitrary table with Gaia-style `ra`/`dec` columns
    #[instrument(skip(self))]
    pub async fn cone_search_on(
        &self,
        table: &str,
        ra: f64,
        dec: f64,
        radius_deg: f64,
        limit: usize,
    ) -> Result<Table> {
        let adql = cone_search_adql(table, ra, dec, radius_deg, limit)?;
        self.tap.query(&adql).await
    }

    /// Select sources in a box of `width_deg` x `height_deg` around a
    /// position, nearest first
    #[instrument(skip(self))]
    pub async fn query_object(
        &self,
        ra: f64,
        dec: f64,
        width_deg: f64,
        height_deg: f64,
    ) -> Result<Table> {
        let dist = distance_expr(RA_COLUMN, DEC_COLUMN, ra, dec)?;
        let adql = AdqlQuery::new()
            .select("*")
            .select(format!("{dist} AS dist"))
            .top(self.row_limit)
            .from(MAIN_GAIA_TABLE)
            .where_clause(box_contains(
                RA_COLUMN, DEC_COLUMN, ra, dec, width_deg, height_deg,
            )?)
            .order_by("dist", SortDirection::Ascending)
            .build()?;
        self.tap.query(&adql).await
    }

    /// Table metadata for the whole archive
    pub async fn load_tables(&self) -> Result<Vec<TapTableMetadata>> {
        self.tap.load_tables().await
    }

    /// Metadata for one table
    pub async fn load_table(&self, name: &str) -> Result<TapTableMetadata> {
        self.tap.load_table(name).await
    }

    /// Log in for proprietary data and user table space
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.tap.login(username, password).await
    }

    /// End the authenticated session
    pub async fn logout(&self) -> Result<()> {
        self.tap.logout().await
    }
}

impl Default for GaiaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn cone_search_adql(
    table: &str,
    ra: f64,
    dec: f64,
    radius_deg: f64,
    limit: usize,
) -> Result<String> {
    let dist = distance_expr(RA_COLUMN, DEC_COLUMN, ra, dec)?;
    AdqlQuery::new()
        .select("*")
        .select(format!("{dist} AS dist"))
        .top(limit)
        .from(table)
        .where_clause(circle_contains(RA_COLUMN, DEC_COLUMN, ra, dec, radius_deg)?)
        .order_by("dist", SortDirection::Ascending)
        .build()
}
