//! Client for the ESA JWST science archive.
//!
//! The archive is TAP+ with observation metadata in `jwst.main` and a
//! separate data endpoint for product files. Product downloads stream to
//! disk; the server names the file through `Content-Disposition`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::table::Table;
use crate::tap::{
    circle_contains, distance_expr, escape_literal, stream_to_file, AdqlQuery, SortDirection,
    TapClient,
};

/// TAP endpoint of the JWST archive at ESAC
pub const DEFAULT_JWST_TAP_URL: &str = "https://jwst.esac.esa.int/server/tap";

/// Product retrieval endpoint of the JWST archive
pub const DEFAULT_JWST_DATA_URL: &str = "https://jwst.esac.esa.int/server/data";

/// The main observation table
pub const MAIN_JWST_TABLE: &str = "jwst.main";

/// Row limit applied to the canned queries when none is given
pub const DEFAULT_ROW_LIMIT: usize = 50;

const RA_COLUMN: &str = "target_ra";
const DEC_COLUMN: &str = "target_dec";

/// `filename=` parameter of a Content-Disposition header, quoted or not
static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("valid regex"));

/// Client for the JWST archive
///
/// # Example
///
/// ```no_run
/// use vo_client::jwst::JwstClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let jwst = JwstClient::new();
///     let table = jwst.query_target("M 16").await?;
///     println!("{} observations of the Eagle Nebula", table.nrows());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JwstClient {
    tap: TapClient,
    data_url: String,
    row_limit: usize,
}

impl JwstClient {
    /// Create a client for the public JWST archive
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let data_url = config.effective_data_url(DEFAULT_JWST_DATA_URL);
        Self {
            tap: TapClient::with_config(DEFAULT_JWST_TAP_URL, config),
            data_url,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Change the row limit used by the canned queries
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// The underlying TAP client, for queries this wrapper does not cover
    /// and for TAP+ login before fetching proprietary products
    pub fn tap(&self) -> &TapClient {
        &self.tap
    }

    /// Run a raw ADQL query against the archive
    pub async fn query(&self, adql: &str) -> Result<Table> {
        self.tap.query(adql).await
    }

    /// Observations whose target name contains `name`, case-insensitively
    #[instrument(skip(self))]
    pub async fn query_target(&self, name: &str) -> Result<Table> {
        self.tap.query(&target_adql(name, self.row_limit)).await
    }

    /// Observations within `radius_deg` of a position, nearest first
    #[instrument(skip(self))]
    pub async fn cone_search(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Table> {
        self.tap
            .query(&cone_adql(ra, dec, radius_deg, self.row_limit)?)
            .await
    }

    /// Observations taken with one instrument, e.g. `NIRCAM` or `MIRI`
    #[instrument(skip(self))]
    pub async fn query_by_instrument(&self, instrument: &str) -> Result<Table> {
        self.tap
            .query(&instrument_adql(instrument, self.row_limit))
            .await
    }

    /// Download one product file into `dest_dir` and return its path.
    ///
    /// The filename comes from the `Content-Disposition` header; when the
    /// server does not send one, the artifact id is used. Proprietary
    /// products need a prior [`TapClient::login`] on [`tap`](Self::tap).
    #[instrument(skip(self))]
    pub async fn get_product(&self, artifact_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let params = [
            ("RETRIEVAL_TYPE", "PRODUCT"),
            ("ARTIFACTID", artifact_id),
        ];
        let response = self
            .tap
            .start_download(&self.data_url, &params, "JWST product download")
            .await?;

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| artifact_id.to_string());

        let dest = dest_dir.join(filename);
        let bytes = stream_to_file(response, &dest).await?;
        debug!(artifact_id = %artifact_id, bytes, path = %dest.display(), "Product saved");
        Ok(dest)
    }
}

impl Default for JwstClient {
    fn default() -> Self {
        Self::new()
    }
}

fn target_adql(name: &str, limit: usize) -> String {
    let pattern = escape_literal(&name.to_uppercase());
    format!(
        "SELECT TOP {limit} * FROM {MAIN_JWST_TABLE} \
         WHERE UPPER(target_name) LIKE '%{pattern}%'"
    )
}

fn instrument_adql(instrument: &str, limit: usize) -> String {
    format!(
        "SELECT TOP {limit} * FROM {MAIN_JWST_TABLE} WHERE instrument_name = '{}'",
        escape_literal(instrument)
    )
}

fn cone_adql(ra: f64, dec: f64, radius_deg: f64, limit: usize) -> Result<String> {
    let dist = distance_expr(RA_COLUMN, DEC_COLUMN, ra, dec)?;
    AdqlQuery::new()
        .select("*")
        .select(format!("{dist} AS dist"))
        .top(limit)
        .from(MAIN_JWST_TABLE)
        .where_clause(circle_contains(RA_COLUMN, DEC_COLUMN, ra, dec, radius_deg)?)
        .order_by("dist", SortDirection::Ascending)
        .build()
}

/// Extract a bare filename from a Content-Disposition value. Any path
/// components the server sends are dropped.
fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = FILENAME_RE.captures(value)?.get(1)?.as_str().trim();
    let name = Path::new(raw).file_name()?.to_string_lossy().into_owned();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}
