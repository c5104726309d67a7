//! Client for the Herschel Science Archive.
//!
//! Herschel metadata is served over TAP+ with observations in
//! `hsa.v_active_observation`. Data products come from a separate endpoint
//! as tar archives (sometimes gzipped), which are streamed to disk and
//! extracted in place.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tokio::fs as tokio_fs;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{Result, VoError};
use crate::table::Table;
use crate::tap::{
    circle_contains, distance_expr, stream_to_file, AdqlQuery, SortDirection, TapClient,
};

/// TAP endpoint of the Herschel Science Archive
pub const DEFAULT_HSA_TAP_URL: &str = "https://archives.esac.esa.int/hsa/whsa-tap-server/tap";

/// Product retrieval endpoint of the Herschel Science Archive
pub const DEFAULT_HSA_DATA_URL: &str = "https://archives.esac.esa.int/hsa/whsa-tap-server/data";

/// The active-observations view
pub const OBSERVATIONS_TABLE: &str = "hsa.v_active_observation";

/// Row limit applied to the canned queries when none is given
pub const DEFAULT_ROW_LIMIT: usize = 50;

const RA_COLUMN: &str = "ra";
const DEC_COLUMN: &str = "dec";

/// Client for the Herschel Science Archive
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use vo_client::hsa::HsaClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hsa = HsaClient::new();
///     let files = hsa
///         .download_observation("1342231345", "LEVEL2", Path::new("./herschel"))
///         .await?;
///     println!("{} files extracted", files.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HsaClient {
    tap: TapClient,
    data_url: String,
    row_limit: usize,
}

impl HsaClient {
    /// Create a client for the public Herschel archive
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let data_url = config.effective_data_url(DEFAULT_HSA_DATA_URL);
        Self {
            tap: TapClient::with_config(DEFAULT_HSA_TAP_URL, config),
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
    pub fn tap(&self) -> &TapClient {
        &self.tap
    }

    /// Run a raw ADQL query against the archive
    pub async fn query(&self, adql: &str) -> Result<Table> {
        self.tap.query(adql).await
    }

    /// Observations matching a raw ADQL condition, e.g.
    /// `instrument_name = 'PACS' AND od_number > 100`
    #[instrument(skip(self))]
    pub async fn query_observations(&self, criteria: &str) -> Result<Table> {
        let adql = AdqlQuery::new()
            .top(self.row_limit)
            .from(OBSERVATIONS_TABLE)
            .where_clause(criteria)
            .build()?;
        self.tap.query(&adql).await
    }

    /// Observations within `radius_deg` of a position, nearest first
    #[instrument(skip(self))]
    pub async fn cone_search(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Table> {
        self.tap
            .query(&cone_adql(ra, dec, radius_deg, self.row_limit)?)
            .await
    }

    /// Download one observation's products as a tar archive, extract it
    /// into `dest_dir`, and return the extracted file paths.
    ///
    /// `level` selects the processing level, e.g. `ALL` or `LEVEL2`.
    #[instrument(skip(self))]
    pub async fn download_observation(
        &self,
        obs_id: &str,
        level: &str,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let params = [
            ("RETRIEVAL_TYPE", "OBSERVATION"),
            ("observation_id", obs_id),
            ("product_level", level),
        ];
        let response = self
            .tap
            .start_download(&self.data_url, &params, "HSA observation download")
            .await?;

        let tar_path = dest_dir.join(format!("{obs_id}.tar"));
        let bytes = stream_to_file(response, &tar_path).await?;
        debug!(obs_id = %obs_id, bytes, "Observation archive downloaded");

        let extracted = extract_archive(&tar_path, dest_dir).await;

        // The tar itself is an intermediate; drop it even when extraction
        // failed so retries start clean.
        if let Err(err) = tokio_fs::remove_file(&tar_path).await {
            debug!(error = %err, path = %tar_path.display(), "Failed to remove archive");
        }

        extracted
    }
}

impl Default for HsaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn cone_adql(ra: f64, dec: f64, radius_deg: f64, limit: usize) -> Result<String> {
    let dist = distance_expr(RA_COLUMN, DEC_COLUMN, ra, dec)?;
    AdqlQuery::new()
        .select("*")
        .select(format!("{dist} AS dist"))
        .top(limit)
        .from(OBSERVATIONS_TABLE)
        .where_clause(circle_contains(RA_COLUMN, DEC_COLUMN, ra, dec, radius_deg)?)
        .order_by("dist", SortDirection::Ascending)
        .build()
}

/// A path that stays inside the extraction directory: no root, no drive
/// prefix, no `..`
fn is_safe_entry_path(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extract a tar (gzipped or not) into `dest_dir`, returning the files
/// written
async fn extract_archive(tar_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut file = File::open(tar_path).map_err(|e| VoError::IoError {
        message: format!("failed to open archive {}: {e}", tar_path.display()),
    })?;

    // Sniff the gzip magic; HSA serves both plain and gzipped tars
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic).map_err(|e| VoError::IoError {
        message: format!("failed to read archive {}: {e}", tar_path.display()),
    })?;
    file.seek(SeekFrom::Start(0)).map_err(|e| VoError::IoError {
        message: format!("failed to rewind archive {}: {e}", tar_path.display()),
    })?;
    let gzipped = n == 2 && magic == [0x1f, 0x8b];

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = Archive::new(reader);

    let mut extracted = Vec::new();
    for entry in archive.entries().map_err(|e| VoError::IoError {
        message: format!("failed to read tar entries: {e}"),
    })? {
        let mut entry = entry.map_err(|e| VoError::IoError {
            message: format!("failed to read tar entry: {e}"),
        })?;

        let path = entry
            .path()
            .map_err(|e| VoError::IoError {
                message: format!("failed to read tar entry path: {e}"),
            })?
            .into_owned();

        if !is_safe_entry_path(&path) {
            return Err(VoError::IoError {
                message: format!(
                    "archive entry escapes the extraction directory: {}",
                    path.display()
                ),
            });
        }

        let output_path = dest_dir.join(&path);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VoError::IoError {
                message: format!("failed to create {}: {e}", parent.display()),
            })?;
        }

        entry.unpack(&output_path).map_err(|e| VoError::IoError {
            message: format!("failed to extract {}: {e}", output_path.display()),
        })?;

        if output_path.is_file() {
            debug!(path = %output_path.display(), "Extracted");
            extracted.push(output_path);
        }
    }

    Ok(extracted)
}
