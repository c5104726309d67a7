//! Generic TAP service client.
//!
//! `TapClient` speaks the parts of the TAP protocol every archive shares:
//! synchronous queries against `{base}/sync`, UWS jobs under `{base}/async`,
//! VOSI table metadata under `{base}/tables`, and the TAP+ cookie login used
//! by the ESA archives. The archive-specific clients wrap one of these and
//! add their table names and query helpers on top.

use std::fmt;
use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheConfig, MemoryCache};
use crate::config::ClientConfig;
use crate::error::{Result, VoError};
use crate::rate_limit::RateLimiter;
use crate::retry::with_retry;
use crate::table::{Column, Datatype, Table, Value};
use crate::tap::job::{PollSettings, TapJob};
use crate::tap::uws::{parse_job, parse_job_list, JobSummary};
use crate::tap::vosi::{parse_tableset, TapTableMetadata};
use crate::votable::parse_votable;

/// Output format for synchronous TAP queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    /// VOTable XML, the format every TAP service must support
    #[default]
    VoTable,
    /// The TAP JSON table layout (`{"metadata": […], "data": [[…]]}`)
    Json,
}

impl ResultFormat {
    fn as_tap_param(&self) -> &'static str {
        match self {
            ResultFormat::VoTable => "votable",
            ResultFormat::Json => "json",
        }
    }
}

/// Client for one TAP service endpoint
///
/// Cloning is cheap and clones share the HTTP connection pool, the cookie
/// store, the rate limiter, and the metadata cache.
///
/// # Example
///
/// ```no_run
/// use vo_client::tap::TapClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tap = TapClient::new("https://simbad.cds.unistra.fr/simbad/sim-tap");
///     let table = tap
///         .query("SELECT TOP 5 main_id, ra, dec FROM basic WHERE otype = 'G'")
///         .await?;
///     println!("{} rows", table.nrows());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TapClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    config: ClientConfig,
    tables_cache: MemoryCache<String, Vec<TapTableMetadata>>,
}

impl fmt::Debug for TapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TapClient {
    /// Create a client for the given TAP base URL with default configuration
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        let base_url = base_url.into();
        Self::with_config(&base_url, ClientConfig::new())
    }

    /// Create a client with explicit configuration.
    ///
    /// `default_url` is the service's well-known endpoint; a `base_url` set
    /// on the configuration overrides it.
    pub fn with_config(default_url: &str, config: ClientConfig) -> Self {
        let base_url = config.effective_base_url(default_url);
        let client = config.create_http_client();
        let rate_limiter = config.create_rate_limiter();
        Self {
            client,
            base_url,
            rate_limiter,
            config,
            tables_cache: MemoryCache::new(&CacheConfig::default()),
        }
    }

    /// The TAP base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a synchronous ADQL query and parse the VOTable result
    #[instrument(skip(self))]
    pub async fn query(&self, adql: &str) -> Result<Table> {
        self.query_with_format(adql, ResultFormat::VoTable).await
    }

    /// Run a synchronous ADQL query in the requested output format
    #[instrument(skip(self))]
    pub async fn query_with_format(&self, adql: &str, format: ResultFormat) -> Result<Table> {
        let url = format!("{}/sync", self.base_url);
        let form = [
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", format.as_tap_param()),
            ("QUERY", adql),
        ];
        let response = self.make_form_request(&url, &form, "TAP sync query").await?;
        let body = response.text().await?;
        match format {
            ResultFormat::VoTable => parse_votable(&body),
            ResultFormat::Json => parse_tap_json(&body),
        }
    }

    /// Submit an asynchronous query and return a handle to the created job.
    ///
    /// The job starts immediately (`PHASE=RUN`). The job URL comes from the
    /// redirect the server answers with, falling back to `{base}/async/{id}`
    /// for servers that respond with the job document in place.
    #[instrument(skip(self))]
    pub async fn submit_job(&self, adql: &str) -> Result<TapJob> {
        let url = format!("{}/async", self.base_url);
        let form = [
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", "votable"),
            ("PHASE", "RUN"),
            ("QUERY", adql),
        ];
        let response = self
            .make_form_request(&url, &form, "TAP job submission")
            .await?;

        // Redirects were already followed, so on a UWS-conformant server the
        // final URL is the job resource itself.
        let final_url = response.url().to_string();
        let body = response.text().await?;
        let doc = parse_job(&body)?;

        let job_id = doc
            .job_id
            .clone()
            .ok_or_else(|| VoError::XmlError("job document carries no jobId".to_string()))?;

        let trimmed = final_url.trim_end_matches('/');
        let job_url = if trimmed.ends_with(&format!("/{job_id}")) {
            trimmed.to_string()
        } else {
            format!("{}/async/{}", self.base_url, job_id)
        };

        let mut job = TapJob::new(self.clone(), job_id, job_url);
        job.apply_document(&doc);
        debug!(job_id = %job.id(), job_url = %job.url(), "Job submitted");
        Ok(job)
    }

    /// Submit an async query, wait for it, and fetch the result.
    ///
    /// The finished job is deleted on a best-effort basis; a failed delete
    /// only leaves a stale job on the server.
    pub async fn run(&self, adql: &str) -> Result<Table> {
        self.run_with(adql, &PollSettings::default()).await
    }

    /// [`run`](Self::run) with explicit polling settings
    #[instrument(skip(self, poll))]
    pub async fn run_with(&self, adql: &str, poll: &PollSettings) -> Result<Table> {
        let mut job = self.submit_job(adql).await?;
        job.wait_with(poll).await?;
        let table = job.fetch_result().await?;
        if let Err(err) = job.delete().await {
            debug!(error = %err, "Failed to delete finished job");
        }
        Ok(table)
    }

    /// List the jobs the service currently knows for this (possibly
    /// anonymous) session
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let url = format!("{}/async", self.base_url);
        let body = self.fetch_text(&url, "TAP job list").await?;
        parse_job_list(&body)
    }

    /// Load the service's table metadata.
    ///
    /// Table sets change rarely and can be large, so results are cached
    /// in-process keyed by base URL.
    #[instrument(skip(self))]
    pub async fn load_tables(&self) -> Result<Vec<TapTableMetadata>> {
        if let Some(tables) = self.tables_cache.get(&self.base_url).await {
            return Ok(tables);
        }
        let url = format!("{}/tables", self.base_url);
        let body = self.fetch_text(&url, "VOSI tables").await?;
        let tables = parse_tableset(&body)?;
        self.tables_cache
            .insert(self.base_url.clone(), tables.clone())
            .await;
        Ok(tables)
    }

    /// Load metadata for one table by qualified (`schema.table`) or bare name
    pub async fn load_table(&self, name: &str) -> Result<TapTableMetadata> {
        let tables = self.load_tables().await?;
        tables
            .into_iter()
            .find(|table| {
                table.qualified_name().eq_ignore_ascii_case(name)
                    || table.name.eq_ignore_ascii_case(name)
            })
            .ok_or_else(|| VoError::NotFound {
                what: format!("table {name}"),
            })
    }

    /// Log in to a TAP+ service.
    ///
    /// The session rides on a cookie held by the shared HTTP client, so
    /// subsequent requests from this client and every clone of it are
    /// authenticated. Credentials are sent as a form and never logged.
    #[instrument(skip(self, username, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = self.sibling_endpoint("login");
        let form = [("username", username), ("password", password)];
        let response = self.send_form(&url, &form, "TAP+ login").await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Login rejected");
            return Err(VoError::LoginFailed {
                status: status.as_u16(),
            });
        }
        debug!("Login succeeded");
        Ok(())
    }

    /// End a TAP+ session
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let url = self.sibling_endpoint("logout");
        let form: [(&str, &str); 0] = [];
        let response = self.send_form(&url, &form, "TAP+ logout").await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoError::StatusError {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }

    /// TAP+ puts login/logout beside the TAP endpoint, not under it
    fn sibling_endpoint(&self, name: &str) -> String {
        match self.base_url.strip_suffix("/tap") {
            Some(root) => format!("{root}/{name}"),
            None => format!("{}/{}", self.base_url, name),
        }
    }

    /// GET with rate limiting and retry; any non-success status left after
    /// retries becomes an error
    pub(crate) async fn make_request(&self, url: &str, operation_name: &str) -> Result<Response> {
        let response = with_retry(
            || async {
                self.rate_limiter.acquire().await;
                debug!(url = %url, "Making GET request");
                let response = self.client.get(url).send().await?;
                retryable_status(response)
            },
            &self.config.retry_config,
            operation_name,
        )
        .await?;
        self.ensure_success(response).await
    }

    /// POST a form with rate limiting and retry, checking the final status
    pub(crate) async fn make_form_request(
        &self,
        url: &str,
        form: &[(&str, &str)],
        operation_name: &str,
    ) -> Result<Response> {
        let response = self.send_form(url, form, operation_name).await?;
        self.ensure_success(response).await
    }

    /// GET and return the body as text
    pub(crate) async fn fetch_text(&self, url: &str, operation_name: &str) -> Result<String> {
        let response = self.make_request(url, operation_name).await?;
        Ok(response.text().await?)
    }

    /// DELETE a resource. UWS answers a job delete with a redirect to the
    /// job list, which the HTTP client follows.
    pub(crate) async fn delete_resource(&self, url: &str) -> Result<()> {
        let response = with_retry(
            || async {
                self.rate_limiter.acquire().await;
                debug!(url = %url, "Making DELETE request");
                let response = self.client.delete(url).send().await?;
                retryable_status(response)
            },
            &self.config.retry_config,
            "TAP job deletion",
        )
        .await?;
        self.ensure_success(response).await?;
        Ok(())
    }

    /// GET a download endpoint under the longer download timeout and return
    /// the checked response; the caller picks the destination, usually from
    /// the response headers.
    pub(crate) async fn start_download(
        &self,
        url: &str,
        params: &[(&str, &str)],
        operation_name: &str,
    ) -> Result<Response> {
        let timeout = self.config.effective_download_timeout();
        let response = with_retry(
            || async {
                self.rate_limiter.acquire().await;
                debug!(url = %url, "Starting download");
                let response = self
                    .client
                    .get(url)
                    .query(&params)
                    .timeout(timeout)
                    .send()
                    .await?;
                retryable_status(response)
            },
            &self.config.retry_config,
            operation_name,
        )
        .await?;
        self.ensure_success(response).await
    }

    /// POST a form without the final status check; login needs to map the
    /// status itself
    async fn send_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        operation_name: &str,
    ) -> Result<Response> {
        with_retry(
            || async {
                self.rate_limiter.acquire().await;
                debug!(url = %url, "Making POST request");
                let response = self.client.post(url).form(&form).send().await?;
                retryable_status(response)
            },
            &self.config.retry_config,
            operation_name,
        )
        .await
    }

    /// Map a non-success response to an error. TAP services put the message
    /// in a VOTable error document, so the body is worth reading.
    async fn ensure_success(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        warn!(status = %status, url = %url, "Request failed");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VoError::AuthRequired);
        }
        match response.text().await {
            Ok(body) => match parse_votable(&body) {
                Err(VoError::ServiceError { message }) => Err(VoError::ServiceError { message }),
                _ => Err(VoError::StatusError {
                    status: status.as_u16(),
                    url,
                }),
            },
            Err(_) => Err(VoError::StatusError {
                status: status.as_u16(),
                url,
            }),
        }
    }
}

/// Convert retryable statuses into errors so `with_retry` re-runs them
fn retryable_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(VoError::StatusError {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Stream a response body to `dest`, creating parent directories. Returns
/// the number of bytes written.
pub(crate) async fn stream_to_file(response: Response, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio_fs::create_dir_all(parent)
            .await
            .map_err(|e| VoError::IoError {
                message: format!("failed to create {}: {e}", parent.display()),
            })?;
    }
    let mut file = tokio_fs::File::create(dest)
        .await
        .map_err(|e| VoError::IoError {
            message: format!("failed to create {}: {e}", dest.display()),
        })?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(VoError::from)?;
        file.write_all(&chunk).await.map_err(|e| VoError::IoError {
            message: format!("failed to write {}: {e}", dest.display()),
        })?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| VoError::IoError {
        message: format!("failed to flush {}: {e}", dest.display()),
    })?;

    debug!(bytes = written, path = %dest.display(), "Download complete");
    Ok(written)
}

#[derive(serde::Deserialize)]
struct TapJsonResponse {
    metadata: Vec<TapJsonColumn>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(serde::Deserialize)]
struct TapJsonColumn {
    name: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default)]
    arraysize: Option<serde_json::Value>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    ucd: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the TAP JSON table layout into a [`Table`]
fn parse_tap_json(body: &str) -> Result<Table> {
    let parsed: TapJsonResponse = serde_json::from_str(body)?;

    let columns: Vec<Column> = parsed
        .metadata
        .iter()
        .map(|meta| {
            let datatype = meta
                .datatype
                .as_deref()
                .map(Datatype::parse)
                .unwrap_or_default();
            let mut column = Column::new(meta.name.clone(), datatype);
            column.arraysize = meta.arraysize.as_ref().and_then(arraysize_string);
            column.unit = meta.unit.clone();
            column.ucd = meta.ucd.clone();
            column.description = meta.description.clone();
            column
        })
        .collect();

    let mut table = Table {
        columns,
        rows: Vec::new(),
        truncated: false,
    };

    for raw_row in parsed.data {
        let mut row: Vec<Value> = Vec::with_capacity(table.columns.len());
        for (i, cell) in raw_row.into_iter().enumerate() {
            match table.columns.get(i) {
                Some(column) => row.push(json_cell(column, cell)),
                None => {
                    debug!(extra = i + 1, "Row has more cells than declared columns");
                    break;
                }
            }
        }
        // Short rows are padded so every row matches the column count
        while row.len() < table.columns.len() {
            row.push(Value::Null);
        }
        table.rows.push(row);
    }

    Ok(table)
}

fn arraysize_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map one JSON cell to a typed [`Value`] under the column's declared type
fn json_cell(column: &Column, cell: serde_json::Value) -> Value {
    match cell {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match column.datatype {
                    Datatype::Short => Value::Short(i as i16),
                    Datatype::Int => Value::Int(i as i32),
                    Datatype::Float => Value::Float(i as f32),
                    Datatype::Double => Value::Double(i as f64),
                    _ => Value::Long(i),
                }
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                match column.datatype {
                    Datatype::Float => Value::Float(f as f32),
                    _ => Value::Double(f),
                }
            }
        }
        // Services sometimes stringify numerics; defer to the column type
        serde_json::Value::String(text) => match column.datatype {
            Datatype::Char | Datatype::UnicodeChar => Value::Str(text),
            _ => column.parse_cell(&text),
        },
        other => Value::Str(other.to_string()),
    }
}
