//! Asynchronous TAP job handles.
//!
//! Submitting an async query creates a job resource on the server. A
//! [`TapJob`] wraps that resource: it polls the phase endpoint, downloads
//! the result once the job completes, and deletes the job when the caller
//! is done with it. Jobs survive on the server independently of this
//! handle; dropping a `TapJob` does not cancel anything.

use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::error::{Result, VoError};
use crate::table::Table;
use crate::tap::client::TapClient;
use crate::tap::uws::UwsJob;
use crate::votable::parse_votable;

/// Execution phase of a UWS job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Queued,
    Executing,
    Completed,
    Error,
    Aborted,
    Held,
    Suspended,
    Archived,
    /// A phase string this crate does not know; kept verbatim
    Unknown(String),
}

impl JobPhase {
    /// Parse a phase string as returned by the phase endpoint or a job
    /// document
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobPhase::Pending,
            "QUEUED" => JobPhase::Queued,
            "EXECUTING" => JobPhase::Executing,
            "COMPLETED" => JobPhase::Completed,
            "ERROR" => JobPhase::Error,
            "ABORTED" => JobPhase::Aborted,
            "HELD" => JobPhase::Held,
            "SUSPENDED" => JobPhase::Suspended,
            "ARCHIVED" => JobPhase::Archived,
            _ => JobPhase::Unknown(text.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobPhase::Pending => "PENDING",
            JobPhase::Queued => "QUEUED",
            JobPhase::Executing => "EXECUTING",
            JobPhase::Completed => "COMPLETED",
            JobPhase::Error => "ERROR",
            JobPhase::Aborted => "ABORTED",
            JobPhase::Held => "HELD",
            JobPhase::Suspended => "SUSPENDED",
            JobPhase::Archived => "ARCHIVED",
            JobPhase::Unknown(text) => text,
        }
    }

    /// Whether the job can still make progress. HELD and SUSPENDED jobs can
    /// resume, so only the final phases count as terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Error | JobPhase::Aborted | JobPhase::Archived
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polling behavior for [`TapJob::wait_with`]
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Delay before the first phase check after submission
    pub initial_interval: Duration,
    /// Upper bound for the doubling poll interval
    pub max_interval: Duration,
    /// Total time to wait for a terminal phase
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Handle to an asynchronous TAP job on a server
///
/// # Example
///
/// ```no_run
/// use vo_client::tap::TapClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tap = TapClient::new("https://gea.esac.esa.int/tap-server/tap");
///     let mut job = tap
///         .submit_job("SELECT TOP 1000000 source_id, ra, dec FROM gaiadr3.gaia_source")
///         .await?;
///
///     job.wait().await?;
///     let table = job.fetch_result().await?;
///     println!("{} rows", table.nrows());
///     job.delete().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TapJob {
    client: TapClient,
    job_id: String,
    job_url: String,
    phase: JobPhase,
    result_href: Option<String>,
    owner: Option<String>,
    quote: Option<OffsetDateTime>,
    start_time: Option<OffsetDateTime>,
    end_time: Option<OffsetDateTime>,
}

impl TapJob {
    pub(crate) fn new(client: TapClient, job_id: String, job_url: String) -> Self {
        Self {
            client,
            job_id,
            job_url,
            phase: JobPhase::Pending,
            result_href: None,
            owner: None,
            quote: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Fold a job document into this handle
    pub(crate) fn apply_document(&mut self, doc: &UwsJob) {
        if let Some(phase) = &doc.phase {
            self.phase = JobPhase::parse(phase);
        }
        if doc.result_href.is_some() {
            self.result_href = doc.result_href.clone();
        }
        if doc.owner_id.is_some() {
            self.owner = doc.owner_id.clone();
        }
        if doc.quote.is_some() {
            self.quote = doc.quote;
        }
        if doc.start_time.is_some() {
            self.start_time = doc.start_time;
        }
        if doc.end_time.is_some() {
            self.end_time = doc.end_time;
        }
    }

    /// Server-assigned job identifier
    pub fn id(&self) -> &str {
        &self.job_id
    }

    /// URL of the job resource
    pub fn url(&self) -> &str {
        &self.job_url
    }

    /// Phase as of the last exchange with the server
    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Estimated completion time published by the server, if any
    pub fn quote(&self) -> Option<OffsetDateTime> {
        self.quote
    }

    pub fn start_time(&self) -> Option<OffsetDateTime> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<OffsetDateTime> {
        self.end_time
    }

    /// Ask the server for the current phase
    pub async fn refresh_phase(&mut self) -> Result<JobPhase> {
        let url = format!("{}/phase", self.job_url);
        let text = self.client.fetch_text(&url, "TAP job phase").await?;
        self.phase = JobPhase::parse(&text);
        debug!(job_id = %self.job_id, phase = %self.phase, "Job phase refreshed");
        Ok(self.phase.clone())
    }

    /// Fetch the full job document and fold it into this handle
    pub async fn refresh(&mut self) -> Result<()> {
        let text = self.client.fetch_text(&self.job_url, "TAP job document").await?;
        let doc = crate::tap::uws::parse_job(&text)?;
        self.apply_document(&doc);
        Ok(())
    }

    /// Wait for the job to finish with default polling settings
    pub async fn wait(&mut self) -> Result<JobPhase> {
        self.wait_with(&PollSettings::default()).await
    }

    /// Poll the job until it reaches a terminal phase.
    ///
    /// The poll interval starts at `initial_interval` and doubles up to
    /// `max_interval` to stay polite on long-running queries.
    ///
    /// # Errors
    ///
    /// * [`VoError::JobError`] when the job ends in ERROR, ABORTED, or
    ///   ARCHIVED, with the server's error message when one is published
    /// * [`VoError::JobTimeout`] when `timeout` elapses first
    #[instrument(skip(self, poll), fields(job_id = %self.job_id))]
    pub async fn wait_with(&mut self, poll: &PollSettings) -> Result<JobPhase> {
        let started = tokio::time::Instant::now();
        let mut interval = poll.initial_interval;

        loop {
            let phase = self.refresh_phase().await?;
            match phase {
                JobPhase::Completed => return Ok(phase),
                JobPhase::Error => {
                    let message = self.fetch_error_message().await;
                    warn!(job_id = %self.job_id, message = %message, "Job failed");
                    return Err(VoError::JobError {
                        id: self.job_id.clone(),
                        phase: phase.as_str().to_string(),
                        message,
                    });
                }
                JobPhase::Aborted | JobPhase::Archived => {
                    return Err(VoError::JobError {
                        id: self.job_id.clone(),
                        phase: phase.as_str().to_string(),
                        message: "job ended without producing a result".to_string(),
                    });
                }
                _ => {
                    if started.elapsed() >= poll.timeout {
                        return Err(VoError::JobTimeout {
                            id: self.job_id.clone(),
                            waited_secs: poll.timeout.as_secs(),
                        });
                    }
                    sleep(interval).await;
                    interval = (interval * 2).min(poll.max_interval);
                }
            }
        }
    }

    /// Download and parse the job result.
    ///
    /// Uses the result link from the job document when present, falling back
    /// to the standard `results/result` child resource.
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    pub async fn fetch_result(&self) -> Result<Table> {
        let url = self
            .result_href
            .clone()
            .unwrap_or_else(|| format!("{}/results/result", self.job_url));
        let text = self.client.fetch_text(&url, "TAP job result").await?;
        parse_votable(&text)
    }

    /// Convenience for wait-then-fetch
    pub async fn wait_and_fetch(&mut self) -> Result<Table> {
        self.wait().await?;
        self.fetch_result().await
    }

    /// Delete the job on the server, releasing its stored result
    pub async fn delete(self) -> Result<()> {
        self.client.delete_resource(&self.job_url).await?;
        debug!(job_id = %self.job_id, "Job deleted");
        Ok(())
    }

    /// Best-effort retrieval of the server's error document
    async fn fetch_error_message(&self) -> String {
        let url = format!("{}/error", self.job_url);
        if let Ok(body) = self.client.fetch_text(&url, "TAP job error document").await {
            match parse_votable(&body) {
                // Error documents are usually VOTables whose QUERY_STATUS
                // carries the message
                Err(VoError::ServiceError { message }) => return message,
                _ => {
                    let trimmed = body.trim();
                    if !trimmed.is_empty() {
                        return trimmed.chars().take(500).collect();
                    }
                }
            }
        }

        // No usable error document; fall back to the errorSummary in the
        // job document itself.
        let fallback = match self.client.fetch_text(&self.job_url, "TAP job document").await {
            Ok(body) => crate::tap::uws::parse_job(&body)
                .ok()
                .and_then(|doc| doc.error_message),
            Err(_) => None,
        };
        fallback.unwrap_or_else(|| "no error detail available".to_string())
    }
}
