//! Client for the NASA/IPAC IRSA Gator catalog service.
//!
//! Gator predates TAP: searches are plain CGI form requests against
//! `nph-query`, with the catalog list on the `nph-scan` sibling endpoint.
//! Both answer in VOTable when asked (`outfmt=3` and `mode=xml`), so the
//! results flow through the same table parsing as the TAP archives.

use std::fmt;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{Result, VoError};
use crate::rate_limit::RateLimiter;
use crate::retry::with_retry;
use crate::table::Table;
use crate::tap::{validate_coordinates, validate_identifier, validate_radius};
use crate::votable::parse_votable;

/// Cone search endpoint of Gator
pub const DEFAULT_GATOR_URL: &str = "https://irsa.ipac.caltech.edu/cgi-bin/Gator/nph-query";

/// Ceiling applied to cone search radii before the request is sent
pub const MAX_CONE_RADIUS_DEG: f64 = 5.0;

/// Client for IRSA Gator
///
/// # Example
///
/// ```no_run
/// use vo_client::irsa::IrsaClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let irsa = IrsaClient::new();
///     // 2MASS point sources within 2 arcmin of M 31
///     let table = irsa
///         .query_region("fp_psc", 10.68479, 41.26906, 2.0 / 60.0)
///         .await?;
///     println!("{} sources", table.nrows());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct IrsaClient {
    client: Client,
    rate_limiter: RateLimiter,
    config: ClientConfig,
    base_url: String,
}

impl fmt::Debug for IrsaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrsaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl IrsaClient {
    /// Create a client for the public Gator service
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let base_url = config.effective_base_url(DEFAULT_GATOR_URL);
        let client = config.create_http_client();
        let rate_limiter = config.create_rate_limiter();
        Self {
            client,
            rate_limiter,
            config,
            base_url,
        }
    }

    /// The query endpoint this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cone search against one Gator catalog, e.g. `fp_psc` (2MASS) or
    /// `allwise_p3as_psd` (AllWISE).
    ///
    /// Gator takes the radius in arcseconds; this API takes degrees like
    /// the TAP searches and converts.
    #[instrument(skip(self))]
    pub async fn query_region(
        &self,
        catalog: &str,
        ra: f64,
        dec: f64,
        radius_deg: f64,
    ) -> Result<Table> {
        validate_identifier(catalog)?;
        validate_coordinates(ra, dec)?;
        validate_radius(radius_deg, MAX_CONE_RADIUS_DEG)?;

        let objstr = format!("{ra} {dec}");
        let radius_arcsec = (radius_deg * 3600.0).to_string();
        let params = [
            ("catalog", catalog),
            ("spatial", "cone"),
            ("objstr", objstr.as_str()),
            ("radius", radius_arcsec.as_str()),
            ("outfmt", "3"),
        ];
        let body = self
            .fetch_votable(&self.base_url, &params, "Gator cone search")
            .await?;
        parse_votable(&body)
    }

    /// The catalogs Gator can search, as a table of names and descriptions
    #[instrument(skip(self))]
    pub async fn list_catalogs(&self) -> Result<Table> {
        let url = self.scan_url();
        let params = [("mode", "xml")];
        let body = self
            .fetch_votable(&url, &params, "Gator catalog listing")
            .await?;
        parse_votable(&body)
    }

    /// The catalog list lives on `nph-scan` next to `nph-query`
    fn scan_url(&self) -> String {
        match self.base_url.strip_suffix("nph-query") {
            Some(root) => format!("{root}nph-scan"),
            None => format!("{}/nph-scan", self.base_url),
        }
    }

    async fn fetch_votable(
        &self,
        url: &str,
        params: &[(&str, &str)],
        operation_name: &str,
    ) -> Result<String> {
        let response = with_retry(
            || async {
                self.rate_limiter.acquire().await;
                debug!(url = %url, "Making GET request");
                let response = self.client.get(url).query(&params).send().await?;
                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(VoError::StatusError {
                        status: status.as_u16(),
                        url: response.url().to_string(),
                    });
                }
                Ok(response)
            },
            &self.config.retry_config,
            operation_name,
        )
        .await?;

        self.ensure_success(response).await
    }

    async fn ensure_success(&self, response: Response) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            warn!(status = %status, url = %url, "Request failed");
            return Err(VoError::StatusError {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }
}

impl Default for IrsaClient {
    fn default() -> Self {
        Self::new()
    }
}
