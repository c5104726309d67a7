//! IVOA registry search over RegTAP.
//!
//! The registry knows every published VO service. RegTAP exposes it as
//! relational tables (`rr.resource`, `rr.capability`, `rr.interface`)
//! queried over plain TAP, so discovery reuses [`TapClient`] end to end:
//! search the registry, pick a hit, and turn it into a client for the
//! service it describes.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{Result, VoError};
use crate::table::Table;
use crate::tap::{escape_literal, TapClient};

/// The GAVO RegTAP endpoint, a full registry mirror
pub const DEFAULT_REGTAP_URL: &str = "http://reg.g-vo.org/tap";

/// Kinds of VO services the registry can be narrowed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Tap,
    ConeSearch,
    Sia,
    Ssa,
}

impl ServiceType {
    /// The IVOA standard identifier recorded in `rr.capability`
    fn standard_id(self) -> &'static str {
        match self {
            ServiceType::Tap => "ivo://ivoa.net/std/tap",
            ServiceType::ConeSearch => "ivo://ivoa.net/std/conesearch",
            ServiceType::Sia => "ivo://ivoa.net/std/sia",
            ServiceType::Ssa => "ivo://ivoa.net/std/ssa",
        }
    }
}

/// One registry hit: a service capability with its access URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoResource {
    /// IVOA identifier of the resource, e.g. `ivo://cds.simbad/tap`
    pub ivoid: String,
    pub title: Option<String>,
    pub short_name: Option<String>,
    pub description: Option<String>,
    /// Standard the capability implements, e.g. `ivo://ivoa.net/std/tap`
    pub standard_id: Option<String>,
    /// Where the service listens
    pub access_url: Option<String>,
}

impl VoResource {
    /// Whether this hit is a TAP capability
    pub fn is_tap(&self) -> bool {
        self.standard_id
            .as_deref()
            .is_some_and(|id| id.to_ascii_lowercase().starts_with("ivo://ivoa.net/std/tap"))
    }

    /// Build a [`TapClient`] talking to this resource.
    ///
    /// # Errors
    ///
    /// [`VoError::NotFound`] when the hit is not a TAP capability or has no
    /// access URL.
    pub fn tap_client(&self, config: ClientConfig) -> Result<TapClient> {
        let url = self
            .access_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        match (self.is_tap(), url) {
            (true, Some(url)) => Ok(TapClient::with_config(url, config)),
            _ => Err(VoError::NotFound {
                what: format!("TAP interface on {}", self.ivoid),
            }),
        }
    }
}

/// Search constraints for [`RegistryClient::search_with`]
#[derive(Debug, Clone, Default)]
pub struct RegistryQuery {
    keywords: Vec<String>,
    service_type: Option<ServiceType>,
    waveband: Option<String>,
}

impl RegistryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a keyword to match the resource's title, description, short
    /// name, or ivoid. Repeated keywords all have to match.
    pub fn keyword<S: Into<String>>(mut self, keyword: S) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    /// Only return capabilities implementing one service standard
    pub fn service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = Some(service_type);
        self
    }

    /// Only return resources covering a waveband, e.g. `radio` or `x-ray`
    pub fn waveband<S: Into<String>>(mut self, waveband: S) -> Self {
        self.waveband = Some(waveband.into());
        self
    }

    /// Assemble the RegTAP ADQL for these constraints
    fn to_adql(&self) -> Result<String> {
        let mut conditions = vec!["intf.intf_role = 'std'".to_string()];

        for keyword in &self.keywords {
            let literal = escape_literal(keyword);
            conditions.push(format!(
                "(1=ivo_nocasematch(res.ivoid, '%{literal}%') \
                 OR 1=ivo_hasword(res.res_title, '{literal}') \
                 OR 1=ivo_hasword(res.res_description, '{literal}') \
                 OR 1=ivo_nocasematch(res.short_name, '%{literal}%'))"
            ));
        }
        if let Some(service_type) = self.service_type {
            conditions.push(format!(
                "1=ivo_nocasematch(cap.standard_id, '{}%')",
                service_type.standard_id()
            ));
        }
        if let Some(waveband) = &self.waveband {
            conditions.push(format!(
                "1=ivo_hashlist_has(res.waveband, '{}')",
                escape_literal(&waveband.to_lowercase())
            ));
        }

        // intf_role alone matches the whole registry
        if conditions.len() == 1 {
            return Err(VoError::InvalidQuery(
                "registry search needs at least one keyword or constraint".to_string(),
            ));
        }

        Ok(format!(
            "SELECT res.ivoid, res.res_title, res.short_name, res.res_description, \
             cap.standard_id, intf.access_url \
             FROM rr.resource AS res \
             NATURAL JOIN rr.capability AS cap \
             NATURAL JOIN rr.interface AS intf \
             WHERE {}",
            conditions.join(" AND ")
        ))
    }
}

/// Client for a RegTAP registry service
///
/// # Example
///
/// ```no_run
/// use vo_client::config::ClientConfig;
/// use vo_client::registry::{RegistryClient, RegistryQuery, ServiceType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = RegistryClient::new();
///     let query = RegistryQuery::new()
///         .keyword("pulsar")
///         .service_type(ServiceType::Tap);
///     let hits = registry.search_with(&query).await?;
///
///     if let Some(hit) = hits.iter().find(|r| r.is_tap()) {
///         let tap = hit.tap_client(ClientConfig::new())?;
///         println!("querying {}", tap.base_url());
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RegistryClient {
    tap: TapClient,
}

impl RegistryClient {
    /// Create a client for the default registry mirror
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            tap: TapClient::with_config(DEFAULT_REGTAP_URL, config),
        }
    }

    /// The underlying TAP client, for raw RegTAP queries
    pub fn tap(&self) -> &TapClient {
        &self.tap
    }

    /// Find resources matching all of the given keywords
    #[instrument(skip(self))]
    pub async fn search(&self, keywords: &[&str]) -> Result<Vec<VoResource>> {
        let mut query = RegistryQuery::new();
        for keyword in keywords {
            query = query.keyword(*keyword);
        }
        self.search_with(&query).await
    }

    /// Find resources matching a [`RegistryQuery`]
    #[instrument(skip(self, query))]
    pub async fn search_with(&self, query: &RegistryQuery) -> Result<Vec<VoResource>> {
        let adql = query.to_adql()?;
        let table = self.tap.query(&adql).await?;
        Ok(resources_from_table(&table))
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Map the registry result columns onto [`VoResource`] hits. A resource
/// with several interfaces legitimately appears once per access URL.
fn resources_from_table(table: &Table) -> Vec<VoResource> {
    let mut resources = Vec::with_capacity(table.nrows());
    for row in 0..table.nrows() {
        let cell = |name: &str| {
            table
                .cell(row, name)
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
        };
        let Some(ivoid) = cell("ivoid") else {
            debug!(row, "Registry row without ivoid skipped");
            continue;
        };
        resources.push(VoResource {
            ivoid,
            title: cell("res_title"),
            short_name: cell("short_name"),
            description: cell("res_description"),
            standard_id: cell("standard_id"),
            access_url: cell("access_url"),
        });
    }
    resources
}
