//! Generic TAP (Table Access Protocol) layer.
//!
//! TAP is the IVOA protocol the big archives share: ADQL queries go to
//! `{base}/sync` or run as UWS jobs under `{base}/async`, table metadata
//! lives under `{base}/tables`, and results come back as VOTables. This
//! module holds everything that is true for every TAP service; the
//! archive-specific clients ([`crate::gaia`], [`crate::simbad`],
//! [`crate::jwst`], [`crate::hsa`]) wrap a [`TapClient`] and add their
//! default endpoints and canned queries.
//!
//! # Example
//!
//! ```no_run
//! use vo_client::tap::{AdqlQuery, SortDirection, TapClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adql = AdqlQuery::new()
//!         .select("source_id")
//!         .select("ra")
//!         .select("dec")
//!         .top(10)
//!         .from("gaiadr3.gaia_source")
//!         .where_clause("parallax > 50")
//!         .order_by("phot_g_mean_mag", SortDirection::Ascending)
//!         .build()?;
//!
//!     let tap = TapClient::new("https://gea.esac.esa.int/tap-server/tap");
//!     let table = tap.query(&adql).await?;
//!     println!("{} nearby bright sources", table.nrows());
//!     Ok(())
//! }
//! ```

mod client;
mod job;
mod query;
mod uws;
mod vosi;

pub use client::{ResultFormat, TapClient};
pub use job::{JobPhase, PollSettings, TapJob};
pub use query::{
    box_contains, circle_contains, distance_expr, escape_literal, AdqlQuery, SortDirection,
};
pub use uws::JobSummary;
pub use vosi::{TapColumn, TapTableMetadata};

pub(crate) use client::stream_to_file;
pub(crate) use query::{validate_coordinates, validate_identifier, validate_radius};
