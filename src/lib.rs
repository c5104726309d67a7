//! # VO Client
//!
//! A Rust client library for querying astronomical data archives through
//! Virtual Observatory protocols. One generic TAP/ADQL core drives clients
//! for the Gaia, SIMBAD, JWST, and Herschel archives, with IRSA's Gator
//! cone search and IVOA registry discovery alongside.
//!
//! ## Features
//!
//! - **Generic TAP Layer**: synchronous queries, asynchronous UWS jobs with
//!   polling, and VOSI table metadata against any TAP service
//! - **VOTable Parsing**: typed tables from TABLEDATA responses, including
//!   remote error and overflow signaling
//! - **ADQL Building**: query builder and cone/box search helpers with
//!   identifier and coordinate validation
//! - **Archive Clients**: ready-made defaults for Gaia, SIMBAD, JWST,
//!   Herschel (HSA), and IRSA Gator
//! - **Registry Search**: find VO services via RegTAP and connect to them
//!   in one step
//! - **Async Support**: built on tokio and reqwest, with per-service rate
//!   limiting and retry on transient failures
//!
//! ## Quick Start
//!
//! ### Cone search on Gaia
//!
//! ```no_run
//! use vo_client::GaiaClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gaia = GaiaClient::new();
//!
//!     // The 50 sources nearest to the Pleiades center within 6 arcmin
//!     let table = gaia.cone_search(56.75, 24.1167, 0.1).await?;
//!
//!     for row in 0..table.nrows() {
//!         if let (Some(id), Some(mag)) = (
//!             table.cell(row, "source_id").and_then(|v| v.as_i64()),
//!             table.cell(row, "phot_g_mean_mag").and_then(|v| v.as_f64()),
//!         ) {
//!             println!("Gaia DR3 {id}: G = {mag:.2}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Long queries as asynchronous jobs
//!
//! ```no_run
//! use vo_client::tap::TapClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tap = TapClient::new("https://gea.esac.esa.int/tap-server/tap");
//!
//!     // submit + poll + fetch + delete in one call
//!     let table = tap
//!         .run("SELECT source_id, ra, dec FROM gaiadr3.gaia_source WHERE parallax > 100")
//!         .await?;
//!
//!     println!("{} very nearby stars", table.nrows());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gaia;
pub mod hsa;
pub mod irsa;
pub mod jwst;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod simbad;
pub mod table;
pub mod tap;
pub mod votable;

pub(crate) mod xml_utils;

// Re-export main types for convenience
pub use config::ClientConfig;
pub use error::{Result, VoError};
pub use gaia::GaiaClient;
pub use hsa::HsaClient;
pub use irsa::IrsaClient;
pub use jwst::JwstClient;
pub use registry::RegistryClient;
pub use retry::RetryConfig;
pub use simbad::SimbadClient;
pub use table::{Column, Datatype, Table, Value};
pub use tap::{AdqlQuery, JobPhase, PollSettings, ResultFormat, TapClient, TapJob};
pub use votable::parse_votable;
