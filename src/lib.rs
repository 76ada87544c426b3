//! AFIP "Nuestra Parte" extractor
//!
//! - Reads a CSV listing of taxpayers (name, CUIT, clave fiscal)
//! - Logs in to the AFIP portal per taxpayer and opens "Nuestra Parte" for a year
//! - Saves the section as one PDF per table or as page screenshots under
//!   `Resultados/<name>/<cuit>/<year>/Nuestra_Parte`
//!
//! # Usage
//!
//! ```rust,ignore
//! use nuestra_parte_scraper::{ScrapeRequest, ScraperConfig, ScraperService};
//! use nuestra_parte_scraper::taxpayer::{Cuit, Taxpayer};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ScraperService::new();
//!
//!     let taxpayer = Taxpayer::new("Juan Perez", Cuit::parse("20-12345678-9").unwrap(), "clave");
//!     let config = ScraperConfig::new(2023).with_headless(false);
//!
//!     let result = service.call(ScrapeRequest::new(taxpayer, config)).await.unwrap();
//!     println!("Saved {} files in {:?}", result.report.saved, result.report.leaf);
//! }
//! ```

pub mod afip;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod runner;
pub mod service;
pub mod taxpayer;
pub mod traits;

// Main types
pub use afip::NuestraParteScraper;
pub use config::{ExtractMode, ScraperConfig};
pub use error::ScraperError;
pub use output::{Artifact, ResultOrganizer, SaveReport};
pub use runner::{run_all, RunSummary};
pub use service::{ScrapeRequest, ScrapeResult, ScraperService};
pub use taxpayer::{Cuit, Taxpayer};
pub use traits::{Extraction, Scraper};
