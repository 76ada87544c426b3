//! AFIP portal scraper module
//!
//! Logs in to the taxpayer portal and saves the "Nuestra Parte" section

mod scraper;
mod scripts;
mod types;

pub use scraper::{NuestraParteScraper, LOGIN_URL, SECTION_QUERY};
pub use types::{
    decide_year_step, is_post_login_url, parse_visible_years, scroll_offsets, Direction,
    TableSnapshot, TablesSnapshot, YearStep,
};
