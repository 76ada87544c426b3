//! Taxpayer listing: record types, CSV loader and the legacy TXT converter

mod convert;
mod loader;
mod types;

pub use convert::{convert_txt_to_csv, default_csv_path, parse_legacy_listing, LegacyRow};
pub use loader::{
    load_taxpayers, parse_taxpayers, write_example_csv, LoadedTaxpayers, RowError, SkippedRow,
    CSV_HEADER,
};
pub use types::{Cuit, CuitError, Taxpayer, CUIT_LEN};
