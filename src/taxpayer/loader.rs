//! Taxpayer listing loader
//!
//! The listing is a delimited file whose first row is a header. When the
//! header names `nombre`, `cuit` and `clave_fiscal` (or `clave`) the columns
//! are taken by name, in any order. Otherwise they are read by position:
//! name, CUIT, credential. Other columns are ignored. Invalid rows are logged
//! and dropped.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{Cuit, CuitError, Taxpayer};
use crate::error::ScraperError;

/// Header written by [`write_example_csv`] and [`super::convert_txt_to_csv`]
pub const CSV_HEADER: [&str; 3] = ["nombre", "cuit", "clave_fiscal"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing columns, found only {0}")]
    MissingColumns(usize),
    #[error("empty name")]
    EmptyName,
    #[error("{0}")]
    InvalidCuit(#[from] CuitError),
    #[error("empty credential")]
    EmptyCredential,
    #[error("unreadable row: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line in the file
    pub line: u64,
    pub reason: RowError,
}

/// Field index of each value in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    name: usize,
    cuit: usize,
    credential: usize,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        name: 0,
        cuit: 1,
        credential: 2,
    };

    /// Columns named in `header`, or positional when any is missing
    fn from_header(header: &[String]) -> Self {
        let keys: Vec<String> = header
            .iter()
            .map(|h| h.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_"))
            .collect();
        let find = |wanted: &[&str]| {
            wanted
                .iter()
                .find_map(|w| keys.iter().position(|k| k == w))
        };

        match (
            find(&["nombre"]),
            find(&["cuit"]),
            find(&["clave_fiscal", "clave"]),
        ) {
            (Some(name), Some(cuit), Some(credential)) => Columns {
                name,
                cuit,
                credential,
            },
            _ => Self::POSITIONAL,
        }
    }

    fn width(&self) -> usize {
        self.name.max(self.cuit).max(self.credential) + 1
    }
}

#[derive(Debug, Default)]
pub struct LoadedTaxpayers {
    pub taxpayers: Vec<Taxpayer>,
    pub skipped: Vec<SkippedRow>,
}

/// Read and validate the listing at `path`.
///
/// Fails when the file cannot be read or holds no valid taxpayer.
pub fn load_taxpayers(path: &Path) -> Result<LoadedTaxpayers, ScraperError> {
    let data = std::fs::read(path)?;
    let loaded = parse_taxpayers(&data)?;

    for skipped in &loaded.skipped {
        warn!("Skipping line {} of {:?}: {}", skipped.line, path, skipped.reason);
    }

    if loaded.taxpayers.is_empty() {
        return Err(ScraperError::Input(format!(
            "{} contains no valid taxpayers (columns: name, CUIT, credential)",
            path.display()
        )));
    }

    info!(
        "Loaded {} taxpayers from {:?} ({} rows skipped)",
        loaded.taxpayers.len(),
        path,
        loaded.skipped.len()
    );
    Ok(loaded)
}

/// Parse listing bytes. Never fails on row content, only on reader setup.
pub fn parse_taxpayers(data: &[u8]) -> Result<LoadedTaxpayers, ScraperError> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let delimiter = sniff_delimiter(data);
    debug!("Using delimiter {:?}", delimiter as char);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let columns = match reader.byte_headers() {
        Ok(header) => Columns::from_header(&header.iter().map(decode_field).collect::<Vec<_>>()),
        Err(e) => {
            warn!("Unreadable header, reading columns by position: {}", e);
            Columns::POSITIONAL
        }
    };
    debug!("Column layout: {:?}", columns);

    let mut loaded = LoadedTaxpayers::default();
    for result in reader.byte_records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                loaded.skipped.push(SkippedRow {
                    line,
                    reason: RowError::Malformed(e.to_string()),
                });
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let fields: Vec<String> = record.iter().map(decode_field).collect();
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }

        match taxpayer_from_fields(&fields, columns) {
            Ok(taxpayer) => loaded.taxpayers.push(taxpayer),
            Err(reason) => loaded.skipped.push(SkippedRow { line, reason }),
        }
    }

    Ok(loaded)
}

fn taxpayer_from_fields(fields: &[String], columns: Columns) -> Result<Taxpayer, RowError> {
    if fields.len() < columns.width() {
        return Err(RowError::MissingColumns(fields.len()));
    }

    let name = fields[columns.name].replace(['\r', '\n'], " ").trim().to_string();
    if name.is_empty() {
        return Err(RowError::EmptyName);
    }

    let raw_cuit = &fields[columns.cuit];
    let cuit = Cuit::parse(raw_cuit)?;
    if raw_cuit.chars().filter(char::is_ascii_digit).count() > super::types::CUIT_LEN {
        warn!("Tax id for {} has more than 11 digits, truncated to {}", name, cuit);
    }

    let credential = fields[columns.credential].replace(['\r', '\n'], "").trim().to_string();
    if credential.is_empty() {
        return Err(RowError::EmptyCredential);
    }

    Ok(Taxpayer::new(name, cuit, credential))
}

/// UTF-8 when valid, Latin-1 otherwise
fn decode_field(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    text.trim_start_matches('\u{feff}').trim().to_string()
}

/// Pick `;`, tab or `,` by counting them in the header line
fn sniff_delimiter(data: &[u8]) -> u8 {
    let header = data.split(|&b| b == b'\n').next().unwrap_or_default();
    let count = |d: u8| header.iter().filter(|&&b| b == d).count();

    let (commas, semicolons, tabs) = (count(b','), count(b';'), count(b'\t'));
    if semicolons > commas {
        b';'
    } else if commas == 0 && tabs > 0 {
        b'\t'
    } else {
        b','
    }
}

/// Write a two-row sample listing the user can edit
pub fn write_example_csv(path: &Path) -> Result<(), ScraperError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    writer.write_record(["Contribuyente Ejemplo", "20123456789", "clave123"])?;
    writer.write_record(["Empresa Ejemplo SA", "30987654321", "clave456"])?;
    writer.flush()?;

    info!("Example listing written to {:?}", path);
    Ok(())
}
