//! Legacy TXT listing → CSV
//!
//! The old listing holds one taxpayer per block of three lines: name, CUIT,
//! credential. Blank lines, `#` comments and the instruction lines shipped in
//! the template are ignored.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::loader::CSV_HEADER;
use crate::error::ScraperError;

/// Fragments that only appear in the template's instruction lines
const INSTRUCTION_MARKERS: [&str; 3] = ["ES IMPORTANTE DEJAR ESPACIO", "sin guiones", "creara carpeta"];

/// (name, CUIT, credential) as written in the TXT, unvalidated
pub type LegacyRow = (String, String, String);

/// Group the meaningful lines into complete blocks. A trailing partial block
/// is dropped.
pub fn parse_legacy_listing(text: &str) -> Vec<LegacyRow> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| !INSTRUCTION_MARKERS.iter().any(|m| l.contains(m)))
        .collect();

    lines
        .chunks_exact(3)
        .map(|block| {
            debug!("Legacy taxpayer: {}", block[0]);
            (block[0].to_string(), block[1].to_string(), block[2].to_string())
        })
        .collect()
}

/// Default output: same path with a `.csv` extension
pub fn default_csv_path(txt: &Path) -> PathBuf {
    txt.with_extension("csv")
}

/// Convert `txt` and write it to `csv_path` (or next to the input). Returns the
/// written path and the number of taxpayers.
pub fn convert_txt_to_csv(
    txt: &Path,
    csv_path: Option<&Path>,
) -> Result<(PathBuf, usize), ScraperError> {
    let bytes = std::fs::read(txt)?;
    let text = String::from_utf8_lossy(&bytes);
    let rows = parse_legacy_listing(&text);

    let out = csv_path.map(Path::to_path_buf).unwrap_or_else(|| default_csv_path(txt));
    let mut writer = csv::Writer::from_path(&out)?;
    writer.write_record(CSV_HEADER)?;
    for (name, cuit, credential) in &rows {
        writer.write_record([name, cuit, credential])?;
    }
    writer.flush()?;

    info!("Converted {} taxpayers from {:?} to {:?}", rows.len(), txt, out);
    Ok((out, rows.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxpayer::load_taxpayers;

    const LISTING: &str = "\
# listado de clientes
ES IMPORTANTE DEJAR ESPACIO ENTRE CLIENTES
Juan Perez
20123456789
clave1

Empresa SA
30987654321
clave2
Incompleto
2012
";

    #[test]
    fn test_complete_blocks_only() {
        let rows = parse_legacy_listing(LISTING);
        assert_eq!(
            rows,
            vec![
                ("Juan Perez".to_string(), "20123456789".to_string(), "clave1".to_string()),
                ("Empresa SA".to_string(), "30987654321".to_string(), "clave2".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_csv_path() {
        assert_eq!(
            default_csv_path(Path::new("dir/listado.txt")),
            PathBuf::from("dir/listado.csv")
        );
    }

    #[test]
    fn test_converted_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("listado.txt");
        std::fs::write(&txt, LISTING).unwrap();

        let (csv_path, count) = convert_txt_to_csv(&txt, None).unwrap();
        assert_eq!(count, 2);
        assert_eq!(csv_path, dir.path().join("listado.csv"));

        let loaded = load_taxpayers(&csv_path).unwrap();
        assert_eq!(loaded.taxpayers.len(), 2);
        assert_eq!(loaded.taxpayers[1].name, "Empresa SA");
    }
}
