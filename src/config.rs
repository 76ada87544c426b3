use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Datelike;
use serde::Serialize;

use crate::error::ScraperError;

/// Oldest period the portal publishes
pub const FIRST_YEAR: i32 = 2018;

/// How the Nuestra Parte section is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// One PDF per visible table
    Pdf,
    /// Viewport screenshots covering the whole page
    #[default]
    Screenshot,
}

impl ExtractMode {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Screenshot => "png",
        }
    }
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Screenshot => f.write_str("screenshot"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub year: i32,
    pub mode: ExtractMode,
    pub results_dir: PathBuf,
    pub headless: bool,
    pub debug: bool,
    /// Upper bound for each element wait
    pub timeout: Duration,
    pub chrome_path: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            year: current_year(),
            mode: ExtractMode::default(),
            results_dir: PathBuf::from("./Resultados"),
            headless: true,
            debug: false,
            timeout: Duration::from_secs(15),
            chrome_path: chrome_path_from_env(),
        }
    }
}

impl ScraperConfig {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_results_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_dir = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.chrome_path = path;
        }
        self
    }
}

/// `CHROME_PATH`, then `CHROMIUM_PATH`
fn chrome_path_from_env() -> Option<PathBuf> {
    std::env::var("CHROME_PATH")
        .or_else(|_| std::env::var("CHROMIUM_PATH"))
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Years the user may pick, oldest first
pub fn available_years(current: i32) -> RangeInclusive<i32> {
    FIRST_YEAR..=current.max(FIRST_YEAR)
}

pub fn parse_year(input: &str, current: i32) -> Result<i32, ScraperError> {
    let year: i32 = input
        .trim()
        .parse()
        .map_err(|_| ScraperError::Input(format!("'{}' is not a year", input.trim())))?;

    let range = available_years(current);
    if !range.contains(&year) {
        return Err(ScraperError::Input(format!(
            "year {} is not available, choose between {} and {}",
            year,
            range.start(),
            range.end()
        )));
    }
    Ok(year)
}
