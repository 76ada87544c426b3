use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("browser initialization failed: {0}")]
    BrowserInit(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("page script failed: {0}")]
    JavaScript(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("file operation failed: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    /// Short label used in logs and the run summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BrowserInit(_) => "browser",
            Self::Navigation(_) => "navigation",
            Self::Login(_) => "login",
            Self::ElementNotFound(_) => "element",
            Self::Timeout(_) => "timeout",
            Self::JavaScript(_) => "script",
            Self::Extraction(_) => "extraction",
            Self::Input(_) => "input",
            Self::Csv(_) => "csv",
            Self::FileIO(_) => "io",
        }
    }
}
