use async_trait::async_trait;

use crate::error::ScraperError;
use crate::output::Artifact;

/// What one taxpayer's run produced
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Period actually shown by the portal (may differ on fallback)
    pub year: i32,
    pub artifacts: Vec<Artifact>,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Launch the browser
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// Log in and wait for the post-login state
    async fn login(&mut self) -> Result<(), ScraperError>;

    /// Reach the target section; returns the year selected
    async fn navigate(&mut self) -> Result<i32, ScraperError>;

    async fn extract(&mut self) -> Result<Extraction, ScraperError>;

    /// Release the browser. Must be safe to call after any failure.
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// Screenshot of whatever is on screen, for failure reports
    async fn failure_screenshot(&self) -> Option<Vec<u8>> {
        None
    }

    /// login → navigate → extract, on an initialized scraper
    async fn run(&mut self) -> Result<Extraction, ScraperError> {
        self.login().await?;
        self.navigate().await?;
        self.extract().await
    }

    /// initialize → run → close. The browser is closed even when a step fails.
    async fn execute(&mut self) -> Result<Extraction, ScraperError> {
        self.initialize().await?;
        let result = self.run().await;
        self.close().await?;
        result
    }
}
