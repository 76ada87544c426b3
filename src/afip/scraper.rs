//! Nuestra Parte scraper
//!
//! One browser per taxpayer: log in with CUIT and clave fiscal, find the
//! section through the portal search box, pick the year and save what the
//! page shows.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::scripts;
use super::types::{
    decide_year_step, is_post_login_url, parse_visible_years, scroll_offsets, Direction,
    TablesSnapshot, YearStep,
};
use crate::config::{ExtractMode, ScraperConfig};
use crate::error::ScraperError;
use crate::output::Artifact;
use crate::taxpayer::Taxpayer;
use crate::traits::{Extraction, Scraper};

pub const LOGIN_URL: &str = "https://auth.afip.gob.ar/contribuyente_/login.xhtml";
pub const SECTION_QUERY: &str = "Nuestra Parte";

const USERNAME_INPUT: &str = "input[id='F1:username']";
const NEXT_BUTTON: &str = "[id='F1:btnSiguiente']";
const PASSWORD_INPUT: &str = "input[id='F1:password']";
const LOGIN_BUTTON: &str = "[id='F1:btnIngresar']";
const SEARCH_INPUT: &str = "#buscadorInput";
const FIRST_SEARCH_RESULT: &str = "#resultadoBusqueda a";

/// Window size the screenshot slices are taken at
const WINDOW_SIZE: (u32, u32) = (1050, 708);
/// Vertical distance between screenshot slices (px)
const SCROLL_STEP: u32 = 400;
/// Arrow clicks allowed while looking for the year
const MAX_YEAR_PAGES: u32 = 10;

const POLL_INTERVAL_MS: u64 = 500;
const STEP_WAIT_SECS: u64 = 3;
const YEAR_LOAD_WAIT_SECS: u64 = 5;
const PAGE_STABLE_TIMEOUT_MS: u64 = 10000;

pub struct NuestraParteScraper {
    taxpayer: Taxpayer,
    config: ScraperConfig,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    page: Option<Page>,
    year: Option<i32>,
}

impl NuestraParteScraper {
    pub fn new(taxpayer: Taxpayer, config: ScraperConfig) -> Self {
        Self {
            taxpayer,
            config,
            browser: None,
            handler_task: None,
            page: None,
            year: None,
        }
    }

    fn get_browser(&self) -> Result<&Browser, ScraperError> {
        self.browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("browser not initialized".into()))
    }

    fn get_page(&self) -> Result<&Page, ScraperError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("browser not initialized".into()))
    }

    /// Evaluate `script` and deserialize its value
    async fn eval<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T, ScraperError> {
        page.evaluate(script)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn current_url(page: &Page) -> String {
        page.url().await.ok().flatten().unwrap_or_default()
    }

    /// Poll for `selector` until it exists or the configured timeout passes
    async fn wait_for_element(
        &self,
        page: &Page,
        selector: &str,
        what: &str,
    ) -> Result<Element, ScraperError> {
        let start = Instant::now();
        loop {
            match page.find_element(selector).await {
                Ok(element) => {
                    debug!("{} found after {:?}", what, start.elapsed());
                    return Ok(element);
                }
                Err(e) if start.elapsed() >= self.config.timeout => {
                    return Err(ScraperError::Timeout(format!(
                        "{} ({}) not found after {:?}: {}",
                        what, selector, self.config.timeout, e
                    )));
                }
                Err(_) => sleep(Duration::from_millis(POLL_INTERVAL_MS)).await,
            }
        }
    }

    /// Poll a boolean page script until it returns true
    async fn wait_for_condition(
        &self,
        page: &Page,
        script: &str,
        what: &str,
    ) -> Result<(), ScraperError> {
        let start = Instant::now();
        while start.elapsed() < self.config.timeout {
            match Self::eval::<bool>(page, script).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("{} check failed: {}", what, e),
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        Err(ScraperError::Timeout(format!(
            "{} not reached after {:?}",
            what, self.config.timeout
        )))
    }

    /// Wait for `document.readyState == "complete"`; gives up quietly
    async fn wait_ready_state(&self, page: &Page) {
        let start = Instant::now();
        while start.elapsed() < self.config.timeout {
            if let Ok(state) = Self::eval::<String>(page, "document.readyState").await {
                if state == "complete" {
                    debug!("Page loaded after {:?}", start.elapsed());
                    return;
                }
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        warn!("Page still loading after {:?}, proceeding anyway", start.elapsed());
    }

    /// Wait until the document length stops changing
    async fn wait_stable(&self, page: &Page) {
        let start = Instant::now();
        let timeout = Duration::from_millis(PAGE_STABLE_TIMEOUT_MS);

        let mut last_len: Option<usize> = None;
        let mut stable_count = 0;
        const REQUIRED_STABLE_CHECKS: u32 = 3;

        while start.elapsed() < timeout {
            match Self::eval::<usize>(page, "document.documentElement.outerHTML.length").await {
                Ok(len) => {
                    if last_len == Some(len) {
                        stable_count += 1;
                        if stable_count >= REQUIRED_STABLE_CHECKS {
                            debug!("Page stable after {:?}", start.elapsed());
                            return;
                        }
                    } else {
                        stable_count = 0;
                    }
                    last_len = Some(len);
                }
                Err(e) => {
                    debug!("Page stable check error: {}", e);
                    stable_count = 0;
                }
            }
            sleep(Duration::from_millis(300)).await;
        }

        warn!("Page stable timeout after {:?}, proceeding anyway", start.elapsed());
    }

    async fn log_debug_screenshot(&self, page: &Page, label: &str) {
        if !self.config.debug {
            return;
        }
        if let Ok(png) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
            debug!("{} screenshot: data:image/png;base64,{}", label, encoded);
        }
    }

    /// Type into the portal search box and open the first hit
    async fn open_section(&mut self) -> Result<(), ScraperError> {
        let page = self.get_page()?.clone();

        let search = self
            .wait_for_element(&page, SEARCH_INPUT, "portal search box")
            .await?;
        search
            .click()
            .await
            .map_err(|e| ScraperError::Navigation(format!("search box click: {}", e)))?;
        search
            .type_str(SECTION_QUERY)
            .await
            .map_err(|e| ScraperError::Navigation(format!("search box input: {}", e)))?;
        debug!("Searched for '{}'", SECTION_QUERY);

        self.wait_for_condition(&page, scripts::SEARCH_RESULTS_VISIBLE, "search results")
            .await?;

        let before: Vec<_> = self
            .get_browser()?
            .pages()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?
            .iter()
            .map(|p| p.target_id().clone())
            .collect();

        self.wait_for_element(&page, FIRST_SEARCH_RESULT, "first search result")
            .await?
            .click()
            .await
            .map_err(|e| ScraperError::Navigation(format!("search result click: {}", e)))?;
        info!("Opened first search result");

        sleep(Duration::from_secs(STEP_WAIT_SECS)).await;

        let opened = self
            .get_browser()?
            .pages()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?
            .into_iter()
            .find(|p| !before.contains(p.target_id()));

        match opened {
            Some(tab) => {
                info!("Section opened in a new tab: {}", Self::current_url(&tab).await);
                self.page = Some(tab);
            }
            None => debug!("No new tab, staying on the current page"),
        }

        let page = self.get_page()?.clone();
        self.wait_ready_state(&page).await;
        self.wait_stable(&page).await;
        Ok(())
    }

    /// Walk the year carousel and click the target (or the fallback) year
    async fn select_year(&self, page: &Page) -> Result<i32, ScraperError> {
        match Self::eval::<String>(page, scripts::SELECT_NATIONAL_TAB).await?.as_str() {
            "clicked" => {
                debug!("Activated the national annual tab");
                sleep(Duration::from_secs(2)).await;
            }
            "missing" => warn!("National annual tab not found, using the page as is"),
            _ => {}
        }

        let target = self.config.year;
        let mut pages_left = MAX_YEAR_PAGES;

        loop {
            let labels: Vec<String> = Self::eval(page, scripts::VISIBLE_YEARS).await?;
            let visible = parse_visible_years(&labels);
            debug!("Visible years: {:?}", visible);

            match decide_year_step(target, &visible, pages_left > 0) {
                YearStep::Click(year) => {
                    self.click_year(page, year).await?;
                    return Ok(year);
                }
                YearStep::Fallback(year) => {
                    warn!(
                        "Year {} not available for {}, using most recent visible year {}",
                        target, self.taxpayer.name, year
                    );
                    self.click_year(page, year).await?;
                    return Ok(year);
                }
                YearStep::Unavailable => {
                    return Err(ScraperError::Navigation("no year buttons visible".into()));
                }
                YearStep::Page(direction) => {
                    pages_left -= 1;
                    if !self.click_arrow(page, direction).await? {
                        debug!("{:?} arrow disabled", direction);
                        pages_left = 0;
                    }
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn click_year(&self, page: &Page, year: i32) -> Result<(), ScraperError> {
        let script = scripts::CLICK_YEAR.replace("{year}", &year.to_string());
        if !Self::eval::<bool>(page, &script).await? {
            return Err(ScraperError::ElementNotFound(format!("year button {}", year)));
        }
        info!("Clicked year {}", year);
        Ok(())
    }

    async fn click_arrow(&self, page: &Page, direction: Direction) -> Result<bool, ScraperError> {
        let script = scripts::CLICK_ARROW.replace("{selector}", direction.arrow_selector());
        Self::eval(page, &script).await
    }

    /// One PDF per visible table, rendered in a scratch page
    async fn extract_tables(&self, page: &Page, year: i32) -> Result<Vec<Artifact>, ScraperError> {
        let snapshot: TablesSnapshot = Self::eval(page, scripts::SNAPSHOT_TABLES).await?;
        info!("Found {} visible tables", snapshot.tables.len());

        let browser = self.get_browser()?;
        let params = PrintToPdfParams {
            print_background: Some(true),
            ..Default::default()
        };

        let mut artifacts = Vec::with_capacity(snapshot.tables.len());
        for (index, table) in snapshot.tables.iter().enumerate() {
            let html = snapshot.render(table, &self.taxpayer.name, year);

            let scratch = browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScraperError::Extraction(e.to_string()))?;
            let pdf = match scratch.set_content(html).await {
                Ok(_) => scratch
                    .pdf(params.clone())
                    .await
                    .map_err(|e| ScraperError::Extraction(format!("table {} to PDF: {}", index + 1, e))),
                Err(e) => Err(ScraperError::Extraction(format!("table {}: {}", index + 1, e))),
            };
            if let Err(e) = scratch.close().await {
                debug!("Failed to close scratch page: {}", e);
            }

            debug!("Table {} '{}' rendered", index + 1, table.title);
            artifacts.push(Artifact::indexed("table", index, "pdf", pdf?));
        }
        Ok(artifacts)
    }

    /// Viewport captures from top to bottom
    async fn extract_screenshots(&self, page: &Page) -> Result<Vec<Artifact>, ScraperError> {
        let height: f64 = Self::eval(page, scripts::DOCUMENT_HEIGHT).await?;
        let offsets = scroll_offsets(height.max(0.0) as u32, SCROLL_STEP);
        info!("Capturing {} screenshots for a {}px page", offsets.len(), height);

        let mut artifacts = Vec::with_capacity(offsets.len());
        for (index, y) in offsets.into_iter().enumerate() {
            let scroll = format!("window.scrollTo(0, {})", y);
            page.evaluate(scroll.as_str())
                .await
                .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
            sleep(Duration::from_millis(300)).await;

            let png = page
                .screenshot(ScreenshotParams::builder().build())
                .await
                .map_err(|e| ScraperError::Extraction(format!("screenshot {}: {}", index + 1, e)))?;
            artifacts.push(Artifact::indexed("screenshot", index, "png", png));
        }
        Ok(artifacts)
    }
}

#[async_trait]
impl Scraper for NuestraParteScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing browser for {}...", self.taxpayer.name);

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("nuestra-parte-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .viewport(None)
            .request_timeout(Duration::from_secs(60));

        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        if !self.config.headless {
            builder = builder.with_head();
            if self.config.mode == ExtractMode::Pdf {
                warn!("PDF printing needs a headless browser; expect failures with --headed");
            }
        }

        builder = builder
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        self.browser = Some(browser);
        self.handler_task = Some(task);
        self.page = Some(page);

        info!("Browser initialized");
        Ok(())
    }

    async fn login(&mut self) -> Result<(), ScraperError> {
        let page = self.get_page()?.clone();
        info!("Logging in as {} ({})", self.taxpayer.name, self.taxpayer.cuit);

        page.goto(LOGIN_URL)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;
        self.wait_ready_state(&page).await;
        self.log_debug_screenshot(&page, "Login page").await;

        let username = self
            .wait_for_element(&page, USERNAME_INPUT, "CUIT field")
            .await?;
        username
            .click()
            .await
            .map_err(|e| ScraperError::Login(format!("CUIT field: {}", e)))?;
        username
            .type_str(self.taxpayer.cuit.as_str())
            .await
            .map_err(|e| ScraperError::Login(format!("CUIT input: {}", e)))?;

        self.wait_for_element(&page, NEXT_BUTTON, "next button")
            .await?
            .click()
            .await
            .map_err(|e| ScraperError::Login(format!("next button: {}", e)))?;
        debug!("CUIT submitted");

        let password = match self
            .wait_for_element(&page, PASSWORD_INPUT, "password field")
            .await
        {
            Ok(field) => field,
            Err(e) => {
                let message: String = Self::eval(&page, scripts::LOGIN_ERROR_MESSAGE)
                    .await
                    .unwrap_or_default();
                if message.is_empty() {
                    return Err(e);
                }
                return Err(ScraperError::Login(format!("CUIT rejected: {}", message)));
            }
        };
        password
            .click()
            .await
            .map_err(|e| ScraperError::Login(format!("password field: {}", e)))?;
        password
            .type_str(&self.taxpayer.credential)
            .await
            .map_err(|e| ScraperError::Login(format!("password input: {}", e)))?;

        self.wait_for_element(&page, LOGIN_BUTTON, "login button")
            .await?
            .click()
            .await
            .map_err(|e| ScraperError::Login(format!("login button: {}", e)))?;
        debug!("Credential submitted");

        let start = Instant::now();
        loop {
            let url = Self::current_url(&page).await;
            if is_post_login_url(&url) {
                info!("Logged in, landed on {}", url);
                break;
            }
            if start.elapsed() >= self.config.timeout {
                let message: String = Self::eval(&page, scripts::LOGIN_ERROR_MESSAGE)
                    .await
                    .unwrap_or_default();
                return Err(ScraperError::Login(if message.is_empty() {
                    format!("still on {} after {:?}", url, self.config.timeout)
                } else {
                    message
                }));
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        self.wait_ready_state(&page).await;
        self.wait_stable(&page).await;
        Ok(())
    }

    async fn navigate(&mut self) -> Result<i32, ScraperError> {
        info!("Navigating to {}...", SECTION_QUERY);
        self.open_section().await?;

        let page = self.get_page()?.clone();
        let year = self.select_year(&page).await?;

        sleep(Duration::from_secs(YEAR_LOAD_WAIT_SECS)).await;
        self.wait_stable(&page).await;

        self.year = Some(year);
        Ok(year)
    }

    async fn extract(&mut self) -> Result<Extraction, ScraperError> {
        let page = self.get_page()?.clone();
        let year = self
            .year
            .ok_or_else(|| ScraperError::Extraction("no year selected".into()))?;

        let expanded: u32 = Self::eval(&page, scripts::EXPAND_SECTIONS).await?;
        debug!("Expanded {} sections", expanded);
        sleep(Duration::from_secs(2)).await;
        self.wait_stable(&page).await;

        let artifacts = match self.config.mode {
            ExtractMode::Pdf => self.extract_tables(&page, year).await?,
            ExtractMode::Screenshot => self.extract_screenshots(&page).await?,
        };

        if artifacts.is_empty() {
            return Err(ScraperError::Extraction(format!(
                "nothing to save for year {} ({} mode)",
                year, self.config.mode
            )));
        }

        info!("Extracted {} files for {}", artifacts.len(), self.taxpayer.name);
        Ok(Extraction { year, artifacts })
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        debug!("Closing browser...");

        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Failed to wait for browser exit: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        debug!("Browser closed");
        Ok(())
    }

    async fn failure_screenshot(&self) -> Option<Vec<u8>> {
        let page = self.page.as_ref()?;
        page.screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxpayer::Cuit;

    fn taxpayer() -> Taxpayer {
        Taxpayer::new("Juan Perez", Cuit::parse("20123456789").unwrap(), "pw")
    }

    #[test]
    fn test_scraper_new() {
        let scraper = NuestraParteScraper::new(taxpayer(), ScraperConfig::new(2021));
        assert!(scraper.browser.is_none());
        assert!(scraper.page.is_none());
        assert!(scraper.year.is_none());
    }

    #[tokio::test]
    async fn test_steps_before_initialize_fail() {
        let mut scraper = NuestraParteScraper::new(taxpayer(), ScraperConfig::new(2021));
        assert!(matches!(scraper.login().await, Err(ScraperError::BrowserInit(_))));
        assert!(matches!(scraper.navigate().await, Err(ScraperError::BrowserInit(_))));
        assert!(scraper.failure_screenshot().await.is_none());
        assert!(scraper.close().await.is_ok());
    }

    #[tokio::test]
    #[ignore] // live portal: AFIP_NAME / AFIP_CUIT / AFIP_CLAVE, cargo test -- --ignored --nocapture
    async fn test_live_extraction() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info,nuestra_parte_scraper=debug")
            .try_init();

        let name = std::env::var("AFIP_NAME").unwrap_or_else(|_| "live".into());
        let cuit = Cuit::parse(&std::env::var("AFIP_CUIT").expect("AFIP_CUIT not set")).unwrap();
        let clave = std::env::var("AFIP_CLAVE").expect("AFIP_CLAVE not set");
        let year = crate::config::current_year() - 1;

        let mut scraper = NuestraParteScraper::new(
            Taxpayer::new(name, cuit, clave),
            ScraperConfig::new(year).with_debug(true),
        );
        let extraction = scraper.execute().await.expect("extraction failed");
        println!("year {}: {} files", extraction.year, extraction.artifacts.len());
        assert!(!extraction.artifacts.is_empty());
    }
}
