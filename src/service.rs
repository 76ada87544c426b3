use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{error, info, warn};

use crate::afip::NuestraParteScraper;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::output::{ResultOrganizer, SaveReport};
use crate::taxpayer::Taxpayer;
use crate::traits::Scraper;

/// Extraction request for one taxpayer
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub taxpayer: Taxpayer,
    pub config: ScraperConfig,
}

impl ScrapeRequest {
    pub fn new(taxpayer: Taxpayer, config: ScraperConfig) -> Self {
        Self { taxpayer, config }
    }
}

/// What was stored for one taxpayer
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub year: i32,
    pub report: SaveReport,
}

impl ScrapeResult {
    pub fn leaf(&self) -> &PathBuf {
        &self.report.leaf
    }
}

type ScraperFactory = Arc<dyn Fn(&ScrapeRequest) -> Box<dyn Scraper> + Send + Sync>;

/// tower::Service running one scraper per request and filing its output
#[derive(Clone)]
pub struct ScraperService {
    factory: ScraperFactory,
}

impl Default for ScraperService {
    fn default() -> Self {
        Self::with_factory(|req: &ScrapeRequest| {
            Box::new(NuestraParteScraper::new(req.taxpayer.clone(), req.config.clone()))
                as Box<dyn Scraper>
        })
    }
}

impl ScraperService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another scraper implementation
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&ScrapeRequest) -> Box<dyn Scraper> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl Service<ScrapeRequest> for ScraperService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!("Scrape request: {} ({})", req.taxpayer.name, req.taxpayer.cuit);
        let mut scraper = (self.factory)(&req);

        Box::pin(async move {
            let organizer = ResultOrganizer::new(&req.config.results_dir);

            let outcome = match scraper.initialize().await {
                Ok(()) => scraper.run().await,
                Err(e) => Err(e),
            };

            let screenshot = match &outcome {
                Ok(_) => None,
                Err(_) => scraper.failure_screenshot().await,
            };
            if let Err(e) = scraper.close().await {
                warn!("Failed to close browser: {}", e);
            }

            let extraction = match outcome {
                Ok(extraction) => extraction,
                Err(e) => {
                    if let Err(note_err) =
                        organizer.record_failure(&req.taxpayer, &e.to_string(), screenshot.as_deref())
                    {
                        error!("Failed to record failure for {}: {}", req.taxpayer.name, note_err);
                    }
                    return Err(e);
                }
            };

            let report = organizer.save_all(&req.taxpayer, extraction.year, &extraction.artifacts)?;
            organizer.clear_failure(&req.taxpayer)?;
            Ok(ScrapeResult {
                year: extraction.year,
                report,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Artifact, FAILURE_NOTE, FAILURE_SCREENSHOT};
    use crate::taxpayer::Cuit;
    use crate::traits::Extraction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scraper that fails at `fail_at` (if set) and yields two PNGs otherwise
    struct FakeScraper {
        fail_at: Option<&'static str>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeScraper {
        fn step(&self, name: &'static str) -> Result<(), ScraperError> {
            if self.fail_at == Some(name) {
                Err(ScraperError::Login(format!("{} failed", name)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        async fn initialize(&mut self) -> Result<(), ScraperError> {
            if self.fail_at == Some("initialize") {
                return Err(ScraperError::BrowserInit("chrome not found".into()));
            }
            Ok(())
        }

        async fn login(&mut self) -> Result<(), ScraperError> {
            self.step("login")
        }

        async fn navigate(&mut self) -> Result<i32, ScraperError> {
            self.step("navigate").map(|_| 2022)
        }

        async fn extract(&mut self) -> Result<Extraction, ScraperError> {
            self.step("extract")?;
            Ok(Extraction {
                year: 2022,
                artifacts: vec![
                    Artifact::indexed("screenshot", 0, "png", b"top".to_vec()),
                    Artifact::indexed("screenshot", 1, "png", b"bottom".to_vec()),
                ],
            })
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn failure_screenshot(&self) -> Option<Vec<u8>> {
            Some(b"error".to_vec())
        }
    }

    fn service(fail_at: Option<&'static str>, closed: Arc<AtomicUsize>) -> ScraperService {
        ScraperService::with_factory(move |_req: &ScrapeRequest| {
            Box::new(FakeScraper {
                fail_at,
                closed: closed.clone(),
            }) as Box<dyn Scraper>
        })
    }

    fn request(root: &std::path::Path) -> ScrapeRequest {
        let taxpayer = Taxpayer::new("Juan Perez", Cuit::parse("20123456789").unwrap(), "pw");
        ScrapeRequest::new(taxpayer, ScraperConfig::new(2022).with_results_dir(root))
    }

    #[tokio::test]
    async fn test_success_saves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let mut svc = service(None, closed.clone());

        let result = svc.call(request(dir.path())).await.unwrap();
        assert_eq!(result.year, 2022);
        assert_eq!(result.report.saved, 2);
        assert!(result.leaf().join("screenshot_02.png").exists());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        // Second run over the same folder stores nothing new.
        let again = svc.call(request(dir.path())).await.unwrap();
        assert_eq!((again.report.saved, again.report.duplicates), (0, 2));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_browser_closed() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let mut svc = service(Some("login"), closed.clone());

        let err = svc.call(request(dir.path())).await.unwrap_err();
        assert!(matches!(err, ScraperError::Login(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let cuit_dir = dir.path().join("Juan_Perez").join("20123456789");
        let note = std::fs::read_to_string(cuit_dir.join(FAILURE_NOTE)).unwrap();
        assert!(note.contains("login failed"));
        assert_eq!(std::fs::read(cuit_dir.join(FAILURE_SCREENSHOT)).unwrap(), b"error");
    }

    #[tokio::test]
    async fn test_browser_launch_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let mut svc = service(Some("initialize"), closed.clone());

        let err = svc.call(request(dir.path())).await.unwrap_err();
        assert!(matches!(err, ScraperError::BrowserInit(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let note = dir
            .path()
            .join("Juan_Perez")
            .join("20123456789")
            .join(FAILURE_NOTE);
        assert!(std::fs::read_to_string(note).unwrap().contains("chrome not found"));
    }

    #[tokio::test]
    async fn test_success_clears_previous_failure_note() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let note = dir
            .path()
            .join("Juan_Perez")
            .join("20123456789")
            .join(FAILURE_NOTE);

        service(Some("navigate"), closed.clone())
            .call(request(dir.path()))
            .await
            .unwrap_err();
        assert!(note.exists());

        service(None, closed.clone())
            .call(request(dir.path()))
            .await
            .unwrap();
        assert!(!note.exists());
    }

    #[test]
    fn test_scrape_request_keeps_config() {
        let req = request(std::path::Path::new("/tmp/r"));
        assert_eq!(req.config.year, 2022);
        assert_eq!(req.config.results_dir, PathBuf::from("/tmp/r"));
        assert_eq!(req.taxpayer.cuit.as_str(), "20123456789");
    }
}
