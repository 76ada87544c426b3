//! Sequential run over every taxpayer of the listing

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use futures::future::poll_fn;
use serde::Serialize;
use tower::Service;
use tracing::{error, info};

use crate::config::{ExtractMode, ScraperConfig};
use crate::error::ScraperError;
use crate::service::{ScrapeRequest, ScrapeResult};
use crate::taxpayer::Taxpayer;

pub const SUMMARY_FILE: &str = "summary.json";

/// Process exit codes
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Ok {
        year: i32,
        folder: PathBuf,
        saved: usize,
        duplicates: usize,
    },
    Error {
        kind: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxpayerOutcome {
    pub name: String,
    pub cuit: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TaxpayerOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub year: i32,
    pub mode: ExtractMode,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub taxpayers: Vec<TaxpayerOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.taxpayers.iter().filter(|t| t.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.taxpayers.len() - self.succeeded()
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            EXIT_OK
        } else {
            EXIT_PARTIAL
        }
    }

    /// Writes `summary.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ScraperError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ScraperError::FileIO(e.into()))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

fn outcome_of(result: &Result<ScrapeResult, ScraperError>) -> Outcome {
    match result {
        Ok(r) => Outcome::Ok {
            year: r.year,
            folder: r.report.leaf.clone(),
            saved: r.report.saved,
            duplicates: r.report.duplicates,
        },
        Err(e) => Outcome::Error {
            kind: e.kind(),
            message: e.to_string(),
        },
    }
}

/// Runs every taxpayer through `service`, one at a time.
///
/// A failing taxpayer is logged and the run moves on; only the summary
/// reflects it.
pub async fn run_all<S>(service: &mut S, taxpayers: &[Taxpayer], config: &ScraperConfig) -> RunSummary
where
    S: Service<ScrapeRequest, Response = ScrapeResult, Error = ScraperError>,
{
    let started_at = Local::now();
    let total = taxpayers.len();
    let mut outcomes = Vec::with_capacity(total);

    info!(
        "Processing {} taxpayers for {} ({} mode)",
        total, config.year, config.mode
    );

    for (i, taxpayer) in taxpayers.iter().enumerate() {
        println!("--- Taxpayer {}/{}: {} ({}) ---", i + 1, total, taxpayer.name, taxpayer.cuit);

        let request = ScrapeRequest::new(taxpayer.clone(), config.clone());
        let result = match poll_fn(|cx| service.poll_ready(cx)).await {
            Ok(()) => service.call(request).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(r) => {
                info!(
                    "{}: saved={} duplicates={} folder={:?}",
                    taxpayer.name, r.report.saved, r.report.duplicates, r.report.leaf
                );
                println!(
                    "✓ {} new, {} duplicate -> {}",
                    r.report.saved,
                    r.report.duplicates,
                    r.report.leaf.display()
                );
            }
            Err(e) => {
                error!("{} ({}) failed: {}", taxpayer.name, taxpayer.cuit, e);
                eprintln!("✗ Error: {}", e);
            }
        }

        outcomes.push(TaxpayerOutcome {
            name: taxpayer.name.clone(),
            cuit: taxpayer.cuit.to_string(),
            outcome: outcome_of(&result),
        });
        println!("Taxpayer {}/{} processed: {}", i + 1, total, taxpayer.name);
        println!();
    }

    let summary = RunSummary {
        year: config.year,
        mode: config.mode,
        started_at,
        finished_at: Local::now(),
        taxpayers: outcomes,
    };

    info!(
        "Run finished: {} ok, {} failed",
        summary.succeeded(),
        summary.failed()
    );
    summary
}

/// Final console report
pub fn print_summary(summary: &RunSummary) {
    println!("=== Summary ({}) ===", summary.year);
    println!("Succeeded: {}", summary.succeeded());
    println!("Failed:    {}", summary.failed());
    for t in summary.taxpayers.iter().filter(|t| !t.is_ok()) {
        if let Outcome::Error { message, .. } = &t.outcome {
            println!("  - {} ({}): {}", t.name, t.cuit, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SaveReport;
    use crate::taxpayer::Cuit;
    use std::future::{ready, Ready};
    use std::task::{Context, Poll};

    /// Fails for any taxpayer whose name starts with "bad"
    struct MockService {
        calls: Vec<String>,
    }

    impl Service<ScrapeRequest> for MockService {
        type Response = ScrapeResult;
        type Error = ScraperError;
        type Future = Ready<Result<ScrapeResult, ScraperError>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: ScrapeRequest) -> Self::Future {
            self.calls.push(req.taxpayer.name.clone());
            if req.taxpayer.name.starts_with("bad") {
                return ready(Err(ScraperError::Login("rejected credentials".into())));
            }
            ready(Ok(ScrapeResult {
                year: req.config.year,
                report: SaveReport {
                    leaf: req.config.results_dir.join(&req.taxpayer.name),
                    saved: 3,
                    duplicates: 1,
                },
            }))
        }
    }

    fn taxpayers(names: &[&str]) -> Vec<Taxpayer> {
        names
            .iter()
            .map(|n| Taxpayer::new(*n, Cuit::parse("20123456789").unwrap(), "pw"))
            .collect()
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_run() {
        let mut service = MockService { calls: Vec::new() };
        let config = ScraperConfig::new(2023);
        let list = taxpayers(&["ana", "bad luis", "eva"]);

        let summary = run_all(&mut service, &list, &config).await;

        assert_eq!(service.calls, vec!["ana", "bad luis", "eva"]);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), EXIT_PARTIAL);
        assert_eq!(
            summary.taxpayers[1].outcome,
            Outcome::Error {
                kind: "login",
                message: "login failed: rejected credentials".into()
            }
        );
    }

    #[tokio::test]
    async fn test_all_ok_exit_code() {
        let mut service = MockService { calls: Vec::new() };
        let summary = run_all(&mut service, &taxpayers(&["ana"]), &ScraperConfig::new(2023)).await;
        assert_eq!(summary.exit_code(), EXIT_OK);
    }

    #[tokio::test]
    async fn test_summary_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService { calls: Vec::new() };
        let list = taxpayers(&["ana", "bad eva"]);
        let summary = run_all(&mut service, &list, &ScraperConfig::new(2021)).await;

        let path = summary.write(dir.path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["year"], 2021);
        assert_eq!(json["mode"], "screenshot");
        assert_eq!(json["taxpayers"][0]["status"], "ok");
        assert_eq!(json["taxpayers"][0]["saved"], 3);
        assert_eq!(json["taxpayers"][1]["status"], "error");
        assert_eq!(json["taxpayers"][1]["kind"], "login");
    }
}
