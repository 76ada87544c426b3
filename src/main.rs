use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use nuestra_parte_scraper::cli::{self, Args, Command};
use nuestra_parte_scraper::logging::{self, LogConfig};
use nuestra_parte_scraper::output::prepare_root;
use nuestra_parte_scraper::runner::{self, EXIT_FATAL};
use nuestra_parte_scraper::taxpayer::{convert_txt_to_csv, load_taxpayers, write_example_csv};
use nuestra_parte_scraper::{ScraperConfig, ScraperError, ScraperService};

const EXAMPLE_CSV: &str = "clientes_ejemplo.csv";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logging::init(
        LogConfig::from_env()
            .with_debug(args.debug)
            .with_log_file(Some(args.log_file.clone())),
    );

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("✗ {}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32, ScraperError> {
    if let Some(Command::Convert { txt, csv }) = &args.command {
        let (path, rows) = convert_txt_to_csv(txt, csv.as_deref())?;
        println!("✓ {} taxpayers written to {}", rows, path.display());
        return Ok(runner::EXIT_OK);
    }

    if !args.file.exists() {
        let example = args
            .file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(EXAMPLE_CSV);
        write_example_csv(&example)?;
        return Err(ScraperError::Input(format!(
            "{} not found; fill in {} and rename it",
            args.file.display(),
            example.display()
        )));
    }

    let loaded = load_taxpayers(&args.file)?;

    let year = cli::resolve_year(args.year)?;

    let config = ScraperConfig::new(year)
        .with_mode(args.mode)
        .with_results_dir(&args.output)
        .with_headless(!args.headed)
        .with_debug(args.debug)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_chrome_path(args.chrome.clone());

    let policy = cli::clean_policy(args.clean, cli::stdin_is_terminal());
    prepare_root(&config.results_dir, policy, cli::confirm)?;

    println!("=== Nuestra Parte {} ({}) ===\n", year, config.mode);

    let mut service = ScraperService::new();
    let summary = runner::run_all(&mut service, &loaded.taxpayers, &config).await;

    match summary.write(&config.results_dir) {
        Ok(path) => info!("Summary written to {:?}", path),
        Err(e) => warn!("Failed to write summary: {}", e),
    }
    runner::print_summary(&summary);

    Ok(summary.exit_code())
}
