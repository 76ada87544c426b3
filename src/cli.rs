//! Command line arguments and interactive prompts

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{available_years, current_year, parse_year, ExtractMode};
use crate::error::ScraperError;
use crate::logging::DEFAULT_LOG_FILE;
use crate::output::CleanPolicy;

pub const DEFAULT_INPUT: &str = "clientes.csv";
pub const DEFAULT_OUTPUT: &str = "Resultados";

#[derive(Debug, Parser)]
#[command(
    name = "nuestra-parte",
    version,
    about = "Saves the AFIP \"Nuestra Parte\" section of every taxpayer in a CSV listing"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Fiscal year to extract (asked interactively when omitted)
    #[arg(short, long, value_parser = year_arg)]
    pub year: Option<i32>,

    /// CSV listing with columns name, CUIT, clave fiscal
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    pub file: PathBuf,

    /// Results folder
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = ExtractMode::Screenshot)]
    pub mode: ExtractMode,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Delete an existing results folder without asking
    #[arg(long)]
    pub clean: bool,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Seconds to wait for each page element
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,

    /// Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    pub chrome: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a legacy TXT listing (name, CUIT, clave fiscal per block) to CSV
    Convert {
        txt: PathBuf,
        /// Defaults to the TXT path with a .csv extension
        csv: Option<PathBuf>,
    },
}

fn year_arg(s: &str) -> Result<i32, String> {
    parse_year(s, current_year()).map_err(|e| e.to_string())
}

/// Yes/no answer; anything that is not a yes counts as no
pub fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    )
}

pub fn confirm_with<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
) -> io::Result<bool> {
    write!(writer, "{} [s/N]: ", question)?;
    writer.flush()?;

    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

/// Ask on the terminal
pub fn confirm(question: &str) -> io::Result<bool> {
    confirm_with(&mut io::stdin().lock(), &mut io::stdout(), question)
}

/// `--clean` deletes; otherwise ask on a terminal and keep without one
pub fn clean_policy(clean: bool, interactive: bool) -> CleanPolicy {
    match (clean, interactive) {
        (true, _) => CleanPolicy::Delete,
        (false, true) => CleanPolicy::Ask,
        (false, false) => CleanPolicy::Keep,
    }
}

pub fn stdin_is_terminal() -> bool {
    io::stdin().is_terminal()
}

/// Ask for a year until a valid one is given. End of input is an error.
pub fn prompt_year_with<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    current: i32,
) -> Result<i32, ScraperError> {
    let years = available_years(current);
    writeln!(
        writer,
        "Available years: {}",
        years
            .clone()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )?;

    loop {
        write!(writer, "Year to extract [{}]: ", years.end())?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(ScraperError::Input("no year given".into()));
        }
        if line.trim().is_empty() {
            return Ok(*years.end());
        }
        match parse_year(&line, current) {
            Ok(year) => return Ok(year),
            Err(e) => writeln!(writer, "{}", e)?,
        }
    }
}

/// `--year`, or the terminal prompt. Non-interactive runs must pass `--year`.
pub fn resolve_year(arg: Option<i32>) -> Result<i32, ScraperError> {
    if let Some(year) = arg {
        return Ok(year);
    }
    if !stdin_is_terminal() {
        return Err(ScraperError::Input(
            "--year is required when not running in a terminal".into(),
        ));
    }
    prompt_year_with(&mut io::stdin().lock(), &mut io::stdout(), current_year())
}
