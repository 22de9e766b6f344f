//! A simple CLI for submitting tally forms.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tally_common::client_api::{
    get_client_report_from_server, get_student_report_from_server, submit_client_to_server,
    submit_student_to_server,
};
use tally_common::store::MemoryStore;
use tally_common::{CLIENT_VERSION, ClientForm, StudentForm, submission};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// The base API URL to connect to
    #[arg(
        long,
        global = true,
        default_value = "http://127.0.0.1:8000",
        env = "TALLY_API_BASE"
    )]
    api_base: String,

    /// Times to retry a request when the server cannot be reached
    #[arg(long, global = true, default_value_t = 3, env = "TALLY_RETRIES")]
    retries: u32,

    /// Evaluate forms locally without contacting the server
    #[arg(long, global = true, env = "TALLY_OFFLINE")]
    offline: bool,

    /// Suppress all output except the report
    #[arg(short, long, global = true, env = "TALLY_QUIET")]
    quiet: bool,

    /// Show additional output
    #[arg(short, long, global = true, env = "TALLY_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Submit a student form read from a JSON file
    Student { file: PathBuf },
    /// Submit a client form read from a JSON file
    Client { file: PathBuf },
    /// Fetch a stored report by email
    #[command(subcommand)]
    Lookup(Lookup),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Lookup {
    /// Look up a student
    Student { email: String },
    /// Look up a client
    Client { email: String },
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

fn read_form<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse form file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{pretty}");
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Student { file } => {
            let form: StudentForm = read_form(file)?;
            debug!("Student form: {form}");
            let report = if cli.offline {
                let store = MemoryStore::new();
                submission::submit_student(&store, &form)?
            } else {
                submit_student_to_server(&cli.api_base, &form, cli.retries)?
            };
            info!(
                "Student {} stored as #{}",
                report.student.email, report.student.id
            );
            print_json(&report)
        }
        Command::Client { file } => {
            let form: ClientForm = read_form(file)?;
            debug!("Client form: {form}");
            let report = if cli.offline {
                let store = MemoryStore::new();
                submission::submit_client(&store, &form)?
            } else {
                submit_client_to_server(&cli.api_base, &form, cli.retries)?
            };
            info!(
                "Client {} stored as #{}",
                report.client.email, report.client.id
            );
            print_json(&report)
        }
        Command::Lookup(_) if cli.offline => {
            bail!("Lookups need a server; remove --offline")
        }
        Command::Lookup(Lookup::Student { email }) => {
            print_json(&get_student_report_from_server(&cli.api_base, email, cli.retries)?)
        }
        Command::Lookup(Lookup::Client { email }) => {
            print_json(&get_client_report_from_server(&cli.api_base, email, cli.retries)?)
        }
    }
}

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up logger
    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level())
        .init();

    info!(
        "Tally Client v{CLIENT_VERSION} started{}.",
        if cli.offline { " in offline mode" } else { "" }
    );
    debug!("CLI Inputs: {cli:?}");

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
