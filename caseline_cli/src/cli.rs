use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use caseline::{
    config::Config,
    matcher::{LocationMatcher, LookupMatcher},
    snapshot::{FetchOptions, HttpProbe},
    sources::{DataSource, Jurisdiction},
    CaseLine,
};
use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::prelude::*;
use spinners::{Spinner, Spinners};

use crate::display::{display_report, display_sources};
use crate::error::CaseLineCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOCATING_STRING: &str = "Locating snapshots";
const PROCESSING_STRING: &str = "Processing case line";

fn parse_source(value: &str) -> Result<Jurisdiction, String> {
    Jurisdiction::from_str(value).map_err(|err| err.to_string())
}

/// Parses `name=path`. Without a name the file stem names the partition.
fn parse_input(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        Some(_) => Err(format!("Invalid input '{value}', expected name=path")),
        None => {
            let path = PathBuf::from(value);
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .ok_or_else(|| format!("Invalid input path '{value}'"))?;
            Ok((name, path))
        }
    }
}

/// Reads a CSV file with every column as strings; typing is left to the pipeline.
fn read_csv(path: &Path) -> CaseLineCliResult<DataFrame> {
    debug!("Reading {}", path.display());
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?)
}

fn write_output<U>(mut data: DataFrame, output_file: Option<U>) -> CaseLineCliResult<()>
where
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        CsvWriter::new(&mut f)
            .include_header(true)
            .finish(&mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        CsvWriter::new(&mut stdout_lock)
            .include_header(true)
            .finish(&mut data)?;
    };
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CaseLineCliResult<()>;
}

/// The `sources` command lists the available jurisdiction adapters.
#[derive(Args, Debug)]
pub struct SourcesCommand;

impl RunCommand for SourcesCommand {
    async fn run(&self, _config: Config) -> CaseLineCliResult<()> {
        info!("Running `sources` subcommand");
        println!("\nThe following sources are available:");
        display_sources(&Jurisdiction::all());
        Ok(())
    }
}

/// The `locate` command resolves the fetch URLs of a source, probing for the latest snapshot when
/// the source is published as dated snapshots.
#[derive(Args, Debug)]
pub struct LocateCommand {
    #[arg(short, long, value_parser = parse_source, help = "Source to locate data for")]
    source: Jurisdiction,
    #[arg(
        short,
        long = "url",
        required = true,
        help = "URL template, e.g. https://example.org/DOH_{date}.csv. Can be repeated."
    )]
    urls: Vec<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for LocateCommand {
    async fn run(&self, config: Config) -> CaseLineCliResult<()> {
        info!("Running `locate` subcommand");
        let sp = (!self.quiet).then(|| {
            Spinner::with_timer(
                DEFAULT_PROGRESS_SPINNER,
                LOCATING_STRING.to_string() + RUNNING_TAIL_STRING,
            )
        });
        let options = self
            .urls
            .iter()
            .map(|url| FetchOptions::new(url.as_str()))
            .collect::<Vec<_>>();
        let located = CaseLine::new_with_config(config)
            .resolve_fetch_options(&self.source, &options, &HttpProbe::default())
            .await;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }
        for opts in located? {
            match opts.name {
                Some(name) => println!("{name}\t{}", opts.url),
                None => println!("{}", opts.url),
            }
        }
        Ok(())
    }
}

/// The `run` command processes local raw partitions of a source and writes the resulting time
/// series as CSV.
#[derive(Args, Debug)]
pub struct RunPipelineCommand {
    #[arg(short, long, value_parser = parse_source, help = "Source the inputs come from")]
    source: Jurisdiction,
    #[arg(
        short,
        long = "input",
        value_parser = parse_input,
        required = true,
        help = "Raw partition as name=path.csv (or path.csv). Can be repeated."
    )]
    inputs: Vec<(String, PathBuf)>,
    #[arg(
        short,
        long,
        help = "CSV with match_string, key and optional level columns used to resolve locations"
    )]
    locations: Option<PathBuf>,
    #[arg(short = 'o', long, help = "Output file to place the results, stdout if absent")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunPipelineCommand {
    async fn run(&self, config: Config) -> CaseLineCliResult<()> {
        info!("Running `run` subcommand");
        let sp = (!self.quiet).then(|| {
            Spinner::with_timer(
                DEFAULT_PROGRESS_SPINNER,
                PROCESSING_STRING.to_string() + RUNNING_TAIL_STRING,
            )
        });
        let tables = self
            .inputs
            .iter()
            .map(|(name, path)| Ok((name.clone(), read_csv(path)?)))
            .collect::<CaseLineCliResult<BTreeMap<_, _>>>()?;
        let matcher = self
            .locations
            .as_deref()
            .map(|path| -> CaseLineCliResult<LookupMatcher> {
                Ok(LookupMatcher::from_frame(&read_csv(path)?)?)
            })
            .transpose()?;
        let output = CaseLine::new_with_config(config).process(
            &self.source,
            &tables,
            matcher.as_ref().map(|m| m as &dyn LocationMatcher),
        );
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }
        let output = output?;
        display_report(self.source.name(), &output.report);
        write_output(output.data, self.output_file.as_deref())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="caseline turns public-health case line data into daily time series", long_about = None, name="caseline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinner to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// List available sources
    Sources(SourcesCommand),
    /// Print the URLs a source would be fetched from
    Locate(LocateCommand),
    /// Run a source over local CSV partitions
    Run(RunPipelineCommand),
}
