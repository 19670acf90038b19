use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use glob::glob;

use capmerge_core::{MergeEvent, MergeOptions, PcapSink, merge_files};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("CAPMERGE_BUILD_COMMIT"),
    ", built ",
    env!("CAPMERGE_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "capmerge")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Merge packet captures into one time-ordered capture, gracefully.",
    long_about = None,
    after_help = "Examples:\n  capmerge first.pcap second.pcap -w merged.pcap\n  capmerge 'shard_*.pcap' -w merged.pcap --stats merge.json\n  capmerge -v captures/*.pcap > merged.pcap"
)]
struct Cli {
    /// Input capture files (.pcap or .pcapng); glob patterns are expanded
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file, '-' for standard output
    #[arg(short = 'w', long = "output", default_value = "-")]
    output: String,

    /// Explain every skipped record and input file on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Write a JSON merge report to this path
    #[arg(long, value_name = "FILE")]
    stats: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let inputs = resolve_inputs(&cli.inputs)?;
    let verbose = cli.verbose;

    if verbose {
        eprintln!("capmerge v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("writing to {}", describe_output(&cli.output));
    }

    let destination: Box<dyn Write> = if cli.output == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(
            File::create(&cli.output)
                .with_context(|| format!("cannot open {} for writing", cli.output))?,
        )
    };
    let mut sink = PcapSink::new(destination);

    let report = merge_files(&inputs, &mut sink, &MergeOptions::default(), |event| {
        if verbose {
            print_event(&event);
        }
    });

    if let Err(err) = sink.flush() {
        eprintln!("warning: flushing output failed: {err}");
    }

    if verbose {
        eprintln!(
            "merged {} records from {} input files ({} dropped, {} write failures)",
            report.records_written,
            report.sources.len(),
            report.drops.total(),
            report.write_failures
        );
    }

    if let Some(stats_path) = cli.stats.as_ref() {
        let json = serde_json::to_string_pretty(&report).context("JSON serialization failed")?;
        fs::write(stats_path, json)
            .with_context(|| format!("cannot write stats to {}", stats_path.display()))?;
    }

    Ok(())
}

fn print_event(event: &MergeEvent<'_>) {
    match event {
        MergeEvent::SourceSkipped { path, reason } => {
            eprintln!("{path}: {reason} (skipping this file)");
        }
        MergeEvent::Initialized {
            sources,
            total_input_bytes,
        } => {
            eprintln!(
                "merging {} input files of size {}",
                sources,
                format_bytes(*total_input_bytes)
            );
        }
        MergeEvent::RecordDropped { path, reason } => {
            eprintln!("{path}: {reason} (skipping this record)");
        }
        MergeEvent::SourceFinished { path } => {
            eprintln!("{path}: done (closing)");
        }
        MergeEvent::SourceFailed { path, reason } => {
            eprintln!("{path}: {reason} (closing this file)");
        }
        MergeEvent::WriteFailed { error } => {
            eprintln!("write error: {error} (skipping this record)");
        }
    }
}

const BYTE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", BYTE_UNITS[unit])
    }
}

fn describe_output(output: &str) -> String {
    if output == "-" {
        "standard output".to_string()
    } else {
        output.to_string()
    }
}

fn resolve_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, CliError> {
    let mut resolved = Vec::new();
    for input in inputs {
        if !is_glob_pattern(input) {
            // Literal paths go straight through; a missing file is the
            // merge engine's skip decision, not an argument error.
            resolved.push(PathBuf::from(input));
            continue;
        }

        let mut matches = Vec::new();
        let paths = glob(input).map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", input),
                Some(format!("pattern error: {}", err.msg)),
            )
        })?;
        for entry in paths {
            let path = entry.map_err(|err| {
                CliError::new(
                    format!("invalid input pattern '{}'", input),
                    Some(format!("pattern error: {}", err)),
                )
            })?;
            if path.is_file() {
                matches.push(path);
            }
        }

        if matches.is_empty() {
            return Err(CliError::new(
                format!("no files match pattern '{}'", input),
                Some("check the path or quote the pattern".to_string()),
            ));
        }
        resolved.extend(matches);
    }
    Ok(resolved)
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
