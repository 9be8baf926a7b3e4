// Main CLI entry point for UltiBust
// Uses clap for argument parsing and tracing for console + log file output

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{value_parser, Arg, ArgAction, Command};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use ultibust::config::{OutputFormat, ScanConfig, DEFAULT_METHODS};
use ultibust::dispatcher::run_scan;
use ultibust::engine::HttpEngine;
use ultibust::inputs::{parse_header_lines, parse_lines, parse_methods, parse_param_lines};
use ultibust::models::FuzzSpec;
use ultibust::reporting::{default_output_filename, open_sink};

fn command() -> Command {
    Command::new("ultibust")
        .version(clap::crate_version!())
        .about("Ultimate directory buster")
        .after_help("EXAMPLES:\n  ultibust hosts.txt paths.txt -t 20 -m GET,HEAD\n  ultibust hosts.txt paths.txt --record-header Server --content-hash --format jsonl")
        .arg(Arg::new("hosts_file")
            .required(true)
            .help("File with one base URL per line"))
        .arg(Arg::new("paths_file")
            .required(true)
            .help("File with one path per line; {name} tokens are filled from --params-file"))
        .arg(Arg::new("threads")
            .short('t')
            .long("threads")
            .value_parser(value_parser!(usize))
            .default_value("10")
            .help("Number of concurrent requests"))
        .arg(Arg::new("output_file")
            .short('o')
            .long("output-file")
            .help("Output file (default: ultibust_output_<timestamp>.csv)"))
        .arg(Arg::new("header_file")
            .short('H')
            .long("header-file")
            .help("File with `Name: value` headers sent on every request"))
        .arg(Arg::new("methods")
            .short('m')
            .long("http-request-methods")
            .default_value(DEFAULT_METHODS)
            .help("Comma-separated HTTP methods"))
        .arg(Arg::new("sleep_status_code")
            .short('s')
            .long("sleep-status-code")
            .value_parser(value_parser!(u16))
            .default_value("529")
            .help("Status code meaning the server wants us to slow down"))
        .arg(Arg::new("sleep_response_content")
            .short('S')
            .long("sleep-response-content")
            .help("Response body text that also means slow down"))
        .arg(Arg::new("time_to_sleep")
            .short('T')
            .long("time-to-sleep")
            .value_parser(value_parser!(u64))
            .default_value("30")
            .help("Seconds to sleep after the first throttle response"))
        .arg(Arg::new("backoff_interval")
            .short('b')
            .long("backoff-interval")
            .value_parser(value_parser!(u64))
            .default_value("30")
            .help("Seconds added to the sleep for each further throttle response"))
        .arg(Arg::new("max_http_retries")
            .short('M')
            .long("max-http-retries")
            .value_parser(value_parser!(i64))
            .allow_negative_numbers(true)
            .default_value("3")
            .help("Retries per probe for transport errors and throttling"))
        .arg(Arg::new("logfile")
            .short('l')
            .long("logfile")
            .help("Log file (default: ultibust_logfile_<timestamp>.log)"))
        .arg(Arg::new("debug")
            .short('d')
            .long("debug")
            .action(ArgAction::SetTrue)
            .help("Log at debug level"))
        .arg(Arg::new("params_file")
            .long("params-file")
            .help("File with `key=value` lines for {key} path placeholders"))
        .arg(Arg::new("record_header")
            .long("record-header")
            .action(ArgAction::Append)
            .help("Response header to record as an rh_<name> column (repeatable)"))
        .arg(Arg::new("content_hash")
            .long("content-hash")
            .action(ArgAction::SetTrue)
            .help("Record a SHA-256 of each non-empty response body"))
        .arg(Arg::new("fuzz_header")
            .long("fuzz-header")
            .action(ArgAction::Append)
            .help("Header to fuzz with every value from --fuzz-values-file (repeatable)"))
        .arg(Arg::new("fuzz_values_file")
            .long("fuzz-values-file")
            .help("File with one fuzz value per line"))
        .arg(Arg::new("dedup")
            .long("dedup")
            .action(ArgAction::SetTrue)
            .help("Drop duplicate hosts and paths before expansion"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .value_parser(value_parser!(u64))
            .default_value("30")
            .help("Per-request timeout in seconds"))
        .arg(Arg::new("insecure")
            .long("insecure")
            .action(ArgAction::SetTrue)
            .help("Accept invalid TLS certificates"))
        .arg(Arg::new("format")
            .long("format")
            .value_parser(["csv", "jsonl"])
            .default_value("csv")
            .help("Output format"))
        .arg(Arg::new("backlog")
            .long("backlog")
            .value_parser(value_parser!(usize))
            .help("Probes admitted at once, including ones waiting out a backoff (default: 4 x threads)"))
}

fn init_logging(logfile: &str, debug: bool) -> Result<()> {
    let file = File::create(logfile).with_context(|| format!("Failed to create log file {}", logfile))?;
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .init();
    Ok(())
}

fn read_list(path: &str, kind: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {} file {}", kind, path))
}

/// First Ctrl-C drains the run, the second one returns so the caller can drop it.
async fn wait_for_abort(shutdown_tx: watch::Sender<bool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    warn!("Interrupted, finishing in-flight probes (Ctrl-C again to abort)");
    let _ = shutdown_tx.send(true);
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    warn!("Interrupted again, aborting in-flight probes");
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = command().get_matches();
    let text_date = Local::now().format("%Y%m%d_%H%M%S");

    let logfile = matches
        .get_one::<String>("logfile")
        .cloned()
        .unwrap_or_else(|| format!("ultibust_logfile_{}.log", text_date));
    init_logging(&logfile, matches.get_flag("debug"))?;

    let hosts_file = matches.get_one::<String>("hosts_file").context("hosts_file is required")?;
    let paths_file = matches.get_one::<String>("paths_file").context("paths_file is required")?;
    let hosts = parse_lines(&read_list(hosts_file, "hosts")?);
    let paths = parse_lines(&read_list(paths_file, "paths")?);

    let headers = match matches.get_one::<String>("header_file") {
        Some(path) => parse_header_lines(&read_list(path, "header")?),
        None => Default::default(),
    };
    let params = match matches.get_one::<String>("params_file") {
        Some(path) => parse_param_lines(&read_list(path, "params")?),
        None => Default::default(),
    };
    let fuzz_values = match matches.get_one::<String>("fuzz_values_file") {
        Some(path) => parse_lines(&read_list(path, "fuzz values")?),
        None => Vec::new(),
    };
    let fuzz_headers: Vec<String> = matches
        .get_many::<String>("fuzz_header")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if fuzz_headers.is_empty() != fuzz_values.is_empty() {
        warn!("Header fuzzing needs both --fuzz-header and --fuzz-values-file; fuzzing disabled");
    }

    let methods_arg = matches.get_one::<String>("methods").map(String::as_str).unwrap_or(DEFAULT_METHODS);
    let format = match matches.get_one::<String>("format").map(String::as_str) {
        Some("jsonl") => OutputFormat::JsonLines,
        _ => OutputFormat::Csv,
    };

    let config = ScanConfig {
        concurrency: *matches.get_one::<usize>("threads").unwrap_or(&10),
        backlog: matches.get_one::<usize>("backlog").copied(),
        methods: parse_methods(methods_arg)?,
        headers,
        params,
        fuzz: FuzzSpec::new(fuzz_headers, fuzz_values),
        dedup: matches.get_flag("dedup"),
        record_headers: matches
            .get_many::<String>("record_header")
            .map(|v| v.cloned().collect())
            .unwrap_or_default(),
        content_hash: matches.get_flag("content_hash"),
        throttle_status: *matches.get_one::<u16>("sleep_status_code").unwrap_or(&529),
        throttle_body_marker: matches.get_one::<String>("sleep_response_content").cloned(),
        base_sleep: Duration::from_secs(*matches.get_one::<u64>("time_to_sleep").unwrap_or(&30)),
        backoff_increment: Duration::from_secs(*matches.get_one::<u64>("backoff_interval").unwrap_or(&30)),
        max_retries: *matches.get_one::<i64>("max_http_retries").unwrap_or(&3),
        timeout: Duration::from_secs(*matches.get_one::<u64>("timeout").unwrap_or(&30)),
        insecure: matches.get_flag("insecure"),
        format,
    };
    config.validate()?;

    let output_file = matches
        .get_one::<String>("output_file")
        .cloned()
        .unwrap_or_else(|| default_output_filename(format));
    let output_path = PathBuf::from(&output_file);
    let sink = open_sink(&output_path).with_context(|| format!("Failed to create output file {}", output_file))?;
    info!("Created output file {}", output_file);

    let engine = HttpEngine::new(config.timeout, config.insecure, config.concurrency)
        .context("Failed to build HTTP client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let summary = tokio::select! {
        summary = run_scan(&config, &hosts, &paths, Arc::new(engine), sink, Some(shutdown_rx)) => summary?,
        _ = wait_for_abort(shutdown_tx) => {
            // Dropping the run aborts every probe task; rows are flushed as they are written.
            bail!("Aborted, partial results in {}", output_file);
        }
    };
    if summary.drained {
        warn!(
            "Stopped early: {} of {} probes written",
            summary.completed, summary.total
        );
    }
    info!("Completed ultibust, results: {}", output_file);
    Ok(())
}
